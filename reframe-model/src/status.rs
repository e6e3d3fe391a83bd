use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Lifecycle status of a project as reported by the backend.
///
/// Exactly one value holds at any time. It is the sole driver of polling and
/// rendering decisions on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProjectStatus {
    #[default]
    Uploading,
    Processing,
    ReadyForReview,
    Generating,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 6] = [
        ProjectStatus::Uploading,
        ProjectStatus::Processing,
        ProjectStatus::ReadyForReview,
        ProjectStatus::Generating,
        ProjectStatus::Completed,
        ProjectStatus::Failed,
    ];

    /// Statuses for which the client must keep asking the backend for updates.
    ///
    /// `uploading` counts as well: it is the placeholder before the first
    /// fetch lands, and a failed first fetch must not leave the project
    /// unwatched.
    pub fn is_polling_eligible(self) -> bool {
        matches!(
            self,
            ProjectStatus::Uploading
                | ProjectStatus::Processing
                | ProjectStatus::Generating
        )
    }

    /// No further automatic transitions happen from a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }

    /// The backend is still analysing the upload.
    pub fn is_analysing(self) -> bool {
        matches!(self, ProjectStatus::Uploading | ProjectStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Uploading => "uploading",
            ProjectStatus::Processing => "processing",
            ProjectStatus::ReadyForReview => "ready_for_review",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus {
                kind: "project",
                value: s.to_string(),
            })
    }
}

/// Status of a generation job.
///
/// The backend spells the running state `processing`; both spellings are
/// accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum JobStatus {
    Pending,
    #[cfg_attr(feature = "serde", serde(alias = "processing"))]
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" | "processing" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ModelError::UnknownStatus {
                kind: "job",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysing_and_generating_poll() {
        let eligible: Vec<_> = ProjectStatus::ALL
            .into_iter()
            .filter(|s| s.is_polling_eligible())
            .collect();
        assert_eq!(
            eligible,
            vec![
                ProjectStatus::Uploading,
                ProjectStatus::Processing,
                ProjectStatus::Generating
            ]
        );
    }

    #[test]
    fn terminal_statuses_never_poll() {
        for status in ProjectStatus::ALL {
            assert!(!(status.is_terminal() && status.is_polling_eligible()));
        }
    }

    #[test]
    fn project_status_round_trips_through_str() {
        for status in ProjectStatus::ALL {
            assert_eq!(status.as_str().parse::<ProjectStatus>(), Ok(status));
        }
        assert!("archived".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn job_status_accepts_backend_spelling() {
        assert_eq!("processing".parse::<JobStatus>(), Ok(JobStatus::Running));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn job_status_deserializes_processing_as_running() {
        let status: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, JobStatus::Running);
        let status: ProjectStatus =
            serde_json::from_str("\"ready_for_review\"").unwrap();
        assert_eq!(status, ProjectStatus::ReadyForReview);
    }
}
