use std::time::Duration;

use reframe_model::{
    GeneratedAssets, JobId, JobStatus, ProjectStatus, ReviewAsset,
};

/// Which status-side fetch produced a [`Observation::FetchFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    ProjectStatus,
    Preview,
    JobStatus,
}

/// One piece of information fed to the reconciler.
///
/// Most variants are backend answers; `GenerationRequested` and `Stalled`
/// are produced locally by the generation trigger and the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    ProjectStatusObserved {
        status: ProjectStatus,
        progress: Option<u8>,
    },
    PreviewObserved(Vec<ReviewAsset>),
    JobStatusObserved {
        job_id: JobId,
        status: JobStatus,
        progress: Option<u8>,
    },
    /// Results fetch for `job_id`; `Err` carries the failure message.
    JobResultsObserved {
        job_id: JobId,
        outcome: Result<GeneratedAssets, String>,
    },
    GenerationRequested,
    GenerationStarted(JobId),
    GenerationStartFailed(String),
    FetchFailed {
        kind: FetchKind,
        message: String,
    },
    Stalled {
        waited: Duration,
    },
}

impl Observation {
    pub fn project_status(status: ProjectStatus) -> Self {
        Observation::ProjectStatusObserved {
            status,
            progress: None,
        }
    }

    pub fn job_status(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Observation::JobStatusObserved {
            job_id: job_id.into(),
            status,
            progress: None,
        }
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::ProjectStatusObserved { .. } => "project_status",
            Observation::PreviewObserved(_) => "preview",
            Observation::JobStatusObserved { .. } => "job_status",
            Observation::JobResultsObserved { .. } => "job_results",
            Observation::GenerationRequested => "generation_requested",
            Observation::GenerationStarted(_) => "generation_started",
            Observation::GenerationStartFailed(_) => "generation_start_failed",
            Observation::FetchFailed { .. } => "fetch_failed",
            Observation::Stalled { .. } => "stalled",
        }
    }
}
