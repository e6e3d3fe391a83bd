//! Generation trigger: validation of a format selection and the
//! preconditions for starting a job.

use reframe_model::{
    FormatId, GenerationStartRequest, ProjectId, ProjectStatus,
};

use super::snapshot::{PendingFetch, StatusSnapshot};
use crate::error::WorkflowError;

/// A non-empty, duplicate-free set of output formats, in selection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    formats: Vec<FormatId>,
}

impl FormatSelection {
    pub fn new(
        formats: impl IntoIterator<Item = FormatId>,
    ) -> Result<Self, WorkflowError> {
        let mut unique: Vec<FormatId> = Vec::new();
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        if unique.is_empty() {
            return Err(WorkflowError::EmptyFormatSelection);
        }
        Ok(Self { formats: unique })
    }

    pub fn formats(&self) -> &[FormatId] {
        &self.formats
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub(crate) fn into_request(
        self,
        project_id: ProjectId,
        prompt: Option<String>,
    ) -> GenerationStartRequest {
        GenerationStartRequest {
            project_id,
            format_ids: self.formats,
            custom_resizes: Vec::new(),
            prompt: prompt
                .map(|prompt| prompt.trim().to_string())
                .filter(|prompt| !prompt.is_empty()),
        }
    }
}

/// Reject a generation request the snapshot cannot accept.
pub(crate) fn check_preconditions(
    snapshot: &StatusSnapshot,
) -> Result<(), WorkflowError> {
    if let Some(job_id) = snapshot.active_job_id() {
        return Err(WorkflowError::GenerationAlreadyActive {
            job_id: job_id.clone(),
        });
    }
    if snapshot.pending() == Some(&PendingFetch::GenerationStart) {
        return Err(WorkflowError::GenerationStartInFlight);
    }
    if snapshot.status() != ProjectStatus::ReadyForReview
        || snapshot.pending().is_some()
    {
        return Err(WorkflowError::NotReadyForGeneration {
            status: snapshot.status(),
        });
    }
    Ok(())
}
