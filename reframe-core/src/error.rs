use reframe_model::{JobId, ProjectStatus};
use thiserror::Error;

use crate::gateway::GatewayError;

/// Local rejections of a controller intent. None of these reach the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no project is active")]
    NotActive,

    #[error("select at least one output format")]
    EmptyFormatSelection,

    #[error("select at least one file to upload")]
    EmptyUpload,

    #[error("select at least one asset to download")]
    EmptyAssetSelection,

    #[error("generation requires status ready_for_review, project is {status}")]
    NotReadyForGeneration { status: ProjectStatus },

    #[error("generation job {job_id} is already running")]
    GenerationAlreadyActive { job_id: JobId },

    #[error("generation request is already in flight")]
    GenerationStartInFlight,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
