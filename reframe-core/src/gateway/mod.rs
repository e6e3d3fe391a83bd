//! Backend gateway contract.
//!
//! Every backend operation the workflow depends on is a plain request/response
//! call returning a [`GatewayResult`]. Transport failures, non-success HTTP
//! statuses, undecodable bodies, and timeouts all arrive as a
//! [`GatewayError`] value; nothing propagates past this boundary as a panic.

pub mod http;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reframe_model::{
    DownloadRequest, FormatCatalog, GeneratedAssets, GenerationStartRequest,
    JobId, JobStatusResponse, ProjectId, ProjectStatusResponse, ReviewAsset,
};
use thiserror::Error;

pub use http::{HttpGateway, HttpGatewayConfig, normalize_base_url};

/// Normalized failure of a single backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unauthorized - please login again")]
    Unauthorized,

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Errors worth backing off on: the backend was unreachable or slow,
    /// rather than answering with a definite rejection.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::Timeout(_) => true,
            GatewayError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if err.is_builder() {
            GatewayError::InvalidRequest(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A file queued for upload as part of a new project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk, guessing the content type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(content_type_for_extension)
            .map(str::to_string);
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "tif" | "tiff" => Some("image/tiff"),
        "psd" => Some("image/vnd.adobe.photoshop"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Archive returned by the download endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Request/response operations the workflow controller consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// `GET /projects/{id}/status`
    async fn fetch_project_status(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<ProjectStatusResponse>;

    /// `GET /projects/{id}/preview`
    async fn fetch_project_preview(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<Vec<ReviewAsset>>;

    /// `POST /generate`
    async fn start_generation(
        &self,
        request: &GenerationStartRequest,
    ) -> GatewayResult<JobId>;

    /// `GET /generate/{job_id}/status`
    async fn fetch_job_status(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<JobStatusResponse>;

    /// `GET /generate/{job_id}/results`
    async fn fetch_job_results(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<GeneratedAssets>;

    /// `GET /formats`
    async fn fetch_formats(&self) -> GatewayResult<FormatCatalog>;

    /// `POST /projects/upload`
    async fn upload_project(
        &self,
        name: &str,
        files: Vec<UploadFile>,
    ) -> GatewayResult<ProjectId>;

    /// `POST /generate/download`
    async fn download_assets(
        &self,
        request: &DownloadRequest,
    ) -> GatewayResult<DownloadedArchive>;
}
