//! Request and response bodies exchanged with the backend API.

use crate::ids::{AssetId, FormatId, JobId, ProjectId};
use crate::status::{JobStatus, ProjectStatus};

/// `GET /projects/{id}/status`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectStatusResponse {
    pub status: ProjectStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub progress: Option<u8>,
}

/// `GET /generate/{job_id}/status`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub progress: Option<u8>,
}

/// Explicit width/height pair requested in addition to catalog formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomResize {
    pub width: u32,
    pub height: u32,
}

/// `POST /generate`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GenerationStartRequest {
    pub project_id: ProjectId,
    pub format_ids: Vec<FormatId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub custom_resizes: Vec<CustomResize>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GenerationStartResponse {
    pub job_id: JobId,
}

/// `POST /projects/upload`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProjectUploadResponse {
    pub project_id: ProjectId,
}

/// Image encoding requested for a download archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DownloadQuality {
    #[default]
    High,
    Medium,
    Low,
}

/// How the backend lays files out inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Grouping {
    #[default]
    Individual,
    Batch,
    Category,
}

/// Caller-facing knobs for a download; combined with asset ids into a
/// [`DownloadRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    pub format: ExportFormat,
    pub quality: DownloadQuality,
    pub grouping: Grouping,
}

/// `POST /generate/download`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DownloadRequest {
    pub asset_ids: Vec<AssetId>,
    pub format: ExportFormat,
    pub quality: DownloadQuality,
    pub grouping: Grouping,
}

impl DownloadRequest {
    pub fn new(asset_ids: Vec<AssetId>, options: DownloadOptions) -> Self {
        Self {
            asset_ids,
            format: options.format,
            quality: options.quality,
            grouping: options.grouping,
        }
    }
}

/// Error body returned on non-success responses. FastAPI uses `detail`;
/// some middleware answers with `error`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ErrorBody {
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.detail.as_deref().or(self.error.as_deref())
    }
}
