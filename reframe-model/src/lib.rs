//! Core data model definitions shared across Reframe crates.
#![allow(missing_docs)]

pub mod api;
pub mod assets;
pub mod error;
pub mod format;
pub mod ids;
pub mod prelude;
pub mod status;

// Intentionally curated re-exports for downstream consumers.
pub use api::{
    CustomResize, DownloadOptions, DownloadQuality, DownloadRequest, ErrorBody,
    ExportFormat, GenerationStartRequest, GenerationStartResponse, Grouping,
    JobStatusResponse, ProjectStatusResponse, ProjectUploadResponse,
};
pub use assets::{
    AssetMetadata, Dimensions, GeneratedAsset, GeneratedAssets, ReviewAsset,
};
pub use error::{ModelError, Result as ModelResult};
pub use format::{FormatCatalog, FormatKind, OutputFormat};
pub use ids::{AssetId, FormatId, JobId, ProjectId};
pub use status::{JobStatus, ProjectStatus};
