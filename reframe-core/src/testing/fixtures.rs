use reframe_model::{
    AssetId, AssetMetadata, Dimensions, GeneratedAsset, JobId, ProjectId,
    ProjectStatus, ReviewAsset,
};

use crate::workflow::StatusSnapshot;

pub fn review_asset(id: &str) -> ReviewAsset {
    ReviewAsset {
        id: AssetId::from(id),
        filename: format!("{id}.psd"),
        preview_ref: format!("/previews/{id}.png"),
        metadata: AssetMetadata {
            width: Some(1080),
            height: Some(1080),
            dpi: Some(72),
            layers: Some(3),
            detected_elements: vec!["logo".to_string(), "headline".to_string()],
        },
    }
}

pub fn generated_asset(id: &str, platform: &str) -> GeneratedAsset {
    GeneratedAsset {
        id: AssetId::from(id),
        original_asset_id: Some(AssetId::from("a1")),
        filename: format!("{id}.jpg"),
        asset_ref: format!("/generated/{id}.jpg"),
        platform_name: Some(platform.to_string()),
        format_name: format!("{platform} Post"),
        dimensions: Dimensions::new(1080, 1080),
        is_nsfw: false,
    }
}

/// A snapshot already sitting at `status`, as if reconciled there.
///
/// `job` is only kept for `generating`, the one status that carries a job.
pub fn snapshot_at(
    project_id: &str,
    status: ProjectStatus,
    job: Option<&str>,
) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::new(ProjectId::from(project_id));
    snapshot.status = status;
    if status == ProjectStatus::Generating {
        snapshot.active_job_id =
            Some(JobId::from(job.unwrap_or("job1")));
    }
    snapshot
}
