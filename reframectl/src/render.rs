use std::fmt::Write as _;

use reframe_core::StatusSnapshot;
use reframe_model::{FormatCatalog, GeneratedAssets, ReviewAsset};

/// One line per observable state; the watcher prints it when it changes.
pub fn status_line(snapshot: &StatusSnapshot) -> String {
    let mut line = format!(
        "[{}] project {}",
        snapshot.display_status(),
        snapshot.project_id()
    );
    if let Some(progress) = snapshot.progress() {
        let _ = write!(line, " {progress}%");
    }
    if let Some(job) = snapshot.active_job_id() {
        let _ = write!(line, " job {job}");
    }
    if let Some(error) = snapshot.last_error() {
        let _ = write!(line, " - {error}");
    }
    line
}

pub fn review_assets(assets: &[ReviewAsset]) -> String {
    if assets.is_empty() {
        return "no assets available for review\n".to_string();
    }
    let mut out = String::new();
    for asset in assets {
        let meta = &asset.metadata;
        let _ = write!(out, "  {}  {}", asset.id, asset.filename);
        if let (Some(width), Some(height)) = (meta.width, meta.height) {
            let _ = write!(out, "  {width}x{height}");
        }
        if let Some(layers) = meta.layers {
            let _ = write!(out, "  {layers} layers");
        }
        if !meta.detected_elements.is_empty() {
            let _ = write!(out, "  [{}]", meta.detected_elements.join(", "));
        }
        out.push('\n');
    }
    out
}

pub fn generated_assets(results: &GeneratedAssets) -> String {
    let mut out = String::new();
    for (platform, assets) in results {
        let _ = writeln!(out, "{platform} ({})", assets.len());
        for asset in assets {
            let _ = write!(
                out,
                "  {}  {}  {}  {}",
                asset.id, asset.format_name, asset.dimensions, asset.filename
            );
            if asset.is_nsfw {
                out.push_str("  (flagged)");
            }
            out.push('\n');
        }
    }
    out
}

pub fn format_catalog(catalog: &FormatCatalog) -> String {
    let mut out = String::new();
    for (group, formats) in &catalog.groups {
        let _ = writeln!(out, "{group}:");
        for format in formats {
            let _ = write!(
                out,
                "  {:<12} {:<28} {}",
                format.id.as_str(),
                format.name,
                format.dimensions()
            );
            if let Some(platform) = &format.platform_id {
                let _ = write!(out, "  {platform}");
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_core::testing::fixtures;
    use reframe_model::{ProjectId, ProjectStatus};

    #[test]
    fn status_line_shows_display_status_and_job() {
        let snapshot = fixtures::snapshot_at("p1", ProjectStatus::Generating, None);
        assert_eq!(status_line(&snapshot), "[generating] project p1 job job1");

        let placeholder = StatusSnapshot::new(ProjectId::from("p2"));
        assert_eq!(status_line(&placeholder), "[uploading] project p2");
    }

    #[test]
    fn generated_assets_are_grouped_by_platform() {
        let mut results = GeneratedAssets::new();
        results.insert(
            "Instagram".into(),
            vec![fixtures::generated_asset("g1", "Instagram")],
        );
        let text = generated_assets(&results);
        assert!(text.starts_with("Instagram (1)\n"), "{text}");
        assert!(text.contains("  g1  "), "{text}");
    }

    #[test]
    fn empty_review_is_reported() {
        assert_eq!(review_assets(&[]), "no assets available for review\n");
        let text = review_assets(&[fixtures::review_asset("a1")]);
        assert!(text.starts_with("  a1  "), "{text}");
    }
}
