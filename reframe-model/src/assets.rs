use std::collections::BTreeMap;

use crate::ids::AssetId;

/// Pixel dimensions of an image asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Analysis output attached to an uploaded asset.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct AssetMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dpi: Option<u32>,
    pub layers: Option<u32>,
    /// Free-form element descriptors produced by the analysis pipeline.
    #[cfg_attr(feature = "serde", serde(deserialize_with = "lenient_elements"))]
    pub detected_elements: Vec<String>,
}

/// One uploaded asset as presented for review after analysis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ReviewAsset {
    pub id: AssetId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub filename: String,
    #[cfg_attr(feature = "serde", serde(rename = "previewUrl"))]
    pub preview_ref: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: AssetMetadata,
}

/// One asset produced by a generation job.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GeneratedAsset {
    pub id: AssetId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub original_asset_id: Option<AssetId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub filename: String,
    #[cfg_attr(feature = "serde", serde(rename = "assetUrl"))]
    pub asset_ref: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub platform_name: Option<String>,
    pub format_name: String,
    pub dimensions: Dimensions,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_nsfw: bool,
}

/// Generated assets grouped by platform name, ordered for stable rendering.
pub type GeneratedAssets = BTreeMap<String, Vec<GeneratedAsset>>;

#[cfg(feature = "serde")]
fn lenient_elements<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Ok(Option::<Vec<detected::Element>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(detected::Element::into_label)
        .collect())
}

/// Detected elements arrive either as bare labels or as small objects with a
/// `label`/`type`/`name` field depending on the analysis provider.
#[cfg(feature = "serde")]
mod detected {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    pub(super) enum Element {
        Label(String),
        Tagged {
            #[serde(alias = "type", alias = "name")]
            label: String,
        },
    }

    impl Element {
        pub(super) fn into_label(self) -> String {
            match self {
                Element::Label(label) | Element::Tagged { label } => label,
            }
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn preview_payload_tolerates_sparse_metadata() {
        let raw = r#"{
            "id": "a1",
            "filename": "hero.psd",
            "previewUrl": "/uploads/a1.png",
            "metadata": {
                "layers": null,
                "width": 1200,
                "height": 800,
                "dpi": null,
                "detectedElements": ["logo", {"type": "text"}]
            }
        }"#;
        let asset: ReviewAsset = serde_json::from_str(raw).unwrap();
        assert_eq!(asset.id, AssetId::from("a1"));
        assert_eq!(asset.metadata.width, Some(1200));
        assert_eq!(asset.metadata.detected_elements, vec!["logo", "text"]);
    }

    #[test]
    fn null_detected_elements_become_empty() {
        let raw = r#"{"id":"a2","previewUrl":"/p","metadata":{"detectedElements":null}}"#;
        let asset: ReviewAsset = serde_json::from_str(raw).unwrap();
        assert!(asset.metadata.detected_elements.is_empty());
    }

    #[test]
    fn results_group_by_platform() {
        let raw = r#"{
            "Instagram": [{
                "id": "g1",
                "originalAssetId": "a1",
                "filename": "g1.jpg",
                "assetUrl": "/files/g1.jpg",
                "platformName": "Instagram",
                "formatName": "Square Post",
                "dimensions": {"width": 1080, "height": 1080},
                "isNsfw": false
            }]
        }"#;
        let grouped: GeneratedAssets = serde_json::from_str(raw).unwrap();
        let instagram = &grouped["Instagram"];
        assert_eq!(instagram.len(), 1);
        assert_eq!(instagram[0].dimensions, Dimensions::new(1080, 1080));
    }
}
