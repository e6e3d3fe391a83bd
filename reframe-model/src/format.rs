use std::collections::BTreeMap;

use crate::assets::Dimensions;
use crate::ids::FormatId;

/// Whether a format is a plain resize or a platform-specific repurposing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FormatKind {
    Resizing,
    Repurposing,
}

/// One selectable output format from the backend's catalog.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OutputFormat {
    pub id: FormatId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: FormatKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub platform_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl OutputFormat {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Format catalog grouped the way the backend groups it (by format kind).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FormatCatalog {
    pub groups: BTreeMap<String, Vec<OutputFormat>>,
}

impl FormatCatalog {
    pub fn iter(&self) -> impl Iterator<Item = &OutputFormat> {
        self.groups.values().flatten()
    }

    pub fn find(&self, id: &FormatId) -> Option<&OutputFormat> {
        self.iter().find(|format| &format.id == id)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
