//! Classification of local artifacts.
//!
//! A role key decides which category (and therefore which subdirectory) a
//! downloaded file belongs to; the file extension decides what happens to it
//! after download.

use crate::config::PathsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Semantic category of an artifact, derived from its descriptor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    Image,
    Label,
    Metadata,
}

impl ArtifactRole {
    pub const ALL: [ArtifactRole; 3] = [ArtifactRole::Image, ArtifactRole::Label, ArtifactRole::Metadata];

    /// Classify a descriptor key.
    ///
    /// Keys containing "image" are images and keys containing "metadata" are
    /// metadata; every other fetchable key (labels, segmentations, masks) is a
    /// label.
    pub fn from_role_key(key: &str) -> Self {
        if key.contains("image") {
            ArtifactRole::Image
        } else if key.contains("metadata") {
            ArtifactRole::Metadata
        } else {
            ArtifactRole::Label
        }
    }

    /// Subdirectories that hold this category's extracted files.
    pub fn subdirs(&self) -> &'static [&'static str] {
        match self {
            ArtifactRole::Image => &[PathsConfig::IMAGES_DIR_NAME],
            ArtifactRole::Label => &[
                PathsConfig::LABELS_DIR_NAME,
                PathsConfig::SEGMENTATION_DIR_NAME,
            ],
            ArtifactRole::Metadata => &[PathsConfig::METADATA_DIR_NAME],
        }
    }

    /// Whether listings for this category keep only image files.
    pub fn filters_image_extensions(&self) -> bool {
        !matches!(self, ArtifactRole::Metadata)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::Image => "image",
            ArtifactRole::Label => "label",
            ArtifactRole::Metadata => "metadata",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" | "images" => Some(ArtifactRole::Image),
            "label" | "labels" | "segmentation" => Some(ArtifactRole::Label),
            "metadata" => Some(ArtifactRole::Metadata),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subdirectory a role key's archives are extracted into.
///
/// Label keys naming a segmentation land in `segmentation/`, other labels in
/// `labels/`.
pub fn target_subdir(key: &str) -> &'static str {
    match ArtifactRole::from_role_key(key) {
        ArtifactRole::Image => PathsConfig::IMAGES_DIR_NAME,
        ArtifactRole::Metadata => PathsConfig::METADATA_DIR_NAME,
        ArtifactRole::Label if key.contains("segmentation") => PathsConfig::SEGMENTATION_DIR_NAME,
        ArtifactRole::Label => PathsConfig::LABELS_DIR_NAME,
    }
}

/// What to do with a downloaded file, by extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `.zip`: extract into the role's subdirectory.
    Archive,
    /// `.csv` / `.tif`: keep in place and record as ground truth.
    GroundTruth,
    /// Anything else; carries the (lowercased) extension, empty if none.
    Unclassified(String),
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => ArtifactKind::Archive,
            "csv" | "tif" => ArtifactKind::GroundTruth,
            _ => ArtifactKind::Unclassified(ext),
        }
    }
}
