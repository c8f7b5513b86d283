//! Centralized configuration for the BBBC dataset cache.
//!
//! Constant tables for network and path parameters, plus the [`CacheConfig`]
//! value that carries the shared storage root into every dataset cache.

use crate::error::{BbbcError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AGENT: &'static str = concat!("bbbc-datasets/", env!("CARGO_PKG_VERSION"));
    pub const SUPPORTED_SCHEMES: [&'static str; 2] = ["http", "https"];
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    pub const STORAGE_DIR_NAME: &'static str = ".bbbc_datasets";
    pub const STORAGE_ROOT_ENV: &'static str = "BBBC_DATASETS_ROOT";
    pub const IMAGES_DIR_NAME: &'static str = "images";
    pub const LABELS_DIR_NAME: &'static str = "labels";
    pub const SEGMENTATION_DIR_NAME: &'static str = "segmentation";
    pub const METADATA_DIR_NAME: &'static str = "metadata";
}

/// File extensions accepted by the image listing (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "ics"];

/// Check whether a path carries one of the [`IMAGE_EXTENSIONS`].
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Where dataset caches live on disk.
///
/// Every dataset gets its own directory under `storage_root`, named after the
/// dataset (and variant), so instances of different datasets never write to
/// the same place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub storage_root: PathBuf,
}

impl CacheConfig {
    /// Use the default per-user storage root (`~/.bbbc_datasets`).
    pub fn new() -> Result<Self> {
        Ok(Self {
            storage_root: default_storage_root()?,
        })
    }

    /// Use the storage root from `BBBC_DATASETS_ROOT`, falling back to the
    /// per-user default when the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(PathsConfig::STORAGE_ROOT_ENV) {
            Some(value) if !value.is_empty() => Ok(Self::with_storage_root(value)),
            _ => Self::new(),
        }
    }

    /// Use an explicit storage root.
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    /// Directory owned by the dataset called `dataset_name`.
    pub fn dataset_root(&self, dataset_name: &str) -> PathBuf {
        self.storage_root.join(dataset_name)
    }
}

/// Get the default shared storage root.
///
/// # Platform Behavior
/// Uses the `dirs` crate to find the home directory:
/// - **Linux/macOS**: `~/.bbbc_datasets`
/// - **Windows**: `C:\Users\{user}\.bbbc_datasets`
pub fn default_storage_root() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BbbcError::config("Could not determine home directory"))?;
    Ok(home.join(PathsConfig::STORAGE_DIR_NAME))
}
