//! BBBC Datasets - download-on-demand access to the Broad Bioimage Benchmark
//! Collection.
//!
//! Given a dataset id (or a custom descriptor), this crate makes sure the
//! dataset's image, label and metadata files are present in a local cache,
//! downloading and unpacking them as needed, and then lists the resulting
//! files by role.
//!
//! # Example
//!
//! ```rust,ignore
//! use bbbc_datasets::{CacheConfig, DatasetCache};
//!
//! #[tokio::main]
//! async fn main() -> bbbc_datasets::Result<()> {
//!     let config = CacheConfig::from_env()?;
//!     let cache = DatasetCache::from_registry("BBBC039", None, &config).await?;
//!
//!     println!("{} images", cache.image_paths().len());
//!     println!("{} masks", cache.label_paths().len());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod network;
pub mod registry;

// Re-export commonly used types
pub use artifact::{ArtifactKind, ArtifactRole};
pub use cache::{
    validate_remote, AcquisitionReport, DatasetCache, DatasetCacheBuilder, FetchOutcome,
    FetchState,
};
pub use config::{CacheConfig, NetworkConfig, PathsConfig, IMAGE_EXTENSIONS};
pub use descriptor::{DatasetDescriptor, RoleSource};
pub use error::{BbbcError, Result};
pub use network::{DownloadProgress, Downloader, HttpClient};
pub use registry::DatasetInfo;
