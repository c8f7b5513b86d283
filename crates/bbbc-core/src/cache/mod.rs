//! Local cache for one dataset.
//!
//! A [`DatasetCache`] owns `<storage root>/<dataset name>/`. Opening it runs
//! the acquisition pass: every fetchable URL of the descriptor is downloaded
//! unless its file is already present, archives are unpacked into their role
//! subdirectory, and `.csv`/`.tif` files are recorded as ground truth. The
//! pass is keyed purely on what exists on disk, so running it again on a warm
//! cache performs no network transfers and no extraction.
//!
//! ```text
//! <storage root>/BBBC039/
//!     images.zip            masks.zip            metadata.zip
//!     images/images/...     labels/masks/...     metadata/metadata/...
//! ```

mod listing;
mod state;

pub use listing::list_files;
pub use state::{AcquisitionReport, FetchOutcome, FetchState};

use crate::archive;
use crate::artifact::{target_subdir, ArtifactKind, ArtifactRole};
use crate::config::{has_image_extension, CacheConfig, PathsConfig};
use crate::descriptor::{is_network_url, url_basename, DatasetDescriptor};
use crate::error::{BbbcError, Result};
use crate::network::{DownloadProgress, Downloader, HttpClient};
use crate::registry;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Builder for configuring a [`DatasetCache`].
///
/// # Example
///
/// ```rust,ignore
/// use bbbc_datasets::{DatasetCache, DatasetDescriptor};
///
/// let descriptor = DatasetDescriptor::new()
///     .with_urls("image_paths", ["https://example.org/images.zip"]);
/// let cache = DatasetCache::builder("example", descriptor)
///     .storage_root("/tmp/bbbc")
///     .open()
///     .await?;
/// println!("{} images", cache.image_paths().len());
/// ```
pub struct DatasetCacheBuilder {
    name: String,
    descriptor: DatasetDescriptor,
    config: Option<CacheConfig>,
    http: Option<HttpClient>,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
}

impl DatasetCacheBuilder {
    fn new(name: impl Into<String>, descriptor: DatasetDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            config: None,
            http: None,
            progress_tx: None,
        }
    }

    /// Use an explicit cache configuration.
    ///
    /// Default: [`CacheConfig::from_env`]
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for a configuration with the given storage root.
    pub fn storage_root(self, storage_root: impl Into<PathBuf>) -> Self {
        self.config(CacheConfig::with_storage_root(storage_root))
    }

    /// Use a preconfigured HTTP client (e.g. with a shorter probe timeout).
    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Send download progress updates to this channel.
    ///
    /// Updates are offered without waiting; when the channel is full the
    /// update is dropped and the transfer carries on.
    pub fn progress(mut self, tx: mpsc::Sender<DownloadProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Create the cache root and run the acquisition pass.
    pub async fn open(self) -> Result<DatasetCache> {
        let mut cache = self.open_offline()?;
        cache.acquire().await;
        Ok(cache)
    }

    /// Create the cache root without touching the network.
    ///
    /// Accessors report whatever an earlier pass left on disk.
    pub fn open_offline(self) -> Result<DatasetCache> {
        validate_dataset_name(&self.name)?;

        let config = match self.config {
            Some(config) => config,
            None => CacheConfig::from_env()?,
        };

        let root = match self.descriptor.local_path() {
            Some(local) if !local.is_empty() => config.storage_root.join(local),
            _ => config.dataset_root(&self.name),
        };

        std::fs::create_dir_all(&root).map_err(|e| BbbcError::Io {
            message: format!("Failed to create dataset directory: {}", e),
            path: Some(root.clone()),
            source: Some(e),
        })?;
        debug!("Dataset {} cached at {}", self.name, root.display());

        let downloader = match self.http {
            Some(http) => Downloader::with_client(http),
            None => Downloader::new()?,
        };

        let mut cache = DatasetCache {
            name: self.name,
            root,
            descriptor: self.descriptor,
            downloader,
            progress_tx: self.progress_tx,
            ground_truth: BTreeMap::new(),
            last_report: AcquisitionReport::default(),
        };
        cache.recall_ground_truth();
        Ok(cache)
    }
}

fn validate_dataset_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(BbbcError::config("Dataset name must not be empty"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BbbcError::config(format!(
            "Dataset name {:?} must be a single path component",
            name
        ))),
    }
}

/// Download-on-demand cache for one dataset instance.
pub struct DatasetCache {
    name: String,
    root: PathBuf,
    descriptor: DatasetDescriptor,
    downloader: Downloader,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ground_truth: BTreeMap<ArtifactRole, PathBuf>,
    last_report: AcquisitionReport,
}

impl DatasetCache {
    /// Create a builder for a dataset cache.
    pub fn builder(name: impl Into<String>, descriptor: DatasetDescriptor) -> DatasetCacheBuilder {
        DatasetCacheBuilder::new(name, descriptor)
    }

    /// Create the cache root under `config` and run the acquisition pass.
    pub async fn open(
        name: impl Into<String>,
        descriptor: DatasetDescriptor,
        config: &CacheConfig,
    ) -> Result<Self> {
        Self::builder(name, descriptor)
            .config(config.clone())
            .open()
            .await
    }

    /// Open a catalogued dataset by id and optional variant.
    pub async fn from_registry(
        id: &str,
        variant: Option<&str>,
        config: &CacheConfig,
    ) -> Result<Self> {
        let (name, descriptor) = registry::find(id)?.descriptor(variant)?;
        Self::open(name, descriptor, config).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory owned by this dataset.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    /// Stop reporting progress and hand back the sender.
    ///
    /// Once the returned sender (if any) is dropped, the receiver sees the
    /// channel close after draining the updates already queued.
    pub fn detach_progress(&mut self) -> Option<mpsc::Sender<DownloadProgress>> {
        self.progress_tx.take()
    }

    /// Report of the most recent acquisition pass.
    pub fn report(&self) -> &AcquisitionReport {
        &self.last_report
    }

    /// Run the acquisition pass over every fetchable URL, one at a time.
    ///
    /// Failures of individual URLs are logged and recorded in the report;
    /// the pass always continues with the next URL.
    pub async fn acquire(&mut self) -> AcquisitionReport {
        let work: Vec<(String, String)> = self
            .descriptor
            .fetchable_urls()
            .into_iter()
            .map(|(key, url)| (key.to_string(), url.to_string()))
            .collect();

        info!("Acquiring {} ({} files)", self.name, work.len());
        let mut report = AcquisitionReport::default();
        for (key, url) in work {
            report.outcomes.push(self.fetch_one(&key, &url).await);
        }

        if report.failed() > 0 {
            warn!(
                "{}: {} of {} files could not be used",
                self.name,
                report.failed(),
                report.outcomes.len()
            );
        }
        self.last_report = report.clone();
        report
    }

    /// Make one role/URL pair available locally.
    pub async fn fetch_one(&mut self, role_key: &str, url: &str) -> FetchOutcome {
        let outcome = FetchOutcome::new(role_key, url);

        if !is_network_url(url) {
            debug!("Skipping {}: not a network URL", url);
            return outcome.finish(FetchState::Skipped);
        }

        let Some(file_name) = url_basename(url) else {
            warn!("Skipping {}: URL has no file name", url);
            return outcome.fail(FetchState::Skipped, "URL has no file name");
        };

        let target = self.root.join(&file_name);
        let mut outcome = FetchOutcome {
            target: Some(target.clone()),
            ..outcome
        };

        if target.exists() {
            debug!("{} already present", target.display());
        } else {
            info!("Downloading {}", url);
            match self
                .downloader
                .download(url, &target, self.progress_tx.as_ref())
                .await
            {
                Ok(bytes) => {
                    outcome.transferred = true;
                    outcome.bytes_transferred = bytes;
                }
                Err(e) => {
                    warn!("Failed to download {}: {}", url, e);
                    return outcome.fail(FetchState::DownloadFailed, e);
                }
            }
        }

        self.post_process(role_key, &target, outcome)
    }

    fn post_process(
        &mut self,
        role_key: &str,
        target: &Path,
        mut outcome: FetchOutcome,
    ) -> FetchOutcome {
        match ArtifactKind::from_path(target) {
            ArtifactKind::Archive => {
                let dest = self.extraction_dir(role_key, target);
                if dest.exists() {
                    debug!("{} already extracted", target.display());
                    return outcome.finish(FetchState::AlreadyExtracted);
                }
                match archive::extract_zip(target, &dest) {
                    Ok(files) => {
                        outcome.files_extracted = files;
                        outcome.finish(FetchState::Extracted)
                    }
                    Err(e) => {
                        warn!("Failed to extract {}: {}", target.display(), e);
                        outcome.fail(FetchState::ExtractionFailed, e)
                    }
                }
            }
            ArtifactKind::GroundTruth => {
                let role = ArtifactRole::from_role_key(role_key);
                if let Some(previous) = self.ground_truth.get(&role) {
                    if previous != target {
                        warn!(
                            "{} ground truth {} replaced by {}",
                            role,
                            previous.display(),
                            target.display()
                        );
                    }
                }
                info!("Recorded {} ground truth {}", role, target.display());
                self.ground_truth.insert(role, target.to_path_buf());
                outcome.finish(FetchState::GroundTruthRecorded)
            }
            ArtifactKind::Unclassified(extension) => {
                let err = BbbcError::Classification {
                    path: target.to_path_buf(),
                    extension,
                };
                warn!("{}", err);
                outcome.fail(FetchState::ClassificationFailed, err)
            }
        }
    }

    /// Record ground-truth files an earlier pass left on disk.
    fn recall_ground_truth(&mut self) {
        let present: Vec<(ArtifactRole, PathBuf)> = self
            .descriptor
            .fetchable_urls()
            .into_iter()
            .filter_map(|(key, url)| {
                let target = self.root.join(url_basename(url)?);
                let is_ground_truth = ArtifactKind::from_path(&target) == ArtifactKind::GroundTruth;
                (is_ground_truth && target.is_file())
                    .then(|| (ArtifactRole::from_role_key(key), target))
            })
            .collect();
        self.ground_truth.extend(present);
    }

    /// Directory an archive unpacks into: `<root>/<role subdir>/<archive stem>`.
    ///
    /// Each archive gets its own directory, so a role made of several parts
    /// extracts every part exactly once.
    pub fn extraction_dir(&self, role_key: &str, archive: &Path) -> PathBuf {
        let stem = archive
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        self.root.join(target_subdir(role_key)).join(stem)
    }

    /// List files under `<root>/<subdir>`; a missing subdirectory is empty.
    pub fn list_role(&self, subdir: &str, recursive: bool) -> Vec<PathBuf> {
        list_files(&self.root.join(subdir), recursive)
    }

    /// Every extracted file of a category.
    ///
    /// Image and label listings keep only files with an image extension;
    /// metadata listings return everything.
    pub fn role_paths(&self, role: ArtifactRole) -> Vec<PathBuf> {
        role.subdirs()
            .iter()
            .flat_map(|subdir| self.list_role(subdir, true))
            .filter(|path| !role.filters_image_extensions() || has_image_extension(path))
            .collect()
    }

    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.role_paths(ArtifactRole::Image)
    }

    /// Label and segmentation masks.
    pub fn label_paths(&self) -> Vec<PathBuf> {
        self.role_paths(ArtifactRole::Label)
    }

    /// Masks extracted from `segmentation_*` roles only.
    pub fn segmentation_paths(&self) -> Vec<PathBuf> {
        self.list_role(PathsConfig::SEGMENTATION_DIR_NAME, true)
            .into_iter()
            .filter(|path| has_image_extension(path))
            .collect()
    }

    pub fn metadata_paths(&self) -> Vec<PathBuf> {
        self.role_paths(ArtifactRole::Metadata)
    }

    /// Ground-truth file recorded for a category, if any.
    pub fn ground_truth(&self, role: ArtifactRole) -> Option<&Path> {
        self.ground_truth.get(&role).map(PathBuf::as_path)
    }

    pub fn ground_truth_files(&self) -> impl Iterator<Item = (ArtifactRole, &Path)> {
        self.ground_truth
            .iter()
            .map(|(role, path)| (*role, path.as_path()))
    }

    /// Best-effort reachability check for `url`. Never errors.
    pub async fn validate_remote(&self, url: &str) -> bool {
        self.downloader.client().probe(url).await
    }

    /// Probe every URL the acquisition pass would visit, in order.
    pub async fn probe_all(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for (_, url) in self.descriptor.fetchable_urls() {
            results.push((url.to_string(), self.validate_remote(url).await));
        }
        results
    }
}

/// Best-effort reachability check without a cache instance.
pub async fn validate_remote(url: &str) -> bool {
    match HttpClient::new() {
        Ok(client) => client.probe(url).await,
        Err(e) => {
            debug!("Cannot probe {}: {}", url, e);
            false
        }
    }
}
