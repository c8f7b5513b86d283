//! Streamed downloads into the dataset cache.
//!
//! Bytes go to `<target>.part` as they arrive and the file is renamed onto
//! the target only after the last chunk is flushed. The target therefore
//! exists only when the transfer completed, which is what the cache's
//! "already present" check relies on.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{BbbcError, Result};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Snapshot of one transfer, sent over the progress channel.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_downloaded: u64,
    /// From `Content-Length`, when the server sends one.
    pub total_bytes: Option<u64>,
    /// Average rate since the transfer started.
    pub speed_bytes_per_sec: f64,
    /// 0-100, only when the total is known.
    pub percent: Option<f64>,
    pub eta_seconds: Option<f64>,
}

impl DownloadProgress {
    fn snapshot(url: &str, received: u64, total: Option<u64>, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 { received as f64 / secs } else { 0.0 };
        let percent = total.map(|total| match total {
            0 => 100.0,
            total => received as f64 * 100.0 / total as f64,
        });
        let eta_seconds = match total {
            Some(total) if speed > 0.0 && received < total => {
                Some((total - received) as f64 / speed)
            }
            _ => None,
        };

        Self {
            url: url.to_string(),
            bytes_downloaded: received,
            total_bytes: total,
            speed_bytes_per_sec: speed,
            percent,
            eta_seconds,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes == Some(self.bytes_downloaded)
    }
}

/// Book-keeping for one in-flight transfer.
struct Transfer<'a> {
    url: &'a str,
    total: Option<u64>,
    received: u64,
    started: Instant,
    last_report: Instant,
    interval: Duration,
    progress_tx: Option<&'a mpsc::Sender<DownloadProgress>>,
}

impl<'a> Transfer<'a> {
    fn new(
        url: &'a str,
        total: Option<u64>,
        interval: Duration,
        progress_tx: Option<&'a mpsc::Sender<DownloadProgress>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            url,
            total,
            received: 0,
            started: now,
            last_report: now,
            interval,
            progress_tx,
        }
    }

    /// Queue a snapshot if `force` is set or the report interval has passed.
    ///
    /// Never waits on the receiver: a full or closed channel drops the snapshot.
    fn report(&mut self, force: bool) {
        if !force && self.last_report.elapsed() < self.interval {
            return;
        }
        self.last_report = Instant::now();

        let progress =
            DownloadProgress::snapshot(self.url, self.received, self.total, self.started.elapsed());
        debug!(
            "{}: {} / {:?} bytes",
            self.url, progress.bytes_downloaded, progress.total_bytes
        );
        if let Some(tx) = self.progress_tx {
            let _ = tx.try_send(progress);
        }
    }
}

/// Downloads one URL at a time into the dataset cache.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: HttpClient,
    progress_interval: Duration,
    temp_suffix: &'static str,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self {
            http,
            progress_interval: NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX,
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.http
    }

    /// Path of the in-flight file for `destination`.
    pub fn temp_path(&self, destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_os_string();
        name.push(self.temp_suffix);
        PathBuf::from(name)
    }

    /// Transfer `url` to `destination`, returning the number of bytes written.
    ///
    /// Progress snapshots go to `progress_tx` at the start, every
    /// `DOWNLOAD_PROGRESS_INTERVAL`, and once more at the end; snapshots the
    /// receiver has no room for are dropped. On failure the partial file is
    /// removed and nothing exists at `destination`.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BbbcError::io_with_path(e, parent))?;
        }

        let part = self.temp_path(destination);
        let result = match self.stream_to(url, &part, progress_tx).await {
            Ok(bytes) => tokio::fs::rename(&part, destination)
                .await
                .map(|()| bytes)
                .map_err(|e| BbbcError::Io {
                    message: format!("Failed to move download into place: {}", e),
                    path: Some(destination.to_path_buf()),
                    source: Some(e),
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        url: &str,
        part: &Path,
        progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        let response = self.http.get(url).await?;
        let mut transfer = Transfer::new(
            url,
            response.content_length(),
            self.progress_interval,
            progress_tx,
        );

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| BbbcError::io_with_path(e, part))?;
        transfer.report(true);

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| BbbcError::io_with_path(e, part))?;
            transfer.received += chunk.len() as u64;
            transfer.report(false);
        }

        file.flush()
            .await
            .map_err(|e| BbbcError::io_with_path(e, part))?;
        transfer.report(true);

        Ok(transfer.received)
    }
}
