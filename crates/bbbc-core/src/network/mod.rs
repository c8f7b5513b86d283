//! Network utilities for dataset transfers.
//!
//! This module provides:
//! - HTTP client with a short-timeout reachability probe
//! - Streamed downloader with progress tracking

mod client;
mod download;

pub use client::HttpClient;
pub use download::{DownloadProgress, Downloader};
