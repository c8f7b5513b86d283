//! HTTP client for dataset transfers and reachability probes.
//!
//! Provides a wrapper around reqwest with:
//! - No overall timeout on transfers (large archives may take hours)
//! - A short timeout on HEAD probes
//! - Status checking that maps failures onto [`BbbcError`]

use crate::config::NetworkConfig;
use crate::{BbbcError, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP client used by the dataset cache.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    probe_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_probe_timeout(NetworkConfig::PROBE_TIMEOUT)
    }

    /// Create a new HTTP client with a custom probe timeout.
    pub fn with_probe_timeout(probe_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            probe_timeout,
        })
    }

    /// Make a GET request, failing on any non-success status.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        Self::check_response_status(response, url)
    }

    /// Check whether a URL answers a HEAD request with a success status.
    ///
    /// Redirects are followed. Every failure mode (DNS, refused connection,
    /// timeout, error status) collapses to `false`.
    pub async fn probe(&self, url: &str) -> bool {
        match self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                debug!("HEAD {} -> {}", url, status);
                status == StatusCode::OK
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    fn check_response_status(response: Response, url: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(BbbcError::DownloadFailed {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("HTTP status {}", status),
        })
    }
}
