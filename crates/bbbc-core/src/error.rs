//! Error types for the BBBC dataset cache.
//!
//! Only configuration and filesystem failures abort a dataset; everything that
//! goes wrong for a single URL is logged by the cache and the pass moves on.

use crate::config::NetworkConfig;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the BBBC dataset library.
#[derive(Debug, Error)]
pub enum BbbcError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Download failed for {url}: {message}")]
    DownloadFailed {
        url: String,
        status: Option<u16>,
        message: String,
    },

    // Classification errors
    #[error("Cannot classify {path:?}: unsupported file type {extension:?}")]
    Classification { path: PathBuf, extension: String },

    #[error("Archive error at {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for dataset cache operations.
pub type Result<T> = std::result::Result<T, BbbcError>;

impl From<std::io::Error> for BbbcError {
    fn from(err: std::io::Error) -> Self {
        BbbcError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BbbcError {
    fn from(err: serde_json::Error) -> Self {
        BbbcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// Transfers have no overall timeout, so the only deadline a request can
// miss is the connect timeout.
impl From<reqwest::Error> for BbbcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return BbbcError::Timeout(NetworkConfig::CONNECT_TIMEOUT);
        }
        BbbcError::Network {
            message: err.to_string(),
            cause: std::error::Error::source(&err).map(|s| s.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for BbbcError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => BbbcError::from(io),
            other => BbbcError::Archive {
                path: PathBuf::new(),
                message: other.to_string(),
            },
        }
    }
}

impl BbbcError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BbbcError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Attach the file an archive or IO error concerns.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            BbbcError::Archive { message, .. } => BbbcError::Archive {
                path: path.into(),
                message,
            },
            BbbcError::Io {
                message, source, ..
            } => BbbcError::Io {
                message,
                path: Some(path.into()),
                source,
            },
            other => other,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        BbbcError::Config {
            message: message.into(),
        }
    }

    /// Whether this error must abort the dataset instead of a single URL.
    ///
    /// The cache cannot proceed without its root directory or with an invalid
    /// dataset parameter; network and classification failures only cost the
    /// URL that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BbbcError::Config { .. } | BbbcError::Io { .. })
    }

    /// Whether this error came from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            BbbcError::Network { .. } | BbbcError::Timeout(_) | BbbcError::DownloadFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BbbcError::config("dataset name must not be empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: dataset name must not be empty"
        );

        let err = BbbcError::DownloadFailed {
            url: "https://example.org/a.zip".into(),
            status: Some(404),
            message: "status 404 Not Found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Download failed for https://example.org/a.zip: status 404 Not Found"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(BbbcError::config("bad variant").is_fatal());
        assert!(BbbcError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            "/opt/bbbc"
        )
        .is_fatal());
        assert!(!BbbcError::Timeout(std::time::Duration::from_secs(5)).is_fatal());
        assert!(!BbbcError::Classification {
            path: PathBuf::from("metadata.xlsx"),
            extension: "xlsx".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_network_errors() {
        assert!(BbbcError::Network {
            message: "connection refused".into(),
            cause: None,
        }
        .is_network());
        assert!(!BbbcError::config("x").is_network());
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let err: BbbcError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_zip_errors_carry_archive_path() {
        let err = BbbcError::from(zip::result::ZipError::InvalidArchive("bad magic".into()))
            .with_path("/cache/BBBC039/images.zip");
        match err {
            BbbcError::Archive { path, message } => {
                assert_eq!(path, PathBuf::from("/cache/BBBC039/images.zip"));
                assert!(message.contains("bad magic"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let err = BbbcError::from(zip::result::ZipError::Io(io)).with_path("/cache/a.zip");
        assert!(matches!(err, BbbcError::Io { path: Some(_), source: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_keeps_cause() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/a.zip")
            .send()
            .await
            .unwrap_err();
        let err = BbbcError::from(err);
        assert!(err.is_network());
        assert!(matches!(err, BbbcError::Network { cause: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_timeout_reports_connect_deadline() {
        // Accepted by the kernel backlog but never answered.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/a.zip", listener.local_addr().unwrap());

        let err = reqwest::Client::new()
            .get(url)
            .timeout(std::time::Duration::from_millis(100))
            .send()
            .await
            .unwrap_err();
        match BbbcError::from(err) {
            BbbcError::Timeout(limit) => assert_eq!(limit, NetworkConfig::CONNECT_TIMEOUT),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
