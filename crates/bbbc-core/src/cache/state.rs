//! Per-URL fetch outcomes and the acquisition report.

use serde::Serialize;
use std::path::PathBuf;

/// Where a role/URL pair ended up after one pass.
///
/// A pair moves `unfetched → downloading → downloaded` (or starts at
/// `downloaded` when the file is already on disk) and then stops in exactly
/// one of these states. Only terminal states are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    /// Not a network URL, or no usable file name; nothing was touched.
    Skipped,
    /// The transfer failed; no file was left at the target path.
    DownloadFailed,
    /// The archive was unpacked into its role subdirectory during this pass.
    Extracted,
    /// The archive's extraction directory already existed.
    AlreadyExtracted,
    /// The archive could not be unpacked (corrupt or unreadable).
    ExtractionFailed,
    /// A `.csv`/`.tif` file was recorded as the role's ground truth.
    GroundTruthRecorded,
    /// The file type has no post-processing rule.
    ClassificationFailed,
}

impl FetchState {
    /// Whether this outcome means the URL's content is unusable.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FetchState::DownloadFailed | FetchState::ExtractionFailed | FetchState::ClassificationFailed
        )
    }
}

/// Result of processing one role/URL pair.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub role_key: String,
    pub url: String,
    /// Local file for the URL, when one could be derived.
    pub target: Option<PathBuf>,
    pub state: FetchState,
    /// Whether a network transfer happened during this pass.
    pub transferred: bool,
    pub bytes_transferred: u64,
    /// Files written by extraction during this pass.
    pub files_extracted: usize,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub(crate) fn new(role_key: &str, url: &str) -> Self {
        Self {
            role_key: role_key.to_string(),
            url: url.to_string(),
            target: None,
            state: FetchState::Skipped,
            transferred: false,
            bytes_transferred: 0,
            files_extracted: 0,
            error: None,
        }
    }

    pub(crate) fn finish(mut self, state: FetchState) -> Self {
        self.state = state;
        self
    }

    pub(crate) fn fail(mut self, state: FetchState, error: impl ToString) -> Self {
        self.state = state;
        self.error = Some(error.to_string());
        self
    }
}

/// Everything one acquisition pass did, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl AcquisitionReport {
    /// Number of URLs transferred over the network.
    pub fn downloaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.transferred).count()
    }

    /// Number of archives unpacked during the pass.
    pub fn extracted(&self) -> usize {
        self.count(FetchState::Extracted)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state.is_failure()).count()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes_transferred).sum()
    }

    pub fn count(&self, state: FetchState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
