//! Declarative dataset descriptors.
//!
//! A descriptor maps role keys (`image_paths`, `label_path`,
//! `segmentation_path`, `metadata_paths`, ...) to one URL or an ordered list of
//! URLs. Keys ending in `_path`/`_paths` are fetchable; `local_path` is
//! reserved for the cache root override and every other key is ignored.

use crate::config::NetworkConfig;
use crate::error::{BbbcError, Result};
use serde_json::Value;
use std::collections::BTreeSet;

/// Reserved key holding the cache root override.
pub const LOCAL_PATH_KEY: &str = "local_path";

/// Where a role's files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSource {
    /// Not available for this dataset.
    Absent,
    Single(String),
    /// Ordered list; `None` entries are placeholders for variant-dependent files.
    Many(Vec<Option<String>>),
}

impl RoleSource {
    /// Non-empty URLs in declaration order.
    pub fn urls(&self) -> Vec<&str> {
        match self {
            RoleSource::Absent => Vec::new(),
            RoleSource::Single(url) if url.is_empty() => Vec::new(),
            RoleSource::Single(url) => vec![url.as_str()],
            RoleSource::Many(urls) => urls
                .iter()
                .flatten()
                .map(String::as_str)
                .filter(|url| !url.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.urls().is_empty()
    }
}

/// Immutable mapping from role key to source URLs for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetDescriptor {
    roles: Vec<(String, RoleSource)>,
    local_path: Option<String>,
    deferred: BTreeSet<String>,
}

impl DatasetDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a role to a single URL.
    pub fn with_url(self, key: impl Into<String>, url: impl Into<String>) -> Self {
        self.with_source(key, RoleSource::Single(url.into()))
    }

    /// Set a role to a single URL that may not exist for this variant.
    pub fn with_optional_url(self, key: impl Into<String>, url: Option<String>) -> Self {
        let source = match url {
            Some(url) => RoleSource::Single(url),
            None => RoleSource::Absent,
        };
        self.with_source(key, source)
    }

    /// Set a role to an ordered list of URLs.
    pub fn with_urls<I, S>(self, key: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls = urls.into_iter().map(|url| Some(url.into())).collect();
        self.with_source(key, RoleSource::Many(urls))
    }

    /// Set a role to an explicit source, replacing any earlier value for the key.
    ///
    /// `local_path` is routed to the cache root override rather than stored
    /// as a role.
    pub fn with_source(mut self, key: impl Into<String>, source: RoleSource) -> Self {
        let key = key.into();
        if key == LOCAL_PATH_KEY {
            self.local_path = source.urls().first().map(|s| s.to_string());
            return self;
        }
        match self.roles.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = source,
            None => self.roles.push((key, source)),
        }
        self
    }

    /// Override the cache root. Relative paths resolve under the storage root.
    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Mark a role as deferred: it stays declared but the acquisition pass skips it.
    pub fn defer(mut self, key: impl Into<String>) -> Self {
        self.deferred.insert(key.into());
        self
    }

    pub fn local_path(&self) -> Option<&str> {
        self.local_path.as_deref()
    }

    pub fn is_deferred(&self, key: &str) -> bool {
        self.deferred.contains(key)
    }

    /// Every declared role, including ignored and empty ones.
    pub fn roles(&self) -> impl Iterator<Item = (&str, &RoleSource)> {
        self.roles.iter().map(|(key, source)| (key.as_str(), source))
    }

    pub fn get(&self, key: &str) -> Option<&RoleSource> {
        self.roles
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, source)| source)
    }

    /// Roles the acquisition pass should process, in declaration order.
    pub fn fetchable_roles(&self) -> impl Iterator<Item = (&str, &RoleSource)> {
        self.roles().filter(move |(key, source)| {
            is_fetchable_key(key) && !self.is_deferred(key) && !source.is_empty()
        })
    }

    /// Every `(role key, url)` pair the acquisition pass would visit.
    pub fn fetchable_urls(&self) -> Vec<(&str, &str)> {
        self.fetchable_roles()
            .flat_map(|(key, source)| source.urls().into_iter().map(move |url| (key, url)))
            .collect()
    }

    /// Parse the JSON form of a descriptor.
    ///
    /// The document must be an object whose values are a string, `null`, or
    /// an array of strings and `null`s. Key order is preserved.
    ///
    /// ```rust
    /// use bbbc_datasets::DatasetDescriptor;
    ///
    /// let descriptor = DatasetDescriptor::from_json(r#"{
    ///     "image_paths": ["https://example.org/images.zip"],
    ///     "label_path": null,
    ///     "local_path": "data/example"
    /// }"#).unwrap();
    /// assert_eq!(descriptor.fetchable_urls().len(), 1);
    /// assert_eq!(descriptor.local_path(), Some("data/example"));
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let object = value
            .as_object()
            .ok_or_else(|| BbbcError::config("Descriptor must be a JSON object"))?;

        let mut descriptor = Self::new();
        for (key, value) in object {
            let source = match value {
                Value::Null => RoleSource::Absent,
                Value::String(url) => RoleSource::Single(url.clone()),
                Value::Array(items) => {
                    let mut urls = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Null => urls.push(None),
                            Value::String(url) => urls.push(Some(url.clone())),
                            other => {
                                return Err(BbbcError::config(format!(
                                    "Descriptor key {:?} has a non-string list entry: {}",
                                    key, other
                                )))
                            }
                        }
                    }
                    RoleSource::Many(urls)
                }
                other => {
                    return Err(BbbcError::config(format!(
                        "Descriptor key {:?} must be a string, null or list, got {}",
                        key, other
                    )))
                }
            };
            descriptor = descriptor.with_source(key.as_str(), source);
        }
        Ok(descriptor)
    }
}

/// Whether a descriptor key names a fetchable role.
pub fn is_fetchable_key(key: &str) -> bool {
    key != LOCAL_PATH_KEY && (key.ends_with("_path") || key.ends_with("_paths"))
}

/// Whether a URL uses a scheme the downloader speaks.
pub fn is_network_url(url: &str) -> bool {
    url::Url::parse(url)
        .map(|parsed| NetworkConfig::SUPPORTED_SCHEMES.contains(&parsed.scheme()))
        .unwrap_or(false)
}

/// Last non-empty path segment of a URL, used as the local file name.
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
