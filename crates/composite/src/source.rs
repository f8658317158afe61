//! # AssetSource - Where Part Assets Come From
//!
//! The loader's only dependency on asset loading. Supports:
//! - Local directory (development, CLI)
//! - HTTP/HTTPS base URL (`http` feature)
//! - In-memory scripted payloads (tests)

use crate::error::FetchError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Asynchronous asset fetcher.
///
/// Given a resource locator, returns the loaded asset or a [`FetchError`].
/// The loader wraps each result in an [`AssetHandle`](crate::AssetHandle)
/// and never inspects the asset itself.
#[async_trait]
pub trait AssetSource: Send + Sync + 'static {
    /// Loaded asset type
    type Asset: Send + Sync + 'static;

    /// Fetch the asset at `locator`
    async fn fetch(&self, locator: &str) -> Result<Self::Asset, FetchError>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Undecoded asset bytes as returned by the bundled sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    /// Locator the bytes were fetched from
    pub locator: String,
    pub bytes: Vec<u8>,
    /// MIME type (e.g., "model/gltf-binary", "image/png")
    pub mime_type: String,
}

impl RawAsset {
    pub fn new(locator: impl Into<String>, bytes: Vec<u8>) -> Self {
        let locator = locator.into();
        let mime_type = guess_mime(&locator);
        Self { locator, bytes, mime_type }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn guess_mime(locator: &str) -> String {
    mime_guess::from_path(locator)
        .first_or_octet_stream()
        .to_string()
}

// ============================================================================
// Directory Source
// ============================================================================

/// Reads locators as paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssetSource {
    root: PathBuf,
}

impl DirectoryAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `locator` under the root. Absolute paths and `..` are rejected.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, FetchError> {
        let mut path = self.root.clone();
        let mut depth = 0usize;

        for component in Path::new(locator).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FetchError::InvalidLocator(locator.to_string()));
                }
            }
        }

        if depth == 0 {
            return Err(FetchError::InvalidLocator(locator.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl AssetSource for DirectoryAssetSource {
    type Asset = RawAsset;

    async fn fetch(&self, locator: &str) -> Result<RawAsset, FetchError> {
        let path = self.resolve(locator)?;
        debug!("Reading {} from {}", locator, path.display());

        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(locator.to_string()),
            _ => FetchError::Io(format!("{}: {}", path.display(), e)),
        })?;

        Ok(RawAsset::new(locator, bytes))
    }

    fn name(&self) -> &str {
        "directory"
    }
}

// ============================================================================
// HTTP Source
// ============================================================================

/// Fetches locators relative to a base URL.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpAssetSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute locators pass through; relative ones are joined to the base.
    pub fn url_for(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            locator.to_string()
        } else {
            format!("{}/{}", self.base_url, locator.trim_start_matches("./"))
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl AssetSource for HttpAssetSource {
    type Asset = RawAsset;

    async fn fetch(&self, locator: &str) -> Result<RawAsset, FetchError> {
        let url = self.url_for(locator);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {} for {}", status, url)));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let mut asset = RawAsset::new(locator, bytes.to_vec());
        if let Some(mime_type) = mime_type {
            asset.mime_type = mime_type;
        }
        Ok(asset)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Memory Source
// ============================================================================

#[derive(Debug, Clone)]
struct Script {
    outcome: Result<Vec<u8>, FetchError>,
    delay: Duration,
}

/// In-memory source with scripted payloads, failures and delays.
///
/// Counts every fetch per locator so callers can assert how often the
/// loader actually went to the source.
#[derive(Debug, Default)]
pub struct MemoryAssetSource {
    scripts: DashMap<String, Script>,
    fetches: DashMap<String, usize>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `locator`
    pub fn with_asset(self, locator: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(locator, bytes);
        self
    }

    pub fn insert(&self, locator: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.script(locator.into(), |script| script.outcome = Ok(bytes.into()));
    }

    /// Fail every fetch of `locator` with `error`
    pub fn fail(&self, locator: impl Into<String>, error: FetchError) {
        self.script(locator.into(), |script| script.outcome = Err(error));
    }

    /// Delay every fetch of `locator`
    pub fn delay(&self, locator: impl Into<String>, delay: Duration) {
        self.script(locator.into(), |script| script.delay = delay);
    }

    fn script(&self, locator: String, edit: impl FnOnce(&mut Script)) {
        let mut entry = self.scripts.entry(locator.clone()).or_insert_with(|| Script {
            outcome: Err(FetchError::NotFound(locator)),
            delay: Duration::ZERO,
        });
        edit(entry.value_mut());
    }

    /// Number of fetches issued for `locator`
    pub fn fetch_count(&self, locator: &str) -> usize {
        self.fetches.get(locator).map(|n| *n).unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.iter().map(|n| *n.value()).sum()
    }
}

#[async_trait]
impl AssetSource for MemoryAssetSource {
    type Asset = RawAsset;

    async fn fetch(&self, locator: &str) -> Result<RawAsset, FetchError> {
        *self.fetches.entry(locator.to_string()).or_insert(0) += 1;

        let script = self.scripts.get(locator).map(|s| s.value().clone());
        let Some(script) = script else {
            return Err(FetchError::NotFound(locator.to_string()));
        };

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        script.outcome.map(|bytes| RawAsset::new(locator, bytes))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
