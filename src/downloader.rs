use anyhow::{anyhow, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use mime::Mime;
use percent_encoding::percent_decode_str;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::file_manager::FileManager;
use crate::import_log::ImportLog;
use crate::settings::ImportSettings;

/// Remote URL to destination: a filesystem path for theme files, a CMS
/// folder path for assets.
pub type ResourceMap = BTreeMap<String, String>;

/// Source of remote resource bodies.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &ImportSettings) -> Result<Self> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(FetchError::UnsupportedScheme(url.to_string()));
            }

            tracing::debug!("GET {}", url);
            let response = self.client.get(url).send().await?;
            if response.status() != StatusCode::OK {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            Ok(response.bytes().await?.to_vec())
        }
        .boxed()
    }
}

/// Receives downloaded images and Flash movies that become CMS assets.
#[cfg_attr(test, mockall::automock)]
pub trait AssetRegistry: Send + Sync {
    /// Stores `content` at `folder_path` and returns a status message.
    fn create_asset(&self, folder_path: &str, content: &[u8], mime: &Mime) -> Result<String>;
}

/// Keeps assets as plain files, mirroring the CMS folder layout below a
/// local directory.
pub struct FsAssetRegistry {
    files: FileManager,
}

impl FsAssetRegistry {
    pub fn new(root: &Path) -> Self {
        Self {
            files: FileManager::new(root),
        }
    }

    /// Folder paths arrive percent-encoded; files are stored under the
    /// decoded names.
    pub fn asset_path(&self, folder_path: &str) -> PathBuf {
        let decoded = percent_decode_str(folder_path).decode_utf8_lossy();
        self.files.base_dir().join(decoded.trim_start_matches('/'))
    }
}

impl AssetRegistry for FsAssetRegistry {
    fn create_asset(&self, folder_path: &str, content: &[u8], mime: &Mime) -> Result<String> {
        let path = self.asset_path(folder_path);
        self.files.save_file(&path, content)?;
        Ok(format!("Created asset {} ({})", folder_path, mime))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadResult {
    pub url: String,
    pub destination: String,
    pub success: bool,
    /// Set when another batch already had the URL in flight; nothing was
    /// written by this entry.
    pub skipped: bool,
    pub message: String,
}

impl DownloadResult {
    fn new(url: &str, destination: &str, success: bool, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            destination: destination.to_string(),
            success,
            skipped: false,
            message: message.into(),
        }
    }

    fn skipped(url: &str, destination: &str, message: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(url, destination, true, message)
        }
    }
}

/// Holds a URL in the in-flight set until dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    url: String,
}

impl InFlightGuard {
    fn claim(in_flight: &Arc<Mutex<HashSet<String>>>, url: &str) -> Option<Self> {
        let mut urls = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !urls.insert(url.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            url: url.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

/// Downloads batches of resources into the theme root or the asset registry.
///
/// Clones share the in-flight set, so overlapping imports driven through
/// the same downloader never fetch one URL twice at the same time.
#[derive(Clone)]
pub struct FileDownloader {
    fetcher: Arc<dyn Fetch>,
    assets: Option<Arc<dyn AssetRegistry>>,
    files: FileManager,
    in_flight: Arc<Mutex<HashSet<String>>>,
    semaphore: Arc<Semaphore>,
}

impl FileDownloader {
    pub fn new(fetcher: Arc<dyn Fetch>, theme_root_dir: &Path, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            assets: None,
            files: FileManager::new(theme_root_dir),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn with_asset_registry(mut self, assets: Arc<dyn AssetRegistry>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let content = self.fetcher.fetch(url).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Downloads every entry concurrently. With `create_asset` the bodies go
    /// to the asset registry and the destinations are CMS folder paths.
    /// Each entry gets its own result; one failure never stops the others.
    pub async fn download_files(
        &self,
        files: &ResourceMap,
        log: &ImportLog,
        create_asset: bool,
    ) -> Vec<DownloadResult> {
        join_all(
            files
                .iter()
                .map(|(url, destination)| self.download_entry(url, destination, log, create_asset)),
        )
        .await
    }

    pub async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        log: &ImportLog,
    ) -> DownloadResult {
        self.download_entry(url, &destination.display().to_string(), log, false)
            .await
    }

    async fn download_entry(
        &self,
        url: &str,
        destination: &str,
        log: &ImportLog,
        create_asset: bool,
    ) -> DownloadResult {
        let Some(_guard) = InFlightGuard::claim(&self.in_flight, url) else {
            let message = format!("Skipping {}: already being downloaded", url);
            log.info("download", &message);
            return DownloadResult::skipped(url, destination, message);
        };

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                let message = format!("Download queue closed for {}: {}", url, e);
                log.error("download", &message);
                return DownloadResult::new(url, destination, false, message);
            }
        };

        match self.store(url, destination, create_asset).await {
            Ok(message) => {
                log.info("download", &message);
                DownloadResult::new(url, destination, true, message)
            }
            Err(e) => {
                let message = format!("Failed to download {}: {:#}", url, e);
                log.error("download", &message);
                DownloadResult::new(url, destination, false, message)
            }
        }
    }

    async fn store(&self, url: &str, destination: &str, create_asset: bool) -> Result<String> {
        let content = self.fetcher.fetch(url).await?;

        if create_asset {
            let assets = self
                .assets
                .as_ref()
                .ok_or_else(|| anyhow!("No asset registry configured for {}", destination))?;
            let mime = mime_guess::from_path(destination).first_or_octet_stream();
            assets.create_asset(destination, &content, &mime)
        } else {
            self.files.save_file(Path::new(destination), &content)?;
            Ok(format!("Downloaded {} to {}", url, destination))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned bodies and records every request.
    #[derive(Default)]
    pub struct MapFetcher {
        resources: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl MapFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: &str) -> Self {
            self.resources.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn request_count(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.as_str() == url)
                .count()
        }
    }

    impl Fetch for MapFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
            self.requests.lock().unwrap().push(url.to_string());
            let result = self
                .resources
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            let delay = self.delay;
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            .boxed()
        }
    }
}
