//! Source clip fetching.
//!
//! Source ids are either full `http(s)://` URLs, bare asset ids resolved
//! against a base URL, or local paths (via [`LocalSourceFetcher`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::error::{MediaError, MediaResult};

/// Fetches a source clip to a local file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Write the source to `dest`, returning the number of bytes written.
    async fn fetch(&self, source_id: &str, dest: &Path, cancel: &CancelSignal) -> MediaResult<u64>;
}

/// Streams sources over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpSourceFetcher {
    /// Create a fetcher with a request timeout.
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::download_failed("", format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Create a fetcher from an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolve bare asset ids against `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn resolve_url(&self, source_id: &str) -> MediaResult<String> {
        if source_id.starts_with("http://") || source_id.starts_with("https://") {
            return Ok(source_id.to_string());
        }
        match &self.base_url {
            Some(base) => Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                source_id.trim_start_matches('/')
            )),
            None => Err(MediaError::download_failed(
                source_id,
                "bare source id and no base URL configured",
            )),
        }
    }

    async fn stream_to_file(&self, source_id: &str, url: &str, dest: &Path) -> MediaResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::download_failed(source_id, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(
                source_id,
                format!("HTTP {status} from {url}"),
            ));
        }

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| MediaError::download_failed(source_id, format!("create {}: {e}", dest.display())))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download_failed(source_id, e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| MediaError::download_failed(source_id, e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| MediaError::download_failed(source_id, e.to_string()))?;

        Ok(written)
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, source_id: &str, dest: &Path, cancel: &CancelSignal) -> MediaResult<u64> {
        let url = self.resolve_url(source_id)?;
        debug!(source_id, url = %url, "Fetching source");

        let bytes = cancel.run(self.stream_to_file(source_id, &url, dest)).await?;

        info!(source_id, bytes, "Fetched source to {}", dest.display());
        Ok(bytes)
    }
}

/// Copies sources from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalSourceFetcher {
    root: Option<PathBuf>,
}

impl LocalSourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative source ids under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, source_id: &str) -> PathBuf {
        let path = Path::new(source_id);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl SourceFetcher for LocalSourceFetcher {
    async fn fetch(&self, source_id: &str, dest: &Path, cancel: &CancelSignal) -> MediaResult<u64> {
        let src = self.resolve(source_id);
        debug!(source_id, "Copying local source {}", src.display());

        cancel
            .run(async {
                fs::copy(&src, dest).await.map_err(|e| {
                    MediaError::download_failed(source_id, format!("{}: {e}", src.display()))
                })
            })
            .await
    }
}

/// Picks HTTP or local fetching per source id.
///
/// URLs go over HTTP. Anything that exists on disk is copied. Remaining bare
/// ids go over HTTP when a base URL is configured.
#[derive(Debug, Clone)]
pub struct RoutingSourceFetcher {
    http: HttpSourceFetcher,
    local: LocalSourceFetcher,
}

impl RoutingSourceFetcher {
    pub fn new(http: HttpSourceFetcher, local: LocalSourceFetcher) -> Self {
        Self { http, local }
    }

    fn use_http(&self, source_id: &str) -> bool {
        if source_id.starts_with("http://") || source_id.starts_with("https://") {
            return true;
        }
        self.http.base_url.is_some() && !self.local.resolve(source_id).exists()
    }
}

#[async_trait]
impl SourceFetcher for RoutingSourceFetcher {
    async fn fetch(&self, source_id: &str, dest: &Path, cancel: &CancelSignal) -> MediaResult<u64> {
        if self.use_http(source_id) {
            self.http.fetch(source_id, dest, cancel).await
        } else {
            self.local.fetch(source_id, dest, cancel).await
        }
    }
}
