//! Clip staging client.
//!
//! The cloud renderer cannot read the worker's disk, so preprocessed clips
//! are PUT to an object store first and the render plan references the
//! returned URLs.

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

const CLIP_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Object store prefix clips are uploaded under
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl StagingConfig {
    /// `None` when `STAGING_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("STAGING_URL").ok().filter(|u| !u.is_empty())?;
        Some(Self {
            base_url,
            token: std::env::var("STAGING_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("STAGING_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        })
    }
}

/// Optional body of an upload response.
#[derive(Debug, Default, Deserialize)]
struct StagedObject {
    #[serde(default)]
    url: Option<String>,
}

pub struct StagingClient {
    http: Client,
    config: StagingConfig,
}

impl StagingClient {
    pub fn new(config: StagingConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;
        Ok(Self { http, config })
    }

    fn object_url(&self, name: &str) -> ClientResult<Url> {
        let invalid = || ClientError::InvalidResponse(format!("invalid staging url: {}", self.config.base_url));
        let mut url = Url::parse(&self.config.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["clips", name]);
        Ok(url)
    }

    /// Upload the file at `path` as `clips/{name}`.
    ///
    /// Returns the URL from the response body when the store sends one,
    /// otherwise the object URL itself.
    pub async fn upload(&self, path: &Path, name: &str) -> ClientResult<String> {
        let url = self.object_url(name)?;
        let body = tokio::fs::read(path).await?;
        debug!(bytes = body.len(), "Staging {} at {}", path.display(), url);

        let mut request = self
            .http
            .put(url.clone())
            .header(CONTENT_TYPE, CLIP_CONTENT_TYPE)
            .body(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::from_status(status, &text));
        }

        let staged: StagedObject = if text.trim().is_empty() {
            StagedObject::default()
        } else {
            serde_json::from_str(&text)?
        };
        let location = staged
            .url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| url.to_string());

        info!("Staged {} at {}", path.display(), location);
        Ok(location)
    }
}
