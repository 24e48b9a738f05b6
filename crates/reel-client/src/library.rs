//! Media library persistence client.

use std::time::Duration;

use reqwest::Client;

use crate::error::{ClientError, ClientResult};
use crate::types::LibraryEntry;

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl LibraryConfig {
    /// `None` when `LIBRARY_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("LIBRARY_URL").ok().filter(|u| !u.is_empty())?;
        Some(Self {
            base_url,
            timeout: Duration::from_secs(10),
        })
    }
}

pub struct LibraryClient {
    http: Client,
    config: LibraryConfig,
}

impl LibraryClient {
    pub fn new(config: LibraryConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;
        Ok(Self { http, config })
    }

    /// Store metadata for a completed render.
    pub async fn store(&self, entry: &LibraryEntry) -> ClientResult<()> {
        let url = format!("{}/library", self.config.base_url.trim_end_matches('/'));
        let response = self.http.post(&url).json(entry).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reel_models::{Platform, RenderBackend};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry() -> LibraryEntry {
        LibraryEntry {
            job_id: "job-1".into(),
            platform: Platform::Twitter,
            backend: RenderBackend::Local,
            artifact_url: "/out/twitter.mp4".into(),
            revision: 1,
            plan_id: "plan-1".into(),
            duration_secs: 42.0,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_posts_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/library"))
            .and(body_partial_json(serde_json::json!({"platform": "twitter", "backend": "local"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = LibraryClient::new(LibraryConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        client.store(&entry()).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate"))
            .mount(&server)
            .await;

        let client = LibraryClient::new(LibraryConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let err = client.store(&entry()).await.unwrap_err();
        assert!(err.is_rejection());
    }
}
