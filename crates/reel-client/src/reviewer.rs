//! Automated reviewer client.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::cloud::read_json;
use crate::error::{ClientError, ClientResult};
use crate::types::{ReviewRequest, ReviewResponse};

#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    pub base_url: String,
    /// Reviews watch the whole render, so this is generous
    pub timeout: Duration,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

impl ReviewerConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("REVIEWER_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            timeout: Duration::from_secs(
                std::env::var("REVIEWER_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(180),
            ),
        }
    }
}

pub struct ReviewClient {
    http: Client,
    config: ReviewerConfig,
}

impl ReviewClient {
    pub fn new(config: ReviewerConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ReviewerConfig::from_env())
    }

    /// Ask the reviewer to critique a finished render.
    pub async fn review(&self, request: &ReviewRequest) -> ClientResult<ReviewResponse> {
        let url = format!("{}/reviews", self.config.base_url.trim_end_matches('/'));
        debug!(
            platform = %request.platform,
            plan_id = %request.edit_plan.id,
            "Requesting review of {}",
            request.artifact_url
        );

        let response = self.http.post(&url).json(request).send().await?;
        read_json(response).await
    }
}
