//! Cloud render service client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::types::{CloudStatus, RenderRequest, StatusResponse, SubmitReceipt, SubmitResponse};

/// Configuration for the cloud render client.
#[derive(Debug, Clone)]
pub struct CloudRenderConfig {
    /// Base URL of the render service
    pub base_url: String,
    /// Bearer token, if the service requires one
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for CloudRenderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CloudRenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CLOUD_RENDER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            token: std::env::var("CLOUD_RENDER_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("CLOUD_RENDER_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Client for the asynchronous cloud renderer.
pub struct CloudRenderClient {
    http: Client,
    config: CloudRenderConfig,
}

impl CloudRenderClient {
    pub fn new(config: CloudRenderConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(CloudRenderConfig::from_env())
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let invalid = || ClientError::InvalidResponse(format!("invalid render service url: {}", self.config.base_url));
        let mut url = Url::parse(&self.config.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Submit a render. Either returns a job handle to poll or, when the
    /// service rendered synchronously, the finished artifact URL.
    pub async fn submit(&self, request: &RenderRequest) -> ClientResult<SubmitReceipt> {
        let url = self.url(&["renders"])?;
        debug!(job_id = %request.job_id, platform = %request.platform, "Submitting render to {}", url);

        let response = self
            .authorize(self.http.post(url).json(request))
            .send()
            .await?;

        let body: SubmitResponse = read_json(response).await?;
        body.into_receipt()
    }

    /// Fetch the current state of a submitted render.
    pub async fn status(&self, handle: &str) -> ClientResult<CloudStatus> {
        let url = self.url(&["renders", handle])?;

        let response = self.authorize(self.http.get(url)).send().await?;

        let body: StatusResponse = read_json(response).await?;
        body.into_status()
    }
}

/// Check the status, then decode the body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::from_status(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("{e} in body: {}", body.chars().take(200).collect::<String>())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{EditMode, EditPlan, Platform, RenderState};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: Option<&str>) -> CloudRenderClient {
        CloudRenderClient::new(CloudRenderConfig {
            base_url: server.uri(),
            token: token.map(String::from),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request() -> RenderRequest {
        RenderRequest {
            job_id: "job-1".into(),
            platform: Platform::TikTok,
            spec: Platform::TikTok.spec(),
            edit_plan: EditPlan::new(EditMode::Narrative, Vec::new()),
            revision: 0,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = CloudRenderConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.token.is_none());
    }

    #[tokio::test]
    async fn test_submit_returns_handle_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/renders"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({"id": "r-9", "status": "queued"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server, Some("secret")).submit(&request()).await.unwrap();
        assert_eq!(receipt, SubmitReceipt::Handle("r-9".into()));
    }

    #[tokio::test]
    async fn test_submit_completed_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/renders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "done", "url": "https://cdn/out.mp4"}),
            ))
            .mount(&server)
            .await;

        let receipt = client(&server, None).submit(&request()).await.unwrap();
        assert_eq!(receipt, SubmitReceipt::Completed("https://cdn/out.mp4".into()));
    }

    #[tokio::test]
    async fn test_submit_rejection_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("plan has no clips"))
            .mount(&server)
            .await;

        let err = client(&server, None).submit(&request()).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, None).submit(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/renders/r-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "failed", "error": "codec exploded"}),
            ))
            .mount(&server)
            .await;

        let status = client(&server, None).status("r-9").await.unwrap();
        assert_eq!(status.state, RenderState::Failed);
        assert_eq!(status.error.as_deref(), Some("codec exploded"));
    }

    #[tokio::test]
    async fn test_status_handle_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/renders/a%2Fb%3Fc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "queued"})))
            .expect(1)
            .mount(&server)
            .await;

        let status = client(&server, None).status("a/b?c").await.unwrap();
        assert_eq!(status.state, RenderState::Queued);
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/renders/r-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "rendering"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudRenderClient::new(CloudRenderConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            token: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let status = client.status("r-9").await.unwrap();
        assert_eq!(status.state, RenderState::Rendering);
    }

    #[tokio::test]
    async fn test_status_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server, None).status("r-1").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }
}
