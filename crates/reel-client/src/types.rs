//! Request/response types for the external services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_models::{EditMode, EditPlan, Platform, PlatformSpec, RenderBackend, RenderState, VideoReview};

use crate::error::{ClientError, ClientResult};

/// Body of a cloud render submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Caller's job id, echoed back in logs on the renderer side
    pub job_id: String,
    pub platform: Platform,
    pub spec: PlatformSpec,
    pub edit_plan: EditPlan,
    #[serde(default)]
    pub revision: u32,
}

/// Raw submission response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, alias = "job_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "artifact_url")]
    pub url: Option<String>,
}

/// What a submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReceipt {
    /// Accepted for asynchronous rendering; poll with this handle
    Handle(String),
    /// Rendered immediately
    Completed(String),
}

impl SubmitResponse {
    /// Interpret the response. A URL counts as a finished artifact only when
    /// the status is `done` or absent; otherwise the id is the poll handle.
    pub fn into_receipt(self) -> ClientResult<SubmitReceipt> {
        let state = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(raw.parse::<RenderState>().ok()),
        };
        if state == Some(Some(RenderState::Failed)) {
            return Err(ClientError::Rejected {
                status: 200,
                message: "renderer reported the submission as failed".to_string(),
            });
        }

        let finished = matches!(state, None | Some(Some(RenderState::Done)));
        let url = self.url.filter(|u| !u.is_empty());
        let id = self.id.filter(|i| !i.is_empty());

        match (url, id) {
            (Some(url), _) if finished => Ok(SubmitReceipt::Completed(url)),
            (_, Some(id)) => Ok(SubmitReceipt::Handle(id)),
            (Some(_), None) => Err(ClientError::InvalidResponse(format!(
                "submission is still {} but has no job id to poll",
                self.status.unwrap_or_default()
            ))),
            (None, None) => Err(ClientError::InvalidResponse(
                "submission response has neither a job id nor an artifact url".to_string(),
            )),
        }
    }
}

/// Raw status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, alias = "artifact_url")]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parsed remote job status.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudStatus {
    pub state: RenderState,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn into_status(self) -> ClientResult<CloudStatus> {
        let state = self
            .status
            .parse::<RenderState>()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(CloudStatus {
            state,
            artifact_url: self.url.filter(|u| !u.is_empty()),
            error: self.error,
        })
    }
}

/// Body of a review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub artifact_url: String,
    pub platform: Platform,
    pub mode: EditMode,
    /// The plan that produced `artifact_url`
    pub edit_plan: EditPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub review: VideoReview,
    #[serde(default)]
    pub revised_plan: Option<EditPlan>,
}

/// Metadata persisted for a completed render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub job_id: String,
    pub platform: Platform,
    pub backend: RenderBackend,
    pub artifact_url: String,
    pub revision: u32,
    pub plan_id: String,
    pub duration_secs: f64,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_response_receipts() {
        let queued: SubmitResponse = serde_json::from_str(r#"{"id":"r-1","status":"queued"}"#).unwrap();
        assert_eq!(queued.into_receipt().unwrap(), SubmitReceipt::Handle("r-1".into()));

        let done: SubmitResponse =
            serde_json::from_str(r#"{"job_id":"r-2","status":"done","url":"https://cdn/x.mp4"}"#).unwrap();
        assert_eq!(
            done.into_receipt().unwrap(),
            SubmitReceipt::Completed("https://cdn/x.mp4".into())
        );

        let bare: SubmitResponse = serde_json::from_str(r#"{"url":"https://cdn/y.mp4"}"#).unwrap();
        assert_eq!(bare.into_receipt().unwrap(), SubmitReceipt::Completed("https://cdn/y.mp4".into()));

        let empty = SubmitResponse::default();
        assert!(matches!(empty.into_receipt(), Err(ClientError::InvalidResponse(_))));
    }

    #[test]
    fn test_in_flight_submission_with_upfront_url_is_polled() {
        let rendering: SubmitResponse = serde_json::from_str(
            r#"{"id":"r-1","status":"rendering","url":"https://cdn/placeholder.mp4"}"#,
        )
        .unwrap();
        assert_eq!(rendering.into_receipt().unwrap(), SubmitReceipt::Handle("r-1".into()));

        let queued: SubmitResponse =
            serde_json::from_str(r#"{"job_id":"r-2","status":"Queued","artifact_url":"https://cdn/later.mp4"}"#)
                .unwrap();
        assert_eq!(queued.into_receipt().unwrap(), SubmitReceipt::Handle("r-2".into()));

        let unpollable: SubmitResponse =
            serde_json::from_str(r#"{"status":"rendering","url":"https://cdn/placeholder.mp4"}"#).unwrap();
        assert!(matches!(unpollable.into_receipt(), Err(ClientError::InvalidResponse(_))));

        let failed: SubmitResponse =
            serde_json::from_str(r#"{"id":"r-3","status":"failed","url":"https://cdn/x.mp4"}"#).unwrap();
        assert!(failed.into_receipt().unwrap_err().is_rejection());
    }

    #[test]
    fn test_status_parsing() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"status":"Rendering","url":""}"#).unwrap();
        let parsed = status.into_status().unwrap();
        assert_eq!(parsed.state, RenderState::Rendering);
        assert!(parsed.artifact_url.is_none());

        let bogus = StatusResponse {
            status: "teleporting".into(),
            url: None,
            error: None,
        };
        assert!(bogus.into_status().is_err());
    }
}
