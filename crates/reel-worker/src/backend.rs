//! Seams between the orchestrator and the systems it drives.
//!
//! Production implementations wrap the `reel-client` HTTP clients and the
//! `reel-media` local renderer; tests substitute in-memory fakes.

use std::path::PathBuf;

use async_trait::async_trait;

use reel_client::{
    ClientResult, CloudRenderClient, CloudStatus, LibraryClient, LibraryEntry, RenderRequest,
    ReviewClient, ReviewRequest, ReviewResponse, StagingClient, SubmitReceipt,
};
use reel_media::{CancelSignal, LocalRenderer, MediaResult};
use reel_models::{EditPlan, Platform, PreprocessedClip};

/// Asynchronous render service: submit, then poll.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    async fn submit(&self, request: &RenderRequest) -> ClientResult<SubmitReceipt>;
    async fn status(&self, handle: &str) -> ClientResult<CloudStatus>;
}

/// Makes a preprocessed clip readable by the cloud renderer.
#[async_trait]
pub trait ClipStager: Send + Sync {
    /// Returns the URL the renderer should fetch the clip from.
    async fn stage(&self, clip: &PreprocessedClip) -> ClientResult<String>;
}

/// Synchronous renderer producing a local file.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    async fn render(
        &self,
        plan: &EditPlan,
        platform: Platform,
        cancel: &CancelSignal,
    ) -> MediaResult<PathBuf>;
}

/// Critiques a finished render.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> ClientResult<ReviewResponse>;
}

/// Receives completed renders. Failures never affect the render.
#[async_trait]
pub trait LibrarySink: Send + Sync {
    async fn store(&self, entry: &LibraryEntry) -> ClientResult<()>;
}

#[async_trait]
impl CloudBackend for CloudRenderClient {
    async fn submit(&self, request: &RenderRequest) -> ClientResult<SubmitReceipt> {
        CloudRenderClient::submit(self, request).await
    }

    async fn status(&self, handle: &str) -> ClientResult<CloudStatus> {
        CloudRenderClient::status(self, handle).await
    }
}

#[async_trait]
impl ClipStager for StagingClient {
    async fn stage(&self, clip: &PreprocessedClip) -> ClientResult<String> {
        let extension = clip
            .local_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        self.upload(&clip.local_path, &format!("{}.{extension}", clip.id))
            .await
    }
}

#[async_trait]
impl LocalBackend for LocalRenderer {
    async fn render(
        &self,
        plan: &EditPlan,
        platform: Platform,
        cancel: &CancelSignal,
    ) -> MediaResult<PathBuf> {
        LocalRenderer::render(self, plan, platform, cancel).await
    }
}

#[async_trait]
impl Reviewer for ReviewClient {
    async fn review(&self, request: &ReviewRequest) -> ClientResult<ReviewResponse> {
        ReviewClient::review(self, request).await
    }
}

#[async_trait]
impl LibrarySink for LibraryClient {
    async fn store(&self, entry: &LibraryEntry) -> ClientResult<()> {
        LibraryClient::store(self, entry).await
    }
}
