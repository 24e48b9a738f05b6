//! HTTP clients for the services the render pipeline talks to.
//!
//! - [`CloudRenderClient`]: asynchronous cloud renderer (submit + status)
//! - [`ReviewClient`]: automated video reviewer
//! - [`LibraryClient`]: media library persistence
//! - [`StagingClient`]: uploads clips so the cloud renderer can read them

pub mod cloud;
pub mod error;
pub mod library;
pub mod reviewer;
pub mod staging;
pub mod types;

pub use cloud::{CloudRenderClient, CloudRenderConfig};
pub use error::{ClientError, ClientResult};
pub use library::{LibraryClient, LibraryConfig};
pub use reviewer::{ReviewClient, ReviewerConfig};
pub use staging::{StagingClient, StagingConfig};
pub use types::{
    CloudStatus, LibraryEntry, RenderRequest, ReviewRequest, ReviewResponse, StatusResponse,
    SubmitReceipt, SubmitResponse,
};
