//! The boundary to the video platform.
//!
//! Implementations turn platform responses into [`FetchError`] values so the
//! download loop can tell a deleted video from a flaky connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::VideoId;

/// Metadata the platform returns for one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: VideoId,
    pub author: String,
    pub caption: String,
    pub media_url: String,
    pub mime_type: Option<String>,
    /// Platform document as received; written as the JSON sidecar.
    pub raw: serde_json::Value,
}

/// Downloaded media bytes.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Deleted, private or otherwise gone for good.
    #[error("video {0} is not available")]
    NotFound(VideoId),
    /// DNS, connect or timeout failure; worth retrying.
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TransientNetwork(_))
    }
}

/// Two-stage access to the platform: look a video up, then fetch its media.
pub trait VideoClient {
    fn resolve(&self, id: &VideoId) -> Result<VideoDescriptor, FetchError>;

    fn download(&self, descriptor: &VideoDescriptor) -> Result<MediaContent, FetchError>;
}

impl<C: VideoClient + ?Sized> VideoClient for &C {
    fn resolve(&self, id: &VideoId) -> Result<VideoDescriptor, FetchError> {
        (**self).resolve(id)
    }

    fn download(&self, descriptor: &VideoDescriptor) -> Result<MediaContent, FetchError> {
        (**self).download(descriptor)
    }
}
