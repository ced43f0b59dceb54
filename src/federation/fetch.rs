//! Object fetcher
//!
//! Bounded GET of remote ActivityStreams documents.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::object::Object;
use super::transport::Transport;
use crate::error::AppError;

/// Content type of ActivityStreams documents
pub const ACTIVITY_STREAMS_CONTENT_TYPE: &str = "application/activity+json";

/// Accept header sent when fetching ActivityStreams documents
pub const ACTIVITY_STREAMS_ACCEPT: &str = "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

const MEDIA_ACCEPT: &str = "image/png, image/jpeg, image/*;q=0.8";

#[derive(Clone)]
pub struct ObjectFetcher {
    transport: Arc<dyn Transport>,
    max_size: usize,
}

impl ObjectFetcher {
    pub fn new(transport: Arc<dyn Transport>, max_size: usize) -> Self {
        Self {
            transport,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// GET `url` (fragment dropped) and return the body.
    ///
    /// # Errors
    /// - `FetchFailed` for any status other than 200
    /// - `PayloadTooLarge` when the body exceeds the configured maximum
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.fetch_with_accept(url, ACTIVITY_STREAMS_ACCEPT).await
    }

    /// GET a media resource such as an avatar.
    pub async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.fetch_with_accept(url, MEDIA_ACCEPT).await
    }

    async fn fetch_with_accept(&self, url: &str, accept: &str) -> Result<Vec<u8>, AppError> {
        let url = url.split('#').next().unwrap_or(url);
        let response = self.transport.get(url, accept, self.max_size).await?;
        if response.status != 200 {
            tracing::debug!(url, status = response.status, "Remote fetch failed");
            return Err(AppError::FetchFailed {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Fetch and decode a remote object.
    pub async fn fetch_object(&self, url: &str) -> Result<Object, AppError> {
        let body = self.fetch(url).await?;
        Object::from_slice(&body)
            .map_err(|e| AppError::MalformedObject(format!("{}: {}", url, e)))
    }

    /// Fetch and decode an arbitrary JSON document.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body)
            .map_err(|e| AppError::MalformedObject(format!("{}: {}", url, e)))
    }
}
