//! In-process transport
//!
//! Stands in for the rest of the federation in tests: serves canned
//! documents and records what would have been delivered.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::transport::{Transport, TransportResponse};
use crate::error::AppError;

/// A POST captured by [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedPost {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, TransportResponse>,
    failing: HashSet<String>,
    posts: Vec<RecordedPost>,
}

/// In-process federation peer.
///
/// Serves canned documents for GET, records every POST, and can be told to
/// fail specific URLs. Unknown GET URLs answer 404; POSTs answer 202.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `body` with `status` for GET `url`.
    pub fn insert(&self, url: &str, status: u16, body: Vec<u8>) {
        self.state()
            .documents
            .insert(url.to_string(), TransportResponse { status, body });
    }

    /// Serve a JSON document for GET `url`.
    pub fn insert_json(&self, url: &str, document: &serde_json::Value) {
        self.insert(url, 200, document.to_string().into_bytes());
    }

    /// Make every request to `url` fail at the network level.
    pub fn fail(&self, url: &str) {
        self.state().failing.insert(url.to_string());
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.state().posts.clone()
    }

    pub fn posts_to(&self, url: &str) -> Vec<RecordedPost> {
        self.state()
            .posts
            .iter()
            .filter(|post| post.url == url)
            .cloned()
            .collect()
    }

    pub fn clear_posts(&self) {
        self.state().posts.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(
        &self,
        url: &str,
        _accept: &str,
        max_size: usize,
    ) -> Result<TransportResponse, AppError> {
        let state = self.state();
        if state.failing.contains(url) {
            return Err(AppError::Transport(format!("connection refused: {}", url)));
        }

        let response = state
            .documents
            .get(url)
            .cloned()
            .unwrap_or(TransportResponse {
                status: 404,
                body: Vec::new(),
            });
        if response.body.len() > max_size {
            return Err(AppError::PayloadTooLarge { limit: max_size });
        }
        Ok(response)
    }

    async fn post(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        _max_size: usize,
    ) -> Result<TransportResponse, AppError> {
        let mut state = self.state();
        if state.failing.contains(url) {
            return Err(AppError::Transport(format!("connection refused: {}", url)));
        }

        state.posts.push(RecordedPost {
            url: url.to_string(),
            headers,
            body,
        });
        Ok(TransportResponse {
            status: 202,
            body: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_transport_serves_and_records() {
        let transport = MemoryTransport::new();
        transport.insert_json(
            "https://remote.example/actor/bob",
            &serde_json::json!({"type": "Person", "id": "https://remote.example/actor/bob"}),
        );

        let found = transport
            .get("https://remote.example/actor/bob", "application/activity+json", 1024)
            .await
            .unwrap();
        assert_eq!(found.status, 200);

        let missing = transport
            .get("https://remote.example/actor/nobody", "application/activity+json", 1024)
            .await
            .unwrap();
        assert_eq!(missing.status, 404);

        let too_large = transport
            .get("https://remote.example/actor/bob", "application/activity+json", 4)
            .await;
        assert!(matches!(too_large, Err(AppError::PayloadTooLarge { limit: 4 })));

        transport
            .post(
                "https://remote.example/actor/bob/inbox",
                vec![("Content-Type".to_string(), "application/activity+json".to_string())],
                b"{}".to_vec(),
                1024,
            )
            .await
            .unwrap();
        let posts = transport.posts_to("https://remote.example/actor/bob/inbox");
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].header("content-type"),
            Some("application/activity+json")
        );
    }

    #[tokio::test]
    async fn memory_transport_failing_urls() {
        let transport = MemoryTransport::new();
        transport.fail("https://down.example/inbox");
        let result = transport
            .post("https://down.example/inbox", Vec::new(), Vec::new(), 1024)
            .await;
        assert!(matches!(result, Err(AppError::Transport(_))));
        assert!(transport.posts().is_empty());
    }
}
