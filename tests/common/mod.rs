//! Common test utilities for E2E tests
//!
//! `TestServer` runs the real router on 127.0.0.1 with a `MemoryTransport`
//! standing in for the rest of the federation. `RemotePeer` is an actor on
//! that fake network that can sign requests to the server.

#![allow(dead_code)]

use std::sync::Arc;

use forgefed::data::{NewRepository, Repository, User};
use forgefed::federation::{
    ACTIVITY_STREAMS_CONTENT_TYPE, MemoryTransport, keys, main_key_id, sign_request,
};
use forgefed::{AppState, config};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const REMOTE: &str = "https://remote.example";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub domain: String,
    pub state: AppState,
    pub transport: MemoryTransport,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_max_size(4 * 1024 * 1024).await
    }

    /// Create a test server with a custom body cap
    pub async fn with_max_size(max_size: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind first: the domain carries the port so local IRIs resolve here
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let domain = addr.to_string();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: domain.clone(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            federation: config::FederationConfig {
                max_size,
                algorithms: vec!["rsa-sha256".to_string(), "hs2019".to_string()],
                key_bits: 1024,
                no_reply_address: None,
                allow_private_hosts: true,
                request_timeout_seconds: 5,
                user_agent: "forgefed/test".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let transport = MemoryTransport::new();
        let state = AppState::with_transport(config, Arc::new(transport.clone()))
            .await
            .unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        let app = forgefed::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", domain),
            domain,
            state,
            transport,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get URL for a request path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Local IRIs share the server address
    pub fn iri(&self, path: &str) -> String {
        self.url(path)
    }

    pub async fn create_local_user(&self, name: &str) -> User {
        self.state
            .users
            .create_local_user(name, &format!("{}@{}", name, self.domain))
            .await
            .unwrap()
    }

    pub async fn create_repository(&self, owner: &User, name: &str, is_private: bool) -> Repository {
        let mut repo = NewRepository::new(&owner.id, name);
        repo.is_private = is_private;
        self.state
            .db
            .insert_repository_if_absent(&repo)
            .await
            .unwrap()
            .0
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("Accept", ACTIVITY_STREAMS_CONTENT_TYPE)
            .send()
            .await
            .unwrap()
    }

    /// POST `activity` to `path`, signed with `peer`'s key.
    pub async fn post_signed(&self, peer: &RemotePeer, path: &str, activity: &Value) -> reqwest::Response {
        self.post_signed_with_key(peer, &peer.private_key_pem, path, activity)
            .await
    }

    /// POST signed with an arbitrary private key but `peer`'s keyId.
    pub async fn post_signed_with_key(
        &self,
        peer: &RemotePeer,
        private_key_pem: &str,
        path: &str,
        activity: &Value,
    ) -> reqwest::Response {
        let url = self.url(path);
        let body = serde_json::to_vec(activity).unwrap();
        let signed = sign_request(
            "POST",
            &url,
            Some(&body),
            private_key_pem,
            &peer.key_id,
            "rsa-sha256",
        )
        .unwrap();

        self.client
            .post(url)
            .header("Content-Type", ACTIVITY_STREAMS_CONTENT_TYPE)
            .header("Date", signed.date)
            .header("Digest", signed.digest.unwrap())
            .header("Signature", signed.signature)
            .body(body)
            .send()
            .await
            .unwrap()
    }
}

/// An actor on `remote.example`, published on the in-memory network.
pub struct RemotePeer {
    pub name: String,
    pub actor_iri: String,
    pub key_id: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
}

impl RemotePeer {
    /// Generate a key and publish the actor document and its WebFinger JRD.
    pub async fn publish(transport: &MemoryTransport, name: &str) -> Self {
        let keypair = keys::generate_keypair(1024).await.unwrap();
        let actor_iri = format!("{}/actor/{}", REMOTE, name);
        let key_id = main_key_id(&actor_iri);

        transport.insert_json(
            &actor_iri,
            &json!({
                "@context": ["https://www.w3.org/ns/activitystreams", "https://w3id.org/security/v1"],
                "type": "Person",
                "id": actor_iri,
                "preferredUsername": name,
                "inbox": format!("{}/inbox", actor_iri),
                "publicKey": {
                    "id": key_id,
                    "owner": actor_iri,
                    "publicKeyPem": keypair.public_key_pem,
                },
            }),
        );
        transport.insert_json(
            &format!(
                "{}/.well-known/webfinger?resource={}",
                REMOTE,
                urlencoding::encode(&actor_iri)
            ),
            &json!({ "subject": format!("acct:{}@remote.example", name), "links": [] }),
        );

        Self {
            name: name.to_string(),
            actor_iri,
            key_id,
            private_key_pem: keypair.private_key_pem,
            public_key_pem: keypair.public_key_pem,
        }
    }

    /// Name the actor carries on the local instance.
    pub fn local_name(&self) -> String {
        format!("{}@remote.example", self.name)
    }

    pub fn activity(&self, kind: &str, object: Value) -> Value {
        json!({
            "@context": ["https://www.w3.org/ns/activitystreams", "https://forgefed.org/ns"],
            "type": kind,
            "actor": self.actor_iri,
            "object": object,
        })
    }
}
