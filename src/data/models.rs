//! Data models
//!
//! Rust structs representing the forge entities federation touches.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Users
// =============================================================================

/// How a user authenticates.
///
/// `Federated` users are remote actors mirrored locally; they never carry a
/// local credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Local,
    Federated,
}

/// User setting key holding the PKCS#8 private key PEM
pub const SETTING_PRIVATE_PEM: &str = "activitypub_privpem";
/// User setting key holding the SPKI public key PEM
pub const SETTING_PUBLIC_PEM: &str = "activitypub_pubpem";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// Unique local name; remote actors are named `user@instance`
    pub name: String,
    pub full_name: String,
    pub email: String,
    pub login_type: LoginType,
    /// Actor IRI for federated users
    pub login_name: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a local user record (not yet persisted).
    pub fn new_local(name: &str, email: &str) -> Self {
        Self {
            id: EntityId::new().0,
            name: name.to_string(),
            full_name: String::new(),
            email: email.to_string(),
            login_type: LoginType::Local,
            login_name: None,
            is_private: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_federated(&self) -> bool {
        self.login_type == LoginType::Federated
    }

    /// Actor IRI: the stored IRI for remote actors, `<base>/actor/<name>` otherwise.
    pub fn iri(&self, base_url: &str) -> String {
        match (&self.login_type, &self.login_name) {
            (LoginType::Federated, Some(login_name)) => login_name.clone(),
            _ => format!("{}/actor/{}", base_url, self.name),
        }
    }
}

// =============================================================================
// Repositories
// =============================================================================

/// A repository row joined with its owner's name and login type.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Repository {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_login_type: LoginType,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub is_fork: bool,
    pub fork_id: Option<String>,
    /// Repository IRI on the origin instance for federated repositories
    pub original_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a repository.
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub fork_id: Option<String>,
    pub original_url: Option<String>,
}

impl NewRepository {
    pub fn new(owner_id: &str, name: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            is_private: false,
            fork_id: None,
            original_url: None,
        }
    }
}

impl Repository {
    /// Repository IRI: `original_url` when mirrored, `<base>/repo/<owner>/<name>` otherwise.
    pub fn iri(&self, base_url: &str) -> String {
        match &self.original_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}/repo/{}/{}", base_url, self.owner_name, self.name),
        }
    }

    /// Outbound activities about this repository must be delivered remotely.
    pub fn is_remote(&self) -> bool {
        self.name.contains('@') || self.owner_login_type == LoginType::Federated
    }
}

// =============================================================================
// Issues and pull requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Issue {
    pub id: String,
    pub repo_id: String,
    /// Per-repository index (`#<idx>`)
    pub idx: i64,
    pub title: String,
    pub content: String,
    pub poster_id: String,
    pub is_closed: bool,
    pub is_pull: bool,
    /// Ticket IRI for federated issues
    pub original_author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(repo_id: &str, idx: i64, poster_id: &str) -> Self {
        Self {
            id: EntityId::new().0,
            repo_id: repo_id.to_string(),
            idx,
            title: String::new(),
            content: String::new(),
            poster_id: poster_id.to_string(),
            is_closed: false,
            is_pull: false,
            original_author: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PullRequest {
    pub id: String,
    pub issue_id: String,
    pub head_repo_id: String,
    pub base_repo_id: String,
    pub head_branch: String,
    pub base_branch: String,
    /// Left empty; computed by the git layer
    pub merge_base: String,
}

// =============================================================================
// Comments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    pub poster_id: String,
    pub content: String,
    /// Originating Note IRI, kept for idempotence
    pub note_iri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(issue_id: &str, poster_id: &str, content: &str) -> Self {
        Self {
            id: EntityId::new().0,
            issue_id: issue_id.to_string(),
            poster_id: poster_id.to_string(),
            content: content.to_string(),
            note_iri: None,
            created_at: Utc::now(),
        }
    }
}
