//! ForgeFed endpoints
//!
//! - Actor, repository, ticket and note documents
//! - Inboxes (activity receiving)
//! - Following/followers/liked collections
//! - Outboxes and repository followers (not implemented)

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::data::{Repository, User};
use crate::error::AppError;
use crate::federation::object::{
    self, Image, Note, Object, Person, PublicKey, Ticket, with_context,
};
use crate::federation::{ACTIVITY_STREAMS_CONTENT_TYPE, check_activity_binding, keys, main_key_id};
use crate::metrics::{
    FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL,
};

/// Create ForgeFed router
///
/// Routes:
/// - GET /actor/:name - Person document
/// - POST /actor/:name/inbox - Personal inbox
/// - GET /actor/:name/outbox - 501
/// - GET /actor/:name/following|followers|liked - Collections
/// - GET /repo/:owner/:name - Repository document
/// - POST /repo/:owner/:name/inbox - Repository inbox
/// - GET /repo/:owner/:name/outbox|followers - 501
/// - GET /ticket/:owner/:repo/:index - Ticket document
/// - GET /ticket/:owner/:repo/:index/:comment_id - Note document
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/actor/:name", get(actor))
        .route("/actor/:name/inbox", post(actor_inbox))
        .route("/actor/:name/outbox", get(not_implemented))
        .route("/actor/:name/following", get(following))
        .route("/actor/:name/followers", get(followers))
        .route("/actor/:name/liked", get(liked))
        .route("/repo/:owner/:name", get(repository))
        .route("/repo/:owner/:name/inbox", post(repository_inbox))
        .route("/repo/:owner/:name/outbox", get(not_implemented))
        .route("/repo/:owner/:name/followers", get(not_implemented))
        .route("/ticket/:owner/:repo/:index", get(ticket))
        .route("/ticket/:owner/:repo/:index/:comment_id", get(note))
}

/// Serialize `document` under the three JSON-LD contexts.
fn activity_response<T: Serialize>(document: &T) -> Result<Response, AppError> {
    let body = with_context(document)
        .and_then(|value| serde_json::to_vec(&value))
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((
        [(header::CONTENT_TYPE, ACTIVITY_STREAMS_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderedCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    total_items: usize,
    ordered_items: Vec<Object>,
}

impl OrderedCollection {
    fn new(id: String, ordered_items: Vec<Object>) -> Self {
        Self {
            kind: "OrderedCollection",
            id,
            total_items: ordered_items.len(),
            ordered_items,
        }
    }
}

async fn local_user(state: &AppState, name: &str) -> Result<User, AppError> {
    state
        .db
        .get_user_by_name(name)
        .await?
        .filter(|user| !user.is_federated())
        .ok_or(AppError::NotFound)
}

async fn public_repository(state: &AppState, owner: &str, name: &str) -> Result<Repository, AppError> {
    state
        .db
        .get_repository_by_owner_and_name(owner, name)
        .await?
        .filter(|repo| !repo.is_private)
        .ok_or(AppError::NotFound)
}

fn person_stub(iri: String) -> Object {
    Object::Person(Person {
        id: iri,
        ..Person::default()
    })
}

/// GET /actor/:name
///
/// The keypair is generated on first request.
async fn actor(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/actor/:name"])
        .start_timer();

    let user = local_user(&state, &name).await?;
    let public_key_pem =
        keys::ensure_keypair(&state.db, &user, state.config.federation.key_bits).await?;

    let base_url = state.config.server.base_url();
    let iri = user.iri(&base_url);
    let display_name = if user.full_name.is_empty() {
        user.name.clone()
    } else {
        user.full_name.clone()
    };

    let person = Object::Person(Person {
        id: iri.clone(),
        name: Some(display_name),
        preferred_username: Some(user.name.clone()),
        summary: None,
        url: Some(format!("{}/{}", base_url, user.name)),
        location: Some(user.email.clone()),
        icon: Some(Image::png(format!("{}/avatar/{}", base_url, user.name))),
        inbox: Some(format!("{}/inbox", iri)),
        outbox: Some(format!("{}/outbox", iri)),
        following: Some(format!("{}/following", iri)),
        followers: Some(format!("{}/followers", iri)),
        liked: Some(format!("{}/liked", iri)),
        public_key: Some(PublicKey {
            id: main_key_id(&iri),
            owner: Some(iri.clone()),
            public_key_pem,
        }),
    });

    let response = activity_response(&person)?;
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/actor/:name", "200"])
        .inc();
    Ok(response)
}

/// GET /actor/:name/following
async fn following(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let user = local_user(&state, &name).await?;
    let base_url = state.config.server.base_url();

    let items = state
        .db
        .get_following(&user.id)
        .await?
        .iter()
        .map(|followed| person_stub(followed.iri(&base_url)))
        .collect();
    activity_response(&OrderedCollection::new(
        format!("{}/following", user.iri(&base_url)),
        items,
    ))
}

/// GET /actor/:name/followers
async fn followers(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let user = local_user(&state, &name).await?;
    let base_url = state.config.server.base_url();

    let items = state
        .db
        .get_followers(&user.id)
        .await?
        .iter()
        .map(|follower| person_stub(follower.iri(&base_url)))
        .collect();
    activity_response(&OrderedCollection::new(
        format!("{}/followers", user.iri(&base_url)),
        items,
    ))
}

/// GET /actor/:name/liked
///
/// Starred repositories; private ones are left out.
async fn liked(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let user = local_user(&state, &name).await?;
    let base_url = state.config.server.base_url();

    let items = state
        .db
        .get_starred_repositories(&user.id)
        .await?
        .iter()
        .filter(|repo| !repo.is_private)
        .map(|repo| {
            Object::Repository(object::Repository {
                id: repo.iri(&base_url),
                ..object::Repository::default()
            })
        })
        .collect();
    activity_response(&OrderedCollection::new(
        format!("{}/liked", user.iri(&base_url)),
        items,
    ))
}

async fn not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

/// GET /repo/:owner/:name
async fn repository(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let repo = public_repository(&state, &owner, &name).await?;
    let base_url = state.config.server.base_url();
    let iri = repo.iri(&base_url);

    let owner = state
        .db
        .get_user_by_id(&repo.owner_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let forked_from = match repo.fork_id.as_deref() {
        Some(fork_id) => state
            .db
            .get_repository_by_id(fork_id)
            .await?
            .map(|origin| origin.iri(&base_url)),
        None => None,
    };

    activity_response(&Object::Repository(object::Repository {
        id: iri.clone(),
        name: Some(repo.name.clone()),
        attributed_to: Some(owner.iri(&base_url)),
        summary: Some(repo.description.clone()),
        inbox: Some(format!("{}/inbox", iri)),
        outbox: Some(format!("{}/outbox", iri)),
        followers: Some(format!("{}/followers", iri)),
        team: Some(format!("{}/team", iri)),
        forked_from,
    }))
}

/// GET /ticket/:owner/:repo/:index
async fn ticket(
    State(state): State<AppState>,
    Path((owner, repo, index)): Path<(String, String, i64)>,
) -> Result<Response, AppError> {
    let repo = public_repository(&state, &owner, &repo).await?;
    let issue = state
        .db
        .get_issue_by_index(&repo.id, index)
        .await?
        .ok_or(AppError::NotFound)?;
    let base_url = state.config.server.base_url();

    let poster = state.db.get_user_by_id(&issue.poster_id).await?;
    let (origin, target) = if issue.is_pull {
        match state.db.get_pull_request_by_issue_id(&issue.id).await? {
            Some(pr) => (
                branch_iri(&state, &pr.head_repo_id, &pr.head_branch).await?,
                branch_iri(&state, &pr.base_repo_id, &pr.base_branch).await?,
            ),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let id = issue
        .original_author
        .clone()
        .unwrap_or_else(|| state.codec.ticket(&repo.owner_name, &repo.name, issue.idx));
    activity_response(&Object::Ticket(Ticket {
        id,
        name: Some(format!("#{}", issue.idx)),
        attributed_to: poster.map(|poster| poster.iri(&base_url)),
        summary: Some(issue.title.clone()),
        content: Some(issue.content.clone()),
        context: Some(repo.iri(&base_url)),
        is_resolved: issue.is_closed,
        origin,
        target,
    }))
}

async fn branch_iri(state: &AppState, repo_id: &str, branch: &str) -> Result<Option<String>, AppError> {
    Ok(state
        .db
        .get_repository_by_id(repo_id)
        .await?
        .map(|repo| state.codec.branch(&repo.owner_name, &repo.name, branch)))
}

/// GET /ticket/:owner/:repo/:index/:comment_id
async fn note(
    State(state): State<AppState>,
    Path((owner, repo, index, comment_id)): Path<(String, String, i64, String)>,
) -> Result<Response, AppError> {
    let repo = public_repository(&state, &owner, &repo).await?;
    let issue = state
        .db
        .get_issue_by_index(&repo.id, index)
        .await?
        .ok_or(AppError::NotFound)?;
    let comment = state
        .db
        .get_comment_by_id(&comment_id)
        .await?
        .filter(|comment| comment.issue_id == issue.id)
        .ok_or(AppError::NotFound)?;
    let base_url = state.config.server.base_url();

    let ticket_iri = issue
        .original_author
        .clone()
        .unwrap_or_else(|| state.codec.ticket(&repo.owner_name, &repo.name, issue.idx));
    let id = comment
        .note_iri
        .clone()
        .unwrap_or_else(|| state.codec.note(&repo.owner_name, &repo.name, issue.idx, &comment.id));
    let poster = state.db.get_user_by_id(&comment.poster_id).await?;

    activity_response(&Object::Note(Note {
        id,
        attributed_to: poster.map(|poster| poster.iri(&base_url)),
        content: Some(comment.content.clone()),
        context: Some(ticket_iri),
        in_reply_to: None,
        to: Vec::new(),
    }))
}

/// POST /actor/:name/inbox
async fn actor_inbox(
    State(state): State<AppState>,
    Path(name): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/actor/:name/inbox"])
        .start_timer();

    local_user(&state, &name).await?;
    receive(&state, &uri, &headers, &body).await
}

/// POST /repo/:owner/:name/inbox
async fn repository_inbox(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/repo/:owner/:name/inbox"])
        .start_timer();

    state
        .db
        .get_repository_by_owner_and_name(&owner, &name)
        .await?
        .ok_or(AppError::NotFound)?;
    receive(&state, &uri, &headers, &body).await
}

/// Authenticate, decode and dispatch one inbound activity.
///
/// # Steps
/// 1. Verify the HTTP Signature (mirrors the signer on success)
/// 2. Decode the body as an Activity
/// 3. Bind actor/attributedTo to the signing key
/// 4. Dispatch
async fn receive(state: &AppState, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode, AppError> {
    let _timer = FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["inbound"])
        .start_timer();

    let path = uri
        .path_and_query()
        .map(|path_and_query| path_and_query.as_str())
        .unwrap_or_else(|| uri.path());

    let verification = match state.verifier.verify("POST", path, headers, body).await {
        Ok(verification) if verification.authenticated => verification,
        Ok(_) => {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["inbound", "unauthorized"])
                .inc();
            return Err(AppError::InvalidSignature);
        }
        Err(e) => {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["inbound", "unauthorized"])
                .inc();
            return Err(e);
        }
    };

    let activity = match Object::from_slice(body) {
        Ok(Object::Activity(activity)) => activity,
        Ok(other) => return Err(AppError::UnsupportedType(other.kind().to_string())),
        Err(e) => return Err(AppError::MalformedObject(e.to_string())),
    };

    if let Err(e) = check_activity_binding(&activity, &verification.key_id) {
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["inbound", "forbidden"])
            .inc();
        return Err(e);
    }

    state.processor.process(&activity).await?;

    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", "accepted"])
        .inc();
    tracing::debug!(
        kind = activity.kind.as_str(),
        actor = %verification.actor_iri,
        "Inbound activity processed"
    );
    Ok(StatusCode::NO_CONTENT)
}
