//! Remote interaction endpoints
//!
//! - /authorize_interaction: mirror a remote object, then redirect to it
//! - /avatar/:name: stored user avatars

use axum::{
    Router,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::object::Object;

pub fn interaction_router() -> Router<AppState> {
    Router::new()
        .route("/authorize_interaction", get(authorize_interaction))
        .route("/avatar/:name", get(avatar))
}

#[derive(Debug, Deserialize)]
struct InteractionQuery {
    uri: String,
}

/// GET /authorize_interaction?uri=
///
/// Fetches the object at `uri`, materializes it, and redirects to the
/// local page of the result.
async fn authorize_interaction(
    State(state): State<AppState>,
    Query(query): Query<InteractionQuery>,
) -> Result<Redirect, AppError> {
    let uri = url::Url::parse(&query.uri)
        .map_err(|e| AppError::Validation(format!("Invalid uri {}: {}", query.uri, e)))?;
    let base_url = state.config.server.base_url();

    let object = state.fetcher.fetch_object(uri.as_str()).await?;
    let location = match object {
        Object::Person(person) => {
            let user = state
                .materializer
                .materialize_actor(&person)
                .await?
                .ok_or(AppError::NotFound)?;
            format!("{}/{}", base_url, user.name)
        }
        Object::Repository(repo) => {
            let repo = state.materializer.repository_from_iri(&repo.id).await?;
            format!("{}/{}/{}", base_url, repo.owner_name, repo.name)
        }
        Object::Ticket(ticket) => {
            let issue = state.materializer.materialize_ticket(&ticket).await?;
            let repo = state
                .db
                .get_repository_by_id(&issue.repo_id)
                .await?
                .ok_or(AppError::NotFound)?;
            format!(
                "{}/{}/{}/issues/{}",
                base_url, repo.owner_name, repo.name, issue.idx
            )
        }
        other => return Err(AppError::UnsupportedType(other.kind().to_string())),
    };

    tracing::debug!(uri = %query.uri, %location, "Authorized remote interaction");
    Ok(Redirect::to(&location))
}

/// GET /avatar/:name
async fn avatar(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let user = state
        .db
        .get_user_by_name(&name)
        .await?
        .ok_or(AppError::NotFound)?;
    let avatar = state
        .db
        .get_user_avatar(&user.id)
        .await?
        .filter(|avatar| !avatar.is_empty())
        .ok_or(AppError::NotFound)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], avatar).into_response())
}
