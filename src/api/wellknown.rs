//! Well-known endpoints
//!
//! - /.well-known/webfinger

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::data::User;
use crate::error::AppError;
use crate::federation::generate_webfinger_response;

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
pub fn wellknown_router() -> Router<AppState> {
    Router::new().route("/.well-known/webfinger", get(webfinger))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Resolves `acct:name@domain`, `mailto:email` or an actor IRI to a local
/// user. Federated users are never answered for.
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Response, AppError> {
    let user = lookup(&state, &query.resource)
        .await?
        .filter(|user| !user.is_federated())
        .ok_or(AppError::NotFound)?;

    let response = generate_webfinger_response(
        &user.name,
        &user.email,
        &state.config.server.domain,
        &state.config.server.base_url(),
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/jrd+json"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Json(response),
    )
        .into_response())
}

async fn lookup(state: &AppState, resource: &str) -> Result<Option<User>, AppError> {
    let domain = &state.config.server.domain;

    if let Some(acct) = resource.strip_prefix("acct:") {
        let (name, host) = acct
            .rsplit_once('@')
            .ok_or_else(|| AppError::Validation("Invalid acct format".to_string()))?;
        if !host.eq_ignore_ascii_case(domain) {
            return Err(AppError::Validation(format!(
                "Resource host {} is not this instance",
                host
            )));
        }
        return state.db.get_user_by_name(name).await;
    }

    if let Some(email) = resource.strip_prefix("mailto:") {
        return state.db.get_user_by_email(email).await;
    }

    let url = url::Url::parse(resource)
        .map_err(|_| AppError::Validation(format!("Unsupported resource: {}", resource)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "Unsupported resource scheme: {}",
            url.scheme()
        )));
    }

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    if !host.eq_ignore_ascii_case(domain) {
        return Err(AppError::Validation(format!(
            "Resource host {} is not this instance",
            host
        )));
    }

    // `/actor/<name>` or the profile URL `/<name>`
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        ["actor", name] | [name] => state.db.get_user_by_name(name).await,
        _ => Ok(None),
    }
}
