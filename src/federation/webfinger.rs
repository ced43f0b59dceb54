//! WebFinger protocol implementation
//!
//! Serves JRD documents for local users and asks remote instances for the
//! canonical account name behind an actor IRI.

use serde::{Deserialize, Serialize};

use super::fetch::ObjectFetcher;
use super::iri::IriCodec;
use crate::error::AppError;

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl WebFingerLink {
    fn href(rel: &str, link_type: Option<&str>, href: String) -> Self {
        Self {
            rel: rel.to_string(),
            link_type: link_type.map(str::to_string),
            href: Some(href),
            template: None,
        }
    }
}

/// Generate WebFinger response for a local user.
///
/// # Arguments
/// * `username` - Local username
/// * `email` - User email, published as a `mailto:` alias
/// * `domain` - Instance domain
/// * `base_url` - Instance base URL (includes protocol)
pub fn generate_webfinger_response(
    username: &str,
    email: &str,
    domain: &str,
    base_url: &str,
) -> WebFingerResponse {
    let base_url = base_url.trim_end_matches('/');
    let profile_url = format!("{}/{}", base_url, username);
    let actor_url = format!("{}/actor/{}", base_url, username);

    let mut aliases = vec![profile_url.clone(), actor_url.clone()];
    if !email.is_empty() {
        aliases.push(format!("mailto:{}", email));
    }

    WebFingerResponse {
        subject: format!("acct:{}@{}", username, domain),
        aliases: Some(aliases),
        links: vec![
            WebFingerLink::href(
                "http://webfinger.net/rel/profile-page",
                Some("text/html"),
                profile_url,
            ),
            WebFingerLink::href(
                "http://webfinger.net/rel/avatar",
                Some("image/png"),
                format!("{}/avatar/{}", base_url, username),
            ),
            WebFingerLink::href("self", Some("application/activity+json"), actor_url),
            WebFingerLink {
                rel: "http://ostatus.org/schema/1.0/subscribe".to_string(),
                link_type: None,
                href: None,
                template: Some(format!("{}/authorize_interaction?uri={{uri}}", base_url)),
            },
        ],
    }
}

/// Ask the actor's home instance for its account name.
///
/// Returns `user@instance`, the name remote users carry locally.
///
/// # Errors
/// - Transport errors from the lookup
/// - `MalformedObject` if the subject is not an `acct:` URI
pub async fn resolve_actor_name(fetcher: &ObjectFetcher, actor_iri: &str) -> Result<String, AppError> {
    let instance = IriCodec::instance(actor_iri)
        .ok_or_else(|| AppError::MalformedObject(format!("not an actor IRI: {}", actor_iri)))?;
    let scheme = actor_iri
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .unwrap_or("https");

    let lookup = format!(
        "{}://{}/.well-known/webfinger?resource={}",
        scheme,
        instance,
        urlencoding::encode(actor_iri)
    );
    let jrd: WebFingerResponse = fetcher.fetch_json(&lookup).await?;

    let name = jrd
        .subject
        .strip_prefix("acct:")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AppError::MalformedObject(format!("subject is not an acct URI: {}", jrd.subject))
        })?;

    Ok(if name.contains('@') {
        name.to_string()
    } else {
        format!("{}@{}", name, instance)
    })
}
