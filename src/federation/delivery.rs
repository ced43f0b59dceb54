//! Activity delivery
//!
//! Builds outbound activities and delivers them, signed, to remote inboxes.

use std::sync::Arc;

use super::object::{Activity, with_context};
use super::signature::{main_key_id, sign_request};
use super::transport::Transport;
use super::fetch::ACTIVITY_STREAMS_CONTENT_TYPE;
use crate::data::{Database, SETTING_PRIVATE_PEM, User};
use crate::error::AppError;
use crate::metrics::{ACTIVITYPUB_ACTIVITIES_SENT, DELIVERY_FAILURES_TOTAL};

/// Result of one inbox delivery
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub inbox_uri: String,
    pub success: bool,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

/// Deduplicate identical inbox URIs while keeping distinct personal inboxes.
fn unique_inbox_targets(inbox_uris: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;

    let mut seen = HashSet::new();
    inbox_uris
        .into_iter()
        .filter(|inbox_uri| seen.insert(inbox_uri.clone()))
        .collect()
}

/// Activity delivery service
///
/// Delivery is sequential and best-effort: a failing recipient is logged
/// and the remaining recipients are still attempted.
#[derive(Clone)]
pub struct ActivityDelivery {
    db: Arc<Database>,
    transport: Arc<dyn Transport>,
    base_url: String,
    algorithm: String,
    max_size: usize,
}

impl ActivityDelivery {
    pub fn new(
        db: Arc<Database>,
        transport: Arc<dyn Transport>,
        base_url: String,
        algorithm: String,
        max_size: usize,
    ) -> Self {
        Self {
            db,
            transport,
            base_url,
            algorithm,
            max_size,
        }
    }

    /// Inboxes behind `to`; the sender's followers collection expands to
    /// the inboxes of its federated followers.
    async fn resolve_targets(&self, sender: &User, to: &[String]) -> Result<Vec<String>, AppError> {
        let followers_collection = format!("{}/followers", sender.iri(&self.base_url));
        let mut targets = Vec::with_capacity(to.len());

        for address in to {
            if *address == followers_collection {
                for follower in self.db.get_followers(&sender.id).await? {
                    if let (true, Some(iri)) = (follower.is_federated(), follower.login_name) {
                        targets.push(format!("{}/inbox", iri));
                    }
                }
            } else {
                targets.push(address.clone());
            }
        }

        Ok(unique_inbox_targets(targets))
    }

    async fn signing_key(&self, sender: &User) -> Result<String, AppError> {
        use rsa::pkcs8::DecodePrivateKey;

        let private_key_pem = self
            .db
            .get_user_setting(&sender.id, SETTING_PRIVATE_PEM)
            .await?
            .filter(|pem| !pem.is_empty())
            .ok_or_else(|| AppError::MissingSigningKey(sender.name.clone()))?;

        rsa::RsaPrivateKey::from_pkcs8_pem(&private_key_pem)
            .map_err(|e| AppError::MissingSigningKey(format!("{}: {}", sender.name, e)))?;
        Ok(private_key_pem)
    }

    /// Deliver `activity` on behalf of `sender` to every address in `to`.
    ///
    /// # Errors
    /// Only when the request cannot be built (missing or unreadable signing
    /// key, serialization). Per-recipient failures are reported in the
    /// returned results.
    pub async fn send(&self, sender: &User, activity: &Activity) -> Result<Vec<DeliveryResult>, AppError> {
        let private_key_pem = self.signing_key(sender).await?;
        let key_id = main_key_id(&sender.iri(&self.base_url));
        let body = serde_json::to_vec(&with_context(activity).map_err(|e| AppError::Internal(e.into()))?)
            .map_err(|e| AppError::Internal(e.into()))?;

        let kind = activity.kind.as_str();
        let targets = self.resolve_targets(sender, &activity.to).await?;
        tracing::info!(kind, sender = %sender.name, recipients = targets.len(), "Delivering activity");

        let mut results = Vec::with_capacity(targets.len());
        for inbox_uri in targets {
            let result = self
                .deliver_to_inbox(&inbox_uri, &body, &private_key_pem, &key_id)
                .await;
            let delivered = match result {
                Ok(status) if (200..300).contains(&status) => DeliveryResult {
                    inbox_uri,
                    success: true,
                    error: None,
                    status_code: Some(status),
                },
                Ok(status) => DeliveryResult {
                    error: Some(format!("inbox {} answered HTTP {}", inbox_uri, status)),
                    inbox_uri,
                    success: false,
                    status_code: Some(status),
                },
                Err(e) => DeliveryResult {
                    inbox_uri,
                    success: false,
                    error: Some(e.to_string()),
                    status_code: None,
                },
            };

            if delivered.success {
                ACTIVITYPUB_ACTIVITIES_SENT.with_label_values(&[kind]).inc();
            } else {
                DELIVERY_FAILURES_TOTAL.with_label_values(&[kind]).inc();
                tracing::warn!(
                    kind,
                    inbox = %delivered.inbox_uri,
                    error = ?delivered.error,
                    "Delivery failed"
                );
            }
            results.push(delivered);
        }

        Ok(results)
    }

    /// Sign and POST one payload; returns the response status.
    async fn deliver_to_inbox(
        &self,
        inbox_uri: &str,
        body: &[u8],
        private_key_pem: &str,
        key_id: &str,
    ) -> Result<u16, AppError> {
        let sig_headers = sign_request(
            "POST",
            inbox_uri,
            Some(body),
            private_key_pem,
            key_id,
            &self.algorithm,
        )?;

        let mut headers = vec![
            ("Content-Type".to_string(), ACTIVITY_STREAMS_CONTENT_TYPE.to_string()),
            ("Date".to_string(), sig_headers.date),
            ("Signature".to_string(), sig_headers.signature),
        ];
        if let Some(digest) = sig_headers.digest {
            headers.push(("Digest".to_string(), digest));
        }

        let response = self
            .transport
            .post(inbox_uri, headers, body.to_vec(), self.max_size)
            .await?;
        tracing::trace!(
            inbox = %inbox_uri,
            status = response.status,
            body = %String::from_utf8_lossy(&response.body),
            "Inbox response"
        );
        Ok(response.status)
    }
}

/// Pure constructors for the outbound activity shapes.
pub mod builder {
    use crate::federation::object::{
        Activity, ActivityKind, Note, Object, ObjectOrLink, Person, Repository,
    };

    fn inbox(iri: &str) -> String {
        format!("{}/inbox", iri)
    }

    /// `actor` follows the Person at `target`.
    pub fn follow(actor: &str, target: &str) -> Activity {
        let object = Object::Person(Person {
            id: target.to_string(),
            ..Person::default()
        });
        Activity::new(ActivityKind::Follow, actor, object.into(), vec![inbox(target)])
    }

    pub fn unfollow(actor: &str, target: &str) -> Activity {
        let follow = follow(actor, target);
        let to = follow.to.clone();
        Activity::new(ActivityKind::Undo, actor, Object::Activity(follow).into(), to)
    }

    /// `actor` stars the repository at `repo`.
    pub fn star(actor: &str, repo: &str) -> Activity {
        let object = Object::Repository(Repository {
            id: repo.to_string(),
            ..Repository::default()
        });
        Activity::new(ActivityKind::Like, actor, object.into(), vec![inbox(repo)])
    }

    pub fn unstar(actor: &str, repo: &str) -> Activity {
        let like = star(actor, repo);
        let to = like.to.clone();
        Activity::new(ActivityKind::Undo, actor, Object::Activity(like).into(), to)
    }

    pub fn create(actor: &str, to: Vec<String>, object: Object) -> Activity {
        Activity::new(ActivityKind::Create, actor, ObjectOrLink::from(object), to)
    }

    /// A comment on the ticket at `context`.
    pub fn note(id: &str, author: &str, context: &str, content: &str, to: Vec<String>) -> Object {
        Object::Note(Note {
            id: id.to_string(),
            attributed_to: Some(author.to_string()),
            content: Some(content.to_string()),
            context: Some(context.to_string()),
            in_reply_to: None,
            to,
        })
    }
}
