//! Activity processing
//!
//! Dispatches verified inbound activities to their side effects. Each
//! activity runs to completion or failure inside the request that carried
//! it; nothing is queued.

use std::sync::Arc;

use super::iri::strip_last_segment;
use super::materialize::Materializer;
use super::object::{Activity, ActivityKind, Note, Object};
use crate::data::{Database, User};
use crate::error::AppError;
use crate::metrics::ACTIVITYPUB_ACTIVITIES_RECEIVED;

/// Activity processor
///
/// Handles the inbound activities accepted by actor and repository inboxes.
#[derive(Clone)]
pub struct ActivityProcessor {
    db: Arc<Database>,
    materializer: Materializer,
}

impl ActivityProcessor {
    pub fn new(db: Arc<Database>, materializer: Materializer) -> Self {
        Self { db, materializer }
    }

    /// Process an incoming activity whose keyId binding was already checked.
    ///
    /// | Activity | Object | Effect |
    /// |---|---|---|
    /// | Follow | Person | follow edge |
    /// | Undo | Follow / Like | remove edge / star |
    /// | Create | Repository / Ticket / Note | materialize |
    /// | Like | Repository | star |
    /// | Delete | the actor itself | delete the federated user |
    pub async fn process(&self, activity: &Activity) -> Result<(), AppError> {
        ACTIVITYPUB_ACTIVITIES_RECEIVED
            .with_label_values(&[activity.kind.as_str()])
            .inc();
        tracing::debug!(
            kind = activity.kind.as_str(),
            actor = ?activity.actor,
            object = ?activity.object_iri(),
            "Processing activity"
        );

        match activity.kind {
            ActivityKind::Follow => self.handle_follow(activity, true).await,
            ActivityKind::Like => self.handle_like(activity, true).await,
            ActivityKind::Undo => self.handle_undo(activity).await,
            ActivityKind::Create => self.handle_create(activity).await,
            ActivityKind::Delete => self.handle_delete(activity).await,
        }
    }

    async fn actor_user(&self, activity: &Activity) -> Result<User, AppError> {
        let actor = activity
            .actor
            .as_deref()
            .ok_or_else(|| AppError::MalformedObject("activity has no actor".to_string()))?;
        self.materializer
            .user_by_iri(actor)
            .await?
            .ok_or_else(|| AppError::UnknownUser(actor.to_string()))
    }

    fn object_iri<'a>(&self, activity: &'a Activity) -> Result<&'a str, AppError> {
        activity.object_iri().ok_or_else(|| {
            AppError::MalformedObject(format!("{} has no object", activity.kind.as_str()))
        })
    }

    // =========================================================================
    // Follow / Undo
    // =========================================================================

    async fn handle_follow(&self, activity: &Activity, follow: bool) -> Result<(), AppError> {
        let follower = self.actor_user(activity).await?;
        let target_iri = self.object_iri(activity)?;
        let target = self
            .materializer
            .user_by_iri(target_iri)
            .await?
            .ok_or_else(|| AppError::UnknownUser(target_iri.to_string()))?;

        let changed = if follow {
            self.db.follow_user(&follower.id, &target.id).await?
        } else {
            self.db.unfollow_user(&follower.id, &target.id).await?
        };
        tracing::info!(follower = %follower.name, target = %target.name, follow, changed, "Follow edge updated");
        Ok(())
    }

    async fn handle_undo(&self, activity: &Activity) -> Result<(), AppError> {
        match activity.embedded() {
            Some(Object::Activity(undone)) => match undone.kind {
                ActivityKind::Follow => self.handle_follow(undone, false).await,
                ActivityKind::Like => self.handle_like(undone, false).await,
                other => Err(AppError::UnsupportedType(format!("Undo({})", other.as_str()))),
            },
            Some(other) => Err(AppError::UnsupportedType(format!("Undo({})", other.kind()))),
            None => Err(AppError::MalformedObject(
                "Undo must embed the activity being undone".to_string(),
            )),
        }
    }

    // =========================================================================
    // Star
    // =========================================================================

    /// Star or unstar a repository already known here.
    ///
    /// Unknown repositories, names carrying `@` and private repositories are
    /// answered with success and no change, so peers cannot probe for
    /// private repositories. Storage errors still propagate.
    async fn handle_like(&self, activity: &Activity, star: bool) -> Result<(), AppError> {
        let user = self.actor_user(activity).await?;
        let repo_iri = self.object_iri(activity)?;

        let repo = match self.materializer.known_repository(repo_iri).await? {
            Some(repo) if !repo.name.contains('@') && !repo.is_private => repo,
            _ => {
                tracing::debug!(repo = %repo_iri, star, "Ignoring star of unknown or private repository");
                return Ok(());
            }
        };

        let changed = self.db.star_repo(&user.id, &repo.id, star).await?;
        tracing::info!(user = %user.name, repo = %repo.name, star, changed, "Star updated");
        Ok(())
    }

    // =========================================================================
    // Create
    // =========================================================================

    async fn handle_create(&self, activity: &Activity) -> Result<(), AppError> {
        match activity.embedded() {
            Some(Object::Repository(repo)) => {
                self.materializer.materialize_repository(repo).await?;
                Ok(())
            }
            Some(Object::Ticket(ticket)) => {
                self.materializer.materialize_ticket(ticket).await?;
                Ok(())
            }
            Some(Object::Note(note)) => {
                let note = with_reply_context(note);
                self.materializer.materialize_comment(&note).await?;
                Ok(())
            }
            Some(other) => Err(AppError::UnsupportedType(format!("Create({})", other.kind()))),
            None => Err(AppError::MalformedObject(
                "Create must embed the created object".to_string(),
            )),
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Self-delete only: an actor deleting anything but itself is ignored.
    async fn handle_delete(&self, activity: &Activity) -> Result<(), AppError> {
        let actor = activity.actor.as_deref();
        let object = activity.object_iri();
        if actor.is_none() || actor != object {
            tracing::debug!(actor = ?actor, object = ?object, "Ignoring Delete of another object");
            return Ok(());
        }

        let user = self.actor_user(activity).await?;
        if !user.is_federated() {
            return Err(AppError::Forbidden);
        }

        self.db.delete_user(&user.id).await?;
        tracing::info!(user = %user.name, "Federated user deleted");
        Ok(())
    }
}

/// Derive a reply's context from `inReplyTo`.
///
/// `…/ticket/o/r/3/c7` is a reply to a comment and its ticket is `…/ticket/o/r/3`.
/// When the stripped IRI is not a ticket the note replies to the ticket itself.
pub fn with_reply_context(note: &Note) -> Note {
    let mut note = note.clone();
    if let Some(in_reply_to) = note.in_reply_to.as_deref() {
        let stripped = strip_last_segment(in_reply_to);
        let is_ticket = stripped
            .rsplit('/')
            .next()
            .is_some_and(|tail| tail.parse::<i64>().is_ok());
        note.context = Some(if is_ticket { stripped } else { in_reply_to }.to_string());
    }
    note
}
