//! Star service
//!
//! Starring a repository that lives on another instance also tells that
//! instance, with a `Like` (or `Undo` of one) sent to the repository inbox.

use std::sync::Arc;

use super::log_delivery;
use crate::data::{Database, Repository, User};
use crate::error::AppError;
use crate::federation::{ActivityDelivery, builder};

pub struct StarService {
    db: Arc<Database>,
    delivery: ActivityDelivery,
    base_url: String,
}

impl StarService {
    pub fn new(db: Arc<Database>, delivery: ActivityDelivery, base_url: String) -> Self {
        Self {
            db,
            delivery,
            base_url,
        }
    }

    /// Star (`star = true`) or unstar a repository.
    ///
    /// Returns whether the local star state changed. Only a change is
    /// announced to a remote repository.
    pub async fn star(&self, user: &User, repo: &Repository, star: bool) -> Result<bool, AppError> {
        let changed = self.db.star_repo(&user.id, &repo.id, star).await?;
        if !changed || !repo.is_remote() {
            return Ok(changed);
        }

        let actor = user.iri(&self.base_url);
        let repo_iri = repo.iri(&self.base_url);
        let activity = if star {
            builder::star(&actor, &repo_iri)
        } else {
            builder::unstar(&actor, &repo_iri)
        };
        log_delivery("star", self.delivery.send(user, &activity).await);

        Ok(changed)
    }
}
