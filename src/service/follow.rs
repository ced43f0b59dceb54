//! Follow service

use std::sync::Arc;

use super::log_delivery;
use crate::data::{Database, User};
use crate::error::AppError;
use crate::federation::{ActivityDelivery, builder};

pub struct FollowService {
    db: Arc<Database>,
    delivery: ActivityDelivery,
    base_url: String,
}

impl FollowService {
    pub fn new(db: Arc<Database>, delivery: ActivityDelivery, base_url: String) -> Self {
        Self {
            db,
            delivery,
            base_url,
        }
    }

    /// Follow (`follow = true`) or unfollow `target`.
    ///
    /// A federated target is sent `Follow` or `Undo(Follow)` when the local
    /// relation actually changed.
    pub async fn follow(&self, user: &User, target: &User, follow: bool) -> Result<bool, AppError> {
        if user.id == target.id {
            return Err(AppError::Validation("cannot follow yourself".to_string()));
        }

        let changed = if follow {
            self.db.follow_user(&user.id, &target.id).await?
        } else {
            self.db.unfollow_user(&user.id, &target.id).await?
        };
        if !changed || !target.is_federated() {
            return Ok(changed);
        }

        let actor = user.iri(&self.base_url);
        let target_iri = target.iri(&self.base_url);
        let activity = if follow {
            builder::follow(&actor, &target_iri)
        } else {
            builder::unfollow(&actor, &target_iri)
        };
        log_delivery("follow", self.delivery.send(user, &activity).await);

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::*;

    #[tokio::test]
    async fn following_federated_user_delivers_follow() {
        let h = harness().await;
        let alice = local_user(&h, "alice").await;
        let bob = remote_user(&h, "bob").await;
        let service = FollowService::new(h.db.clone(), h.delivery.clone(), BASE.to_string());

        assert!(service.follow(&alice, &bob, true).await.unwrap());
        assert!(h.db.is_following(&alice.id, &bob.id).await.unwrap());

        let posts = h.transport.posts_to("https://remote.example/actor/bob/inbox");
        assert_eq!(posts.len(), 1);
        let follow = posts[0].json();
        assert_eq!(follow["type"], "Follow");
        assert_eq!(follow["object"]["id"], "https://remote.example/actor/bob");
        assert_eq!(follow["@context"][0], "https://www.w3.org/ns/activitystreams");

        assert!(service.follow(&alice, &bob, false).await.unwrap());
        let posts = h.transport.posts_to("https://remote.example/actor/bob/inbox");
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].json()["type"], "Undo");
    }

    #[tokio::test]
    async fn following_local_user_stays_local() {
        let h = harness().await;
        let alice = local_user(&h, "alice").await;
        let carol = local_user(&h, "carol").await;
        let service = FollowService::new(h.db.clone(), h.delivery.clone(), BASE.to_string());

        assert!(service.follow(&alice, &carol, true).await.unwrap());
        assert!(!service.follow(&alice, &carol, true).await.unwrap());
        assert!(h.transport.posts().is_empty());
    }

    #[tokio::test]
    async fn cannot_follow_self() {
        let h = harness().await;
        let alice = local_user(&h, "alice").await;
        let service = FollowService::new(h.db.clone(), h.delivery.clone(), BASE.to_string());

        let err = service.follow(&alice, &alice, true).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
