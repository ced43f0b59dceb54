//! Comment service
//!
//! Comments on tickets of a remote repository are announced to that
//! repository as `Create{Note}`.

use std::sync::Arc;

use super::log_delivery;
use crate::data::{Comment, Database, Issue, User};
use crate::error::AppError;
use crate::federation::{ActivityDelivery, IriCodec, builder};

pub struct CommentService {
    db: Arc<Database>,
    delivery: ActivityDelivery,
    codec: IriCodec,
}

impl CommentService {
    pub fn new(db: Arc<Database>, delivery: ActivityDelivery, codec: IriCodec) -> Self {
        Self {
            db,
            delivery,
            codec,
        }
    }

    pub async fn create_comment(&self, user: &User, issue: &Issue, content: &str) -> Result<Comment, AppError> {
        let repo = self
            .db
            .get_repository_by_id(&issue.repo_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let (comment, _) = self
            .db
            .insert_comment_if_absent(&Comment::new(&issue.id, &user.id, content))
            .await?;
        if !repo.is_remote() {
            return Ok(comment);
        }

        let base_url = self.codec.base_url();
        let actor = user.iri(base_url);
        let note_id = self
            .codec
            .note(&repo.owner_name, &repo.name, issue.idx, &comment.id);
        let context = issue
            .original_author
            .clone()
            .unwrap_or_else(|| self.codec.ticket(&repo.owner_name, &repo.name, issue.idx));
        let to = vec![
            format!("{}/inbox", repo.iri(base_url)),
            format!("{}/followers", actor),
        ];

        let note = builder::note(&note_id, &actor, &context, content, to.clone());
        let activity = builder::create(&actor, to, note);
        log_delivery("comment", self.delivery.send(user, &activity).await);

        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NewRepository;
    use crate::federation::iri::strip_last_segment;
    use crate::service::testing::*;

    #[tokio::test]
    async fn comment_on_remote_ticket_reaches_repo_and_federated_followers() {
        let h = harness().await;
        let alice = local_user(&h, "alice").await;
        let bob = remote_user(&h, "bob").await;
        let carol = local_user(&h, "carol").await;
        h.db.follow_user(&bob.id, &alice.id).await.unwrap();
        h.db.follow_user(&carol.id, &alice.id).await.unwrap();

        let mut new_repo = NewRepository::new(&bob.id, "widgets");
        new_repo.original_url = Some("https://remote.example/repo/bob/widgets".to_string());
        let (repo, _) = h.db.insert_repository_if_absent(&new_repo).await.unwrap();
        let mut issue = Issue::new(&repo.id, 3, &bob.id);
        issue.original_author = Some("https://remote.example/ticket/bob/widgets/3".to_string());
        let (issue, _) = h.db.insert_issue_if_absent(&issue).await.unwrap();

        let service = CommentService::new(h.db.clone(), h.delivery.clone(), h.codec.clone());
        let comment = service.create_comment(&alice, &issue, "looks good").await.unwrap();

        assert_eq!(h.db.list_issue_comments(&issue.id).await.unwrap().len(), 1);

        let posts = h.transport.posts();
        let urls: Vec<&str> = posts.iter().map(|post| post.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://remote.example/repo/bob/widgets/inbox",
                "https://remote.example/actor/bob/inbox",
            ]
        );

        let create = posts[0].json();
        assert_eq!(create["type"], "Create");
        assert_eq!(create["object"]["type"], "Note");
        assert_eq!(create["object"]["content"], "looks good");
        assert_eq!(create["object"]["context"], "https://remote.example/ticket/bob/widgets/3");
        let note_id = create["object"]["id"].as_str().unwrap();
        assert_eq!(
            note_id,
            format!("{}/ticket/bob@remote.example/widgets/3/{}", BASE, comment.id)
        );
        let ticket = h.codec.decode_ticket(strip_last_segment(note_id)).unwrap();
        assert_eq!(ticket.owner, repo.owner_name);
        assert_eq!(ticket.repo, "widgets");
        assert_eq!(ticket.index, 3);
    }

    #[tokio::test]
    async fn comment_on_local_ticket_is_not_delivered() {
        let h = harness().await;
        let alice = local_user(&h, "alice").await;
        let (repo, _) = h
            .db
            .insert_repository_if_absent(&NewRepository::new(&alice.id, "widgets"))
            .await
            .unwrap();
        let (issue, _) = h
            .db
            .insert_issue_if_absent(&Issue::new(&repo.id, 1, &alice.id))
            .await
            .unwrap();

        let service = CommentService::new(h.db.clone(), h.delivery.clone(), h.codec.clone());
        service.create_comment(&alice, &issue, "note to self").await.unwrap();

        assert!(h.transport.posts().is_empty());
    }
}
