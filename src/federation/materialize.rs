//! Entity materializer
//!
//! Create-or-adopt local representations of remote actors, repositories,
//! tickets and notes. Every create goes through an insert-or-get primitive
//! of the data layer, so replays and concurrent deliveries of the same
//! object converge on one row.

use futures::future::BoxFuture;
use std::sync::Arc;

use super::fetch::ObjectFetcher;
use super::iri::IriCodec;
use super::object::{self, Object};
use super::webfinger;
use crate::data::{self, Comment, Database, Issue, LoginType, NewRepository, PullRequest, User};
use crate::error::AppError;
use crate::metrics::ENTITIES_MATERIALIZED_TOTAL;

/// Longest fork chain followed when materializing a repository
const MAX_FORK_DEPTH: usize = 8;

#[derive(Clone)]
pub struct Materializer {
    db: Arc<Database>,
    fetcher: ObjectFetcher,
    codec: IriCodec,
    no_reply_domain: String,
}

/// `#12` → 12
fn parse_ticket_index(name: Option<&str>) -> Result<i64, AppError> {
    let name = name.unwrap_or_default();
    name.strip_prefix('#')
        .unwrap_or(name)
        .parse::<i64>()
        .ok()
        .filter(|index| *index > 0)
        .ok_or_else(|| AppError::MalformedObject(format!("invalid ticket name: {:?}", name)))
}

fn required<'a>(value: Option<&'a str>, what: &str, id: &str) -> Result<&'a str, AppError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::MalformedObject(format!("{} is missing {}", id, what)))
}

impl Materializer {
    pub fn new(db: Arc<Database>, fetcher: ObjectFetcher, codec: IriCodec, no_reply_domain: String) -> Self {
        Self {
            db,
            fetcher,
            codec,
            no_reply_domain,
        }
    }

    pub fn codec(&self) -> &IriCodec {
        &self.codec
    }

    /// Resolve an actor IRI to a user; local IRIs are looked up by name.
    pub async fn user_by_iri(&self, iri: &str) -> Result<Option<User>, AppError> {
        if self.codec.is_local(iri) {
            let (_, name) = self.codec.decode_person(iri)?;
            return Ok(self
                .db
                .get_user_by_name(name)
                .await?
                .filter(|user| !user.is_federated()));
        }
        self.db.get_user_by_iri(iri).await
    }

    // =========================================================================
    // Actors
    // =========================================================================

    /// Mirror a remote Person as a federated user.
    ///
    /// Returns the stored user, or `None` for a local IRI without a user.
    /// A failed avatar fetch is logged and does not undo the user.
    pub async fn materialize_actor(&self, person: &object::Person) -> Result<Option<User>, AppError> {
        if let Some(existing) = self.user_by_iri(&person.id).await? {
            return Ok(Some(existing));
        }

        let (instance, _) = self.codec.decode_person(&person.id)?;
        if instance.eq_ignore_ascii_case(self.codec.domain()) {
            return Ok(None);
        }

        let public_key_pem = person
            .public_key
            .as_ref()
            .map(|key| key.public_key_pem.as_str())
            .filter(|pem| !pem.is_empty())
            .ok_or_else(|| AppError::MissingPublicKey(person.id.clone()))?;

        let name = webfinger::resolve_actor_name(&self.fetcher, &person.id).await?;
        let email = match person.location.as_deref() {
            Some(location) if !location.is_empty() => location.to_string(),
            _ => format!("{}@{}", name.replace('@', "+"), self.no_reply_domain),
        };

        let mut user = User::new_local(&name, &email);
        user.login_type = LoginType::Federated;
        user.login_name = Some(person.id.clone());
        user.full_name = person.name.clone().unwrap_or_default();

        let avatar = match person.icon.as_ref().and_then(|icon| icon.url.as_deref()) {
            Some(icon_url) => match self.fetcher.fetch_media(icon_url).await {
                Ok(avatar) => Some(avatar),
                Err(e) => {
                    tracing::warn!(actor = %person.id, icon = %icon_url, error = %e, "Avatar fetch failed");
                    None
                }
            },
            None => None,
        };

        let (user, created) = self
            .db
            .insert_federated_user_if_absent(&user, public_key_pem, avatar.as_deref())
            .await?;
        if !created {
            return Ok(Some(user));
        }

        ENTITIES_MATERIALIZED_TOTAL.with_label_values(&["actor"]).inc();
        tracing::info!(actor = %person.id, name = %user.name, "Federated actor created");
        Ok(Some(user))
    }

    /// Fetch a Person document and mirror it.
    async fn actor_from_iri(&self, iri: &str) -> Result<User, AppError> {
        match self.fetcher.fetch_object(iri).await? {
            Object::Person(person) => self
                .materialize_actor(&person)
                .await?
                .ok_or_else(|| AppError::UnknownUser(iri.to_string())),
            other => Err(AppError::UnsupportedType(other.kind().to_string())),
        }
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    /// Create a repository announced by its owner.
    ///
    /// # Errors
    /// `UnknownOwner` if the attributed actor has no local user yet.
    pub async fn materialize_repository(
        &self,
        repo: &object::Repository,
    ) -> Result<data::Repository, AppError> {
        self.repository_at(repo, 0).await
    }

    fn repository_at<'a>(
        &'a self,
        repo: &'a object::Repository,
        depth: usize,
    ) -> BoxFuture<'a, Result<data::Repository, AppError>> {
        Box::pin(async move {
            let owner_iri = required(repo.attributed_to.as_deref(), "attributedTo", &repo.id)?;
            let name = required(repo.name.as_deref(), "name", &repo.id)?;

            let owner = self
                .user_by_iri(owner_iri)
                .await?
                .ok_or_else(|| AppError::UnknownOwner(owner_iri.to_string()))?;

            if let Some(existing) = self
                .db
                .get_repository_by_owner_and_name(&owner.name, name)
                .await?
            {
                return Ok(existing);
            }

            let fork_id = match repo.forked_from.as_deref() {
                Some(origin) => Some(self.repository_from_iri_at(origin, depth + 1).await?.id),
                None => None,
            };

            let mut new_repo = NewRepository::new(&owner.id, name);
            new_repo.description = repo.summary.clone().unwrap_or_default();
            new_repo.fork_id = fork_id;
            if !self.codec.is_local(&repo.id) {
                new_repo.original_url = Some(repo.id.clone());
            }

            let (stored, created) = self.db.insert_repository_if_absent(&new_repo).await?;
            if created {
                ENTITIES_MATERIALIZED_TOTAL
                    .with_label_values(&["repository"])
                    .inc();
                tracing::info!(repo = %repo.id, owner = %owner.name, "Federated repository created");
            }
            Ok(stored)
        })
    }

    /// Resolve a repository IRI against local rows only; nothing is fetched.
    pub async fn known_repository(&self, iri: &str) -> Result<Option<data::Repository>, AppError> {
        let decoded = self.codec.decode_repository(iri)?;
        self.db
            .get_repository_by_owner_and_name(&decoded.owner, &decoded.repo)
            .await
    }

    /// Resolve a repository IRI, fetching and mirroring it (and its owner)
    /// when it is not known locally.
    pub async fn repository_from_iri(&self, iri: &str) -> Result<data::Repository, AppError> {
        self.repository_from_iri_at(iri, 0).await
    }

    fn repository_from_iri_at<'a>(
        &'a self,
        iri: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<data::Repository, AppError>> {
        Box::pin(async move {
            if let Some(existing) = self.known_repository(iri).await? {
                return Ok(existing);
            }

            if self.codec.is_local(iri) {
                return Err(AppError::UnknownRepository(iri.to_string()));
            }
            if depth > MAX_FORK_DEPTH {
                return Err(AppError::MalformedObject(format!(
                    "fork chain deeper than {} at {}",
                    MAX_FORK_DEPTH, iri
                )));
            }

            let repo = match self.fetcher.fetch_object(iri).await? {
                Object::Repository(repo) => repo,
                other => return Err(AppError::UnsupportedType(other.kind().to_string())),
            };

            match self.repository_at(&repo, depth).await {
                Err(AppError::UnknownOwner(owner_iri)) => {
                    self.actor_from_iri(&owner_iri).await?;
                    self.repository_at(&repo, depth).await
                }
                result => result,
            }
        })
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    /// Create an issue, or a pull request when both `origin` and `target` are set.
    ///
    /// The owning repository named by `context` is materialized first. The
    /// local index is the remote one; if it is taken by another ticket the
    /// call fails with `IndexTaken`.
    pub async fn materialize_ticket(&self, ticket: &object::Ticket) -> Result<Issue, AppError> {
        let context = required(ticket.context.as_deref(), "context", &ticket.id)?;
        let repo = self.repository_from_iri(context).await?;

        let poster_iri = required(ticket.attributed_to.as_deref(), "attributedTo", &ticket.id)?;
        let poster = self
            .user_by_iri(poster_iri)
            .await?
            .ok_or_else(|| AppError::UnknownUser(poster_iri.to_string()))?;

        let index = parse_ticket_index(ticket.name.as_deref())?;

        let mut issue = Issue::new(&repo.id, index, &poster.id);
        issue.title = ticket.summary.clone().unwrap_or_default();
        issue.content = ticket.content.clone().unwrap_or_default();
        issue.is_closed = ticket.is_resolved;
        issue.original_author = Some(ticket.id.clone());

        let (stored, created) = match (ticket.origin.as_deref(), ticket.target.as_deref()) {
            (Some(origin), Some(target)) => self.pull_request(issue.clone(), origin, target).await?,
            _ => self.db.insert_issue_if_absent(&issue).await?,
        };

        if !created && stored.original_author != issue.original_author {
            return Err(AppError::IndexTaken {
                repo_id: stored.repo_id,
                index,
            });
        }
        if created {
            let kind = if stored.is_pull { "pull_request" } else { "issue" };
            ENTITIES_MATERIALIZED_TOTAL.with_label_values(&[kind]).inc();
            tracing::info!(ticket = %ticket.id, index, kind, "Federated ticket created");
        }
        Ok(stored)
    }

    async fn pull_request(
        &self,
        mut issue: Issue,
        origin: &str,
        target: &str,
    ) -> Result<(Issue, bool), AppError> {
        let head = self.codec.decode_branch(origin)?;
        let base = self.codec.decode_branch(target)?;

        let head_repo = self
            .db
            .get_repository_by_owner_and_name(&head.owner, &head.repo)
            .await?
            .ok_or_else(|| AppError::UnknownRepository(origin.to_string()))?;
        let base_repo = self
            .db
            .get_repository_by_owner_and_name(&base.owner, &base.repo)
            .await?
            .ok_or_else(|| AppError::UnknownRepository(target.to_string()))?;

        issue.repo_id = base_repo.id.clone();
        issue.is_pull = true;
        let pull = PullRequest {
            id: data::EntityId::new().0,
            issue_id: issue.id.clone(),
            head_repo_id: head_repo.id,
            base_repo_id: base_repo.id,
            head_branch: head.branch,
            base_branch: base.branch,
            merge_base: String::new(),
        };

        self.db.insert_pull_request_if_absent(&issue, &pull).await
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Create a comment on an existing ticket.
    ///
    /// Tickets are never materialized from a note; an unknown ticket fails
    /// with `UnknownTicket`.
    pub async fn materialize_comment(&self, note: &object::Note) -> Result<Comment, AppError> {
        let poster_iri = required(note.attributed_to.as_deref(), "attributedTo", &note.id)?;
        let poster = self
            .user_by_iri(poster_iri)
            .await?
            .ok_or_else(|| AppError::UnknownUser(poster_iri.to_string()))?;

        let context = required(note.context.as_deref(), "context", &note.id)?;
        let ticket = self.codec.decode_ticket(context)?;

        let repo = self
            .db
            .get_repository_by_owner_and_name(&ticket.owner, &ticket.repo)
            .await?
            .ok_or_else(|| AppError::UnknownRepository(context.to_string()))?;
        let issue = self
            .db
            .get_issue_by_index(&repo.id, ticket.index)
            .await?
            .ok_or_else(|| AppError::UnknownTicket {
                owner: ticket.owner.clone(),
                repo: ticket.repo.clone(),
                index: ticket.index,
            })?;

        let mut comment = Comment::new(&issue.id, &poster.id, note.content.as_deref().unwrap_or_default());
        comment.note_iri = Some(note.id.clone());

        let (stored, created) = self.db.insert_comment_if_absent(&comment).await?;
        if created {
            ENTITIES_MATERIALIZED_TOTAL.with_label_values(&["comment"]).inc();
            tracing::debug!(note = %note.id, issue = %issue.id, "Federated comment created");
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SETTING_PRIVATE_PEM, SETTING_PUBLIC_PEM};
    use crate::federation::object::{Image, Person, PublicKey, Repository, Ticket};
    use crate::federation::MemoryTransport;
    use serde_json::json;
    use tempfile::TempDir;

    const REMOTE: &str = "https://remote.example";

    struct Harness {
        materializer: Materializer,
        transport: MemoryTransport,
        db: Arc<Database>,
        _temp_dir: TempDir,
    }

    async fn harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&temp_dir.path().join("m.db")).await.unwrap());
        let transport = MemoryTransport::new();
        let fetcher = ObjectFetcher::new(Arc::new(transport.clone()), 64 * 1024);
        let materializer = Materializer::new(
            db.clone(),
            fetcher,
            IriCodec::new("local.example", "https://local.example"),
            "noreply.local.example".to_string(),
        );
        Harness {
            materializer,
            transport,
            db,
            _temp_dir: temp_dir,
        }
    }

    fn person(name: &str) -> Person {
        let id = format!("{}/actor/{}", REMOTE, name);
        Person {
            public_key: Some(PublicKey {
                id: format!("{}#main-key", id),
                owner: Some(id.clone()),
                public_key_pem: "-----BEGIN PUBLIC KEY-----\n...".to_string(),
            }),
            name: Some(name.to_uppercase()),
            id,
            ..Person::default()
        }
    }

    fn serve_webfinger(transport: &MemoryTransport, name: &str) {
        let actor = format!("{}/actor/{}", REMOTE, name);
        transport.insert_json(
            &format!(
                "{}/.well-known/webfinger?resource={}",
                REMOTE,
                urlencoding::encode(&actor)
            ),
            &json!({"subject": format!("acct:{}@remote.example", name)}),
        );
    }

    fn remote_repo(owner: &str, name: &str) -> Repository {
        Repository {
            id: format!("{}/repo/{}/{}", REMOTE, owner, name),
            name: Some(name.to_string()),
            attributed_to: Some(format!("{}/actor/{}", REMOTE, owner)),
            ..Repository::default()
        }
    }

    #[tokio::test]
    async fn actor_is_created_once_with_key_and_placeholder_email() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");

        let bob = h.materializer.materialize_actor(&person("bob")).await.unwrap().unwrap();
        assert_eq!(bob.name, "bob@remote.example");
        assert_eq!(bob.email, "bob+remote.example@noreply.local.example");
        assert_eq!(bob.full_name, "BOB");
        assert!(bob.is_federated());
        assert_eq!(
            h.db.get_user_setting(&bob.id, SETTING_PRIVATE_PEM).await.unwrap().as_deref(),
            Some("")
        );

        let again = h.materializer.materialize_actor(&person("bob")).await.unwrap().unwrap();
        assert_eq!(again.id, bob.id);
    }

    #[tokio::test]
    async fn actor_without_public_key_is_rejected_before_insert() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        let mut keyless = person("bob");
        keyless.public_key = None;

        assert!(matches!(
            h.materializer.materialize_actor(&keyless).await,
            Err(AppError::MissingPublicKey(_))
        ));
        assert!(h.db.get_user_by_iri(&keyless.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_actor_iri_is_not_mirrored() {
        let h = harness().await;
        let mut local = person("alice");
        local.id = "https://local.example/actor/alice".to_string();

        assert!(h.materializer.materialize_actor(&local).await.unwrap().is_none());
        assert!(h.db.get_user_by_name("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_avatar_fetch_keeps_the_actor() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        let mut bob = person("bob");
        bob.icon = Some(Image::png(format!("{}/avatar/bob", REMOTE)));
        h.transport.fail(&format!("{}/avatar/bob", REMOTE));

        let user = h.materializer.materialize_actor(&bob).await.unwrap().unwrap();
        assert!(h.db.get_user_avatar(&user.id).await.unwrap().is_none());
        assert!(
            h.db.get_user_setting(&user.id, SETTING_PUBLIC_PEM)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn concurrent_actor_materialization_stores_one_user() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        let bob = person("bob");

        let (first, second) = tokio::join!(
            h.materializer.materialize_actor(&bob),
            h.materializer.materialize_actor(&bob)
        );
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(h.db.get_user_by_iri(&bob.id).await.unwrap().unwrap().id, first.id);
        assert!(
            h.db.get_user_setting(&first.id, SETTING_PUBLIC_PEM)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn concurrent_repository_and_ticket_materialization_converge() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        let bob = person("bob");
        h.transport
            .insert_json(&bob.id, &serde_json::to_value(Object::Person(bob.clone())).unwrap());
        let repo = remote_repo("bob", "widgets");
        h.transport
            .insert_json(&repo.id, &serde_json::to_value(Object::Repository(repo.clone())).unwrap());

        let (first, second) = tokio::join!(
            h.materializer.repository_from_iri(&repo.id),
            h.materializer.repository_from_iri(&repo.id)
        );
        let stored = first.unwrap();
        assert_eq!(stored.id, second.unwrap().id);

        let ticket = Ticket {
            id: format!("{}/ticket/bob/widgets/5", REMOTE),
            name: Some("#5".to_string()),
            attributed_to: Some(bob.id.clone()),
            context: Some(repo.id.clone()),
            ..Ticket::default()
        };
        let (first, second) = tokio::join!(
            h.materializer.materialize_ticket(&ticket),
            h.materializer.materialize_ticket(&ticket)
        );
        assert_eq!(first.unwrap().id, second.unwrap().id);
        assert_eq!(h.db.count_issues(&stored.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn known_repository_never_fetches() {
        let h = harness().await;
        let repo = remote_repo("bob", "widgets");
        h.transport
            .insert_json(&repo.id, &serde_json::to_value(Object::Repository(repo.clone())).unwrap());

        assert!(h.materializer.known_repository(&repo.id).await.unwrap().is_none());
        assert!(
            h.db.get_repository_by_owner_and_name("bob@remote.example", "widgets")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn repository_requires_known_owner_and_is_idempotent() {
        let h = harness().await;
        let repo = remote_repo("bob", "widgets");
        assert!(matches!(
            h.materializer.materialize_repository(&repo).await,
            Err(AppError::UnknownOwner(_))
        ));

        serve_webfinger(&h.transport, "bob");
        h.materializer.materialize_actor(&person("bob")).await.unwrap();

        let first = h.materializer.materialize_repository(&repo).await.unwrap();
        let second = h.materializer.materialize_repository(&repo).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.owner_name, "bob@remote.example");
        assert_eq!(first.original_url.as_deref(), Some(repo.id.as_str()));
    }

    #[tokio::test]
    async fn fork_origin_and_its_owner_are_fetched() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        serve_webfinger(&h.transport, "carol");
        h.materializer.materialize_actor(&person("bob")).await.unwrap();

        let carol = person("carol");
        h.transport
            .insert_json(&carol.id, &serde_json::to_value(Object::Person(carol.clone())).unwrap());
        let upstream = remote_repo("carol", "widgets");
        h.transport.insert_json(
            &upstream.id,
            &serde_json::to_value(Object::Repository(upstream.clone())).unwrap(),
        );

        let mut fork = remote_repo("bob", "widgets");
        fork.forked_from = Some(upstream.id.clone());
        let stored = h.materializer.materialize_repository(&fork).await.unwrap();

        let origin = h
            .db
            .get_repository_by_owner_and_name("carol@remote.example", "widgets")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_fork);
        assert_eq!(stored.fork_id.as_deref(), Some(origin.id.as_str()));
    }

    #[tokio::test]
    async fn issue_index_comes_from_name_and_collisions_are_reported() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        h.materializer.materialize_actor(&person("bob")).await.unwrap();
        h.materializer
            .materialize_repository(&remote_repo("bob", "widgets"))
            .await
            .unwrap();

        let ticket = Ticket {
            id: format!("{}/ticket/bob/widgets/3", REMOTE),
            name: Some("#3".to_string()),
            attributed_to: Some(format!("{}/actor/bob", REMOTE)),
            summary: Some("Crash".to_string()),
            context: Some(format!("{}/repo/bob/widgets", REMOTE)),
            is_resolved: true,
            ..Ticket::default()
        };
        let issue = h.materializer.materialize_ticket(&ticket).await.unwrap();
        assert_eq!(issue.idx, 3);
        assert!(issue.is_closed);
        assert_eq!(issue.title, "Crash");

        let replay = h.materializer.materialize_ticket(&ticket).await.unwrap();
        assert_eq!(replay.id, issue.id);

        let mut other = ticket.clone();
        other.id = format!("{}/ticket/bob/widgets/other", REMOTE);
        assert!(matches!(
            h.materializer.materialize_ticket(&other).await,
            Err(AppError::IndexTaken { index: 3, .. })
        ));

        let mut unnamed = ticket.clone();
        unnamed.name = Some("three".to_string());
        assert!(matches!(
            h.materializer.materialize_ticket(&unnamed).await,
            Err(AppError::MalformedObject(_))
        ));
    }

    #[tokio::test]
    async fn pull_request_with_unknown_origin_creates_nothing() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        h.materializer.materialize_actor(&person("bob")).await.unwrap();
        let base = h
            .materializer
            .materialize_repository(&remote_repo("bob", "widgets"))
            .await
            .unwrap();

        let ticket = Ticket {
            id: format!("{}/ticket/bob/widgets/9", REMOTE),
            name: Some("#9".to_string()),
            attributed_to: Some(format!("{}/actor/bob", REMOTE)),
            context: Some(format!("{}/repo/bob/widgets", REMOTE)),
            origin: Some(format!("{}/branch/bob/missing/feature", REMOTE)),
            target: Some(format!("{}/branch/bob/widgets/main", REMOTE)),
            ..Ticket::default()
        };
        assert!(matches!(
            h.materializer.materialize_ticket(&ticket).await,
            Err(AppError::UnknownRepository(_))
        ));
        assert_eq!(h.db.count_issues(&base.id).await.unwrap(), 0);
        assert_eq!(h.db.count_pull_requests().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn comment_requires_existing_ticket() {
        let h = harness().await;
        serve_webfinger(&h.transport, "bob");
        h.materializer.materialize_actor(&person("bob")).await.unwrap();
        h.materializer
            .materialize_repository(&remote_repo("bob", "widgets"))
            .await
            .unwrap();

        let note = object::Note {
            id: format!("{}/ticket/bob/widgets/4/c1", REMOTE),
            attributed_to: Some(format!("{}/actor/bob", REMOTE)),
            content: Some("hello".to_string()),
            context: Some(format!("{}/ticket/bob/widgets/4", REMOTE)),
            ..object::Note::default()
        };
        assert!(matches!(
            h.materializer.materialize_comment(&note).await,
            Err(AppError::UnknownTicket { index: 4, .. })
        ));
    }
}
