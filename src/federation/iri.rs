//! IRI codec
//!
//! Splits canonical entity IRIs into the natural keys used locally and
//! formats local entities back into IRIs.
//!
//! IRIs are split on `/`, so `https://host/ticket/alice/widgets/3` yields
//! `["https:", "", "host", "ticket", "alice", "widgets", "3"]`. The instance
//! is segment 2 and the owner/repo/tail are the last three segments. Owners on
//! another instance are returned as `user@instance`, which is how remote
//! users are named locally.

use crate::error::AppError;

/// Decoded ticket IRI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRef {
    pub owner: String,
    pub repo: String,
    pub index: i64,
}

/// Decoded branch IRI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Decoded repository IRI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub repo: String,
}

/// Encoder/decoder bound to the local instance.
#[derive(Debug, Clone)]
pub struct IriCodec {
    domain: String,
    base_url: String,
}

impl IriCodec {
    pub fn new(domain: &str, base_url: &str) -> Self {
        Self {
            domain: domain.to_ascii_lowercase(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authority segment (`host[:port]`) of an IRI.
    pub fn instance(iri: &str) -> Option<&str> {
        iri.split('/').nth(2).filter(|instance| !instance.is_empty())
    }

    /// Whether the IRI names an entity on this instance.
    pub fn is_local(&self, iri: &str) -> bool {
        Self::instance(iri)
            .map(|instance| instance.eq_ignore_ascii_case(&self.domain))
            .unwrap_or(false)
    }

    fn qualify(&self, instance: &str, owner: &str) -> String {
        if instance.eq_ignore_ascii_case(&self.domain) {
            owner.to_string()
        } else {
            format!("{}@{}", owner, instance)
        }
    }

    /// Split into `(instance, owner, repo, tail)`.
    fn split_tail<'a>(&self, iri: &'a str, what: &str) -> Result<(&'a str, &'a str, &'a str, &'a str), AppError> {
        let segments: Vec<&str> = iri.split('/').collect();
        if segments.len() < 5 {
            return Err(AppError::MalformedObject(format!(
                "not a {} object IRI: {}",
                what, iri
            )));
        }

        let n = segments.len();
        let (instance, owner, repo, tail) =
            (segments[2], segments[n - 3], segments[n - 2], segments[n - 1]);
        if instance.is_empty() || owner.is_empty() || repo.is_empty() || tail.is_empty() {
            return Err(AppError::MalformedObject(format!(
                "not a {} object IRI: {}",
                what, iri
            )));
        }

        Ok((instance, owner, repo, tail))
    }

    /// Decode `…/{owner}/{repo}/{index}`.
    pub fn decode_ticket(&self, iri: &str) -> Result<TicketRef, AppError> {
        let (instance, owner, repo, tail) = self.split_tail(iri, "Ticket")?;
        let index = tail.parse::<i64>().map_err(|e| {
            AppError::MalformedObject(format!("invalid ticket index in {}: {}", iri, e))
        })?;

        Ok(TicketRef {
            owner: self.qualify(instance, owner),
            repo: repo.to_string(),
            index,
        })
    }

    /// Decode `…/{owner}/{repo}/{branch}`.
    pub fn decode_branch(&self, iri: &str) -> Result<BranchRef, AppError> {
        let (instance, owner, repo, branch) = self.split_tail(iri, "Branch")?;

        Ok(BranchRef {
            owner: self.qualify(instance, owner),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    /// Decode `…/{owner}/{repo}`.
    pub fn decode_repository(&self, iri: &str) -> Result<RepositoryRef, AppError> {
        let segments: Vec<&str> = iri.split('/').collect();
        let n = segments.len();
        if n < 5 || segments[2].is_empty() || segments[n - 2].is_empty() || segments[n - 1].is_empty()
        {
            return Err(AppError::MalformedObject(format!(
                "not a Repository object IRI: {}",
                iri
            )));
        }

        Ok(RepositoryRef {
            owner: self.qualify(segments[2], segments[n - 2]),
            repo: segments[n - 1].to_string(),
        })
    }

    /// Decode a Person IRI into `(instance, last path segment)`.
    pub fn decode_person<'a>(&self, iri: &'a str) -> Result<(&'a str, &'a str), AppError> {
        let segments: Vec<&str> = iri.split('/').collect();
        if segments.len() < 4 || segments[2].is_empty() {
            return Err(AppError::MalformedObject(format!(
                "not a Person actor IRI: {}",
                iri
            )));
        }
        let name = segments[segments.len() - 1];
        Ok((segments[2], name))
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Base URL of the instance owning `owner` (`user@instance` or bare local).
    fn owner_base<'a>(&'a self, owner: &'a str) -> (String, &'a str) {
        match owner.rsplit_once('@') {
            Some((user, instance)) if !instance.eq_ignore_ascii_case(&self.domain) => {
                (format!("https://{}", instance), user)
            }
            Some((user, _)) => (self.base_url.clone(), user),
            None => (self.base_url.clone(), owner),
        }
    }

    pub fn actor(&self, name: &str) -> String {
        let (base, user) = self.owner_base(name);
        format!("{}/actor/{}", base, user)
    }

    pub fn repository(&self, owner: &str, repo: &str) -> String {
        let (base, user) = self.owner_base(owner);
        format!("{}/repo/{}/{}", base, user, repo)
    }

    pub fn ticket(&self, owner: &str, repo: &str, index: i64) -> String {
        let (base, user) = self.owner_base(owner);
        format!("{}/ticket/{}/{}/{}", base, user, repo, index)
    }

    pub fn branch(&self, owner: &str, repo: &str, branch: &str) -> String {
        let (base, user) = self.owner_base(owner);
        format!("{}/branch/{}/{}/{}", base, user, repo, branch)
    }

    /// IRI of a comment written on this instance.
    ///
    /// Local comments are served here even on a mirrored remote ticket, so the
    /// owner stays in its local form (`bob@remote.example`) under our base URL.
    pub fn note(&self, owner: &str, repo: &str, index: i64, comment_id: &str) -> String {
        format!(
            "{}/ticket/{}/{}/{}/{}",
            self.base_url, owner, repo, index, comment_id
        )
    }
}

/// Drop the last path segment (`…/3/abc` → `…/3`).
pub fn strip_last_segment(iri: &str) -> &str {
    let trimmed = iri.trim_end_matches('/');
    trimmed
        .rsplit_once('/')
        .map(|(head, _)| head)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> IriCodec {
        IriCodec::new("local.example", "https://local.example")
    }

    #[test]
    fn decode_ticket_local_owner_is_bare() {
        let decoded = codec()
            .decode_ticket("https://local.example/ticket/alice/widgets/3")
            .unwrap();
        assert_eq!(
            decoded,
            TicketRef {
                owner: "alice".to_string(),
                repo: "widgets".to_string(),
                index: 3,
            }
        );
    }

    #[test]
    fn decode_ticket_remote_owner_is_qualified() {
        let decoded = codec()
            .decode_ticket("https://remote.example/r/issues/3")
            .unwrap();
        assert_eq!(decoded.owner, "r@remote.example");
        assert_eq!(decoded.repo, "issues");
        assert_eq!(decoded.index, 3);
    }

    #[test]
    fn decode_requires_five_segments() {
        let error = codec()
            .decode_ticket("https://remote.example/3")
            .expect_err("too short");
        assert!(matches!(error, AppError::MalformedObject(_)));

        assert!(codec().decode_branch("https://remote.example/x").is_err());
        assert!(
            codec()
                .decode_ticket("https://local.example/ticket/alice/widgets/three")
                .is_err()
        );
    }

    #[test]
    fn ticket_round_trip_local_and_remote() {
        let codec = codec();
        for (owner, repo, index) in [
            ("alice", "widgets", 1),
            ("alice", "gadgets", 42),
            ("bob@remote.example", "widgets", 7),
        ] {
            let iri = codec.ticket(owner, repo, index);
            let decoded = codec.decode_ticket(&iri).unwrap();
            assert_eq!(decoded.owner, owner);
            assert_eq!(decoded.repo, repo);
            assert_eq!(decoded.index, index);
        }
    }

    #[test]
    fn note_is_hosted_here_and_decodes_to_its_ticket() {
        let codec = codec();
        for owner in ["alice", "bob@remote.example"] {
            let iri = codec.note(owner, "widgets", 3, "01HZX");
            assert!(codec.is_local(&iri));

            let ticket = codec.decode_ticket(strip_last_segment(&iri)).unwrap();
            assert_eq!(ticket.owner, owner);
            assert_eq!(ticket.repo, "widgets");
            assert_eq!(ticket.index, 3);
        }
    }

    #[test]
    fn branch_and_repository_decode() {
        let codec = codec();
        let branch = codec
            .decode_branch(&codec.branch("alice", "widgets", "main"))
            .unwrap();
        assert_eq!(branch.owner, "alice");
        assert_eq!(branch.branch, "main");

        let repo = codec
            .decode_repository("https://remote.example/owner/repo")
            .unwrap();
        assert_eq!(repo.owner, "owner@remote.example");
        assert_eq!(repo.repo, "repo");

        let local = codec
            .decode_repository(&codec.repository("alice", "widgets"))
            .unwrap();
        assert_eq!(local.owner, "alice");
    }

    #[test]
    fn person_decode_and_locality() {
        let codec = codec();
        let (instance, name) = codec
            .decode_person("https://remote.example/actor/bob")
            .unwrap();
        assert_eq!(instance, "remote.example");
        assert_eq!(name, "bob");
        assert!(codec.decode_person("https://remote.example").is_err());

        assert!(codec.is_local("https://local.example/actor/alice"));
        assert!(!codec.is_local("https://remote.example/actor/bob"));
    }

    #[test]
    fn strip_last_segment_drops_tail() {
        assert_eq!(
            strip_last_segment("https://remote.example/r/issues/3/5"),
            "https://remote.example/r/issues/3"
        );
        assert_eq!(
            strip_last_segment("https://remote.example/r/issues/3"),
            "https://remote.example/r/issues"
        );
    }
}
