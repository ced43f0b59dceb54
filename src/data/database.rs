//! SQLite database operations
//!
//! All database access goes through this module. Create operations are
//! atomic insert-or-get primitives keyed by each entity's natural key, so
//! two concurrent materializations of the same remote entity converge on
//! one row.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, name, full_name, email, login_type, login_name, is_private, created_at";

const REPOSITORY_SELECT: &str = r#"
    SELECT r.id, r.owner_id, u.name AS owner_name, u.login_type AS owner_login_type,
           r.name, r.description, r.is_private, r.is_fork, r.fork_id, r.original_url,
           r.created_at
    FROM repositories r
    JOIN users u ON u.id = r.owner_id
"#;

const ISSUE_COLUMNS: &str = "id, repo_id, idx, title, content, poster_id, is_closed, is_pull, original_author, created_at";

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite database and run migrations
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Create connection string
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());

        // Create connection pool
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Round-trip a trivial query; used by the health endpoint.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user unless one with the same name or actor IRI exists.
    ///
    /// Returns the stored user and whether this call created it. A name held
    /// by a different actor IRI is a conflict.
    pub async fn insert_user_if_absent(&self, user: &User) -> Result<(User, bool), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, full_name, email, login_type, login_name, is_private, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.login_type)
        .bind(&user.login_name)
        .bind(user.is_private)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok((user.clone(), true));
        }

        self.existing_user_for(user).await.map(|existing| (existing, false))
    }

    /// Insert a federated actor together with its public key and avatar.
    ///
    /// The user row, both key settings and the avatar are committed in one
    /// transaction, so a stored actor always carries its key.
    pub async fn insert_federated_user_if_absent(
        &self,
        user: &User,
        public_key_pem: &str,
        avatar: Option<&[u8]>,
    ) -> Result<(User, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, full_name, email, login_type, login_name, is_private, created_at, avatar)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.login_type)
        .bind(&user.login_name)
        .bind(user.is_private)
        .bind(user.created_at)
        .bind(avatar)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return self.existing_user_for(user).await.map(|existing| (existing, false));
        }

        for (key, value) in [(SETTING_PRIVATE_PEM, ""), (SETTING_PUBLIC_PEM, public_key_pem)] {
            sqlx::query("INSERT INTO user_settings (user_id, key, value) VALUES (?, ?, ?)")
                .bind(&user.id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((user.clone(), true))
    }

    /// The row an insert of `user` collided with; another actor holding the
    /// name is a conflict.
    async fn existing_user_for(&self, user: &User) -> Result<User, AppError> {
        let existing = match &user.login_name {
            Some(iri) => self.get_user_by_iri(iri).await?,
            None => self
                .get_user_by_name(&user.name)
                .await?
                .filter(|existing| existing.login_name.is_none()),
        };

        existing.ok_or_else(|| AppError::Conflict(format!("user name already taken: {}", user.name)))
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Look up a federated user by actor IRI.
    pub async fn get_user_by_iri(&self, iri: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE login_name = ?"
        ))
        .bind(iri)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? ORDER BY created_at LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Delete a user; settings, follows, stars, repositories and comments cascade.
    pub async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_user_avatar(&self, user_id: &str, avatar: &[u8]) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
            .bind(avatar)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_user_avatar(&self, user_id: &str) -> Result<Option<Vec<u8>>, AppError> {
        let avatar = sqlx::query_scalar::<_, Option<Vec<u8>>>("SELECT avatar FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(avatar.flatten())
    }

    // =========================================================================
    // User settings
    // =========================================================================

    pub async fn set_user_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, key, value) VALUES (?, ?, ?) ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM user_settings WHERE user_id = ? AND key = ?",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Record that `user_id` follows `follow_id`. Returns false if already following.
    pub async fn follow_user(&self, user_id: &str, follow_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO follows (id, user_id, follow_id, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(user_id, follow_id) DO NOTHING",
        )
        .bind(EntityId::new().0)
        .bind(user_id)
        .bind(follow_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn unfollow_user(&self, user_id: &str, follow_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND follow_id = ?")
            .bind(user_id)
            .bind(follow_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user_id: &str, follow_id: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE user_id = ? AND follow_id = ?",
        )
        .bind(user_id)
        .bind(follow_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Users following `user_id`, oldest follow first.
    pub async fn get_followers(&self, user_id: &str) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.full_name, u.email, u.login_type, u.login_name, u.is_private, u.created_at
            FROM follows f
            JOIN users u ON u.id = f.user_id
            WHERE f.follow_id = ?
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Users `user_id` follows, oldest follow first.
    pub async fn get_following(&self, user_id: &str) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.full_name, u.email, u.login_type, u.login_name, u.is_private, u.created_at
            FROM follows f
            JOIN users u ON u.id = f.follow_id
            WHERE f.user_id = ?
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    /// Insert a repository unless (owner, name) exists.
    pub async fn insert_repository_if_absent(
        &self,
        repo: &NewRepository,
    ) -> Result<(Repository, bool), AppError> {
        let id = EntityId::new().0;
        let result = sqlx::query(
            r#"
            INSERT INTO repositories (id, owner_id, name, description, is_private, is_fork, fork_id, original_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, name) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&repo.owner_id)
        .bind(&repo.name)
        .bind(&repo.description)
        .bind(repo.is_private)
        .bind(repo.fork_id.is_some())
        .bind(&repo.fork_id)
        .bind(&repo.original_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let stored = sqlx::query_as::<_, Repository>(&format!(
            "{REPOSITORY_SELECT} WHERE r.owner_id = ? AND r.name = ?"
        ))
        .bind(&repo.owner_id)
        .bind(&repo.name)
        .fetch_one(&self.pool)
        .await?;

        Ok((stored, result.rows_affected() == 1))
    }

    pub async fn get_repository_by_id(&self, id: &str) -> Result<Option<Repository>, AppError> {
        let repo = sqlx::query_as::<_, Repository>(&format!("{REPOSITORY_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(repo)
    }

    /// Look up a repository by owner name (bare or `user@instance`) and repository name.
    pub async fn get_repository_by_owner_and_name(
        &self,
        owner_name: &str,
        name: &str,
    ) -> Result<Option<Repository>, AppError> {
        let repo = sqlx::query_as::<_, Repository>(&format!(
            "{REPOSITORY_SELECT} WHERE u.name = ? AND r.name = ?"
        ))
        .bind(owner_name)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(repo)
    }

    // =========================================================================
    // Stars
    // =========================================================================

    /// Star or unstar a repository. Returns whether anything changed.
    pub async fn star_repo(&self, user_id: &str, repo_id: &str, star: bool) -> Result<bool, AppError> {
        let result = if star {
            sqlx::query(
                "INSERT INTO stars (user_id, repo_id, created_at) VALUES (?, ?, ?) ON CONFLICT(user_id, repo_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(repo_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("DELETE FROM stars WHERE user_id = ? AND repo_id = ?")
                .bind(user_id)
                .bind(repo_id)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_starring(&self, user_id: &str, repo_id: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stars WHERE user_id = ? AND repo_id = ?",
        )
        .bind(user_id)
        .bind(repo_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn count_stars(&self, repo_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stars WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Public repositories starred by `user_id`.
    pub async fn get_starred_repositories(&self, user_id: &str) -> Result<Vec<Repository>, AppError> {
        let repos = sqlx::query_as::<_, Repository>(&format!(
            "{REPOSITORY_SELECT} JOIN stars s ON s.repo_id = r.id WHERE s.user_id = ? AND r.is_private = 0 ORDER BY s.created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(repos)
    }

    // =========================================================================
    // Issues and pull requests
    // =========================================================================

    /// Insert an issue unless (repo, index) is taken; returns the stored row.
    pub async fn insert_issue_if_absent(&self, issue: &Issue) -> Result<(Issue, bool), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO issues (id, repo_id, idx, title, content, poster_id, is_closed, is_pull, original_author, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo_id, idx) DO NOTHING
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.repo_id)
        .bind(issue.idx)
        .bind(&issue.title)
        .bind(&issue.content)
        .bind(&issue.poster_id)
        .bind(issue.is_closed)
        .bind(issue.is_pull)
        .bind(&issue.original_author)
        .bind(issue.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok((issue.clone(), true));
        }

        let stored = self
            .get_issue_by_index(&issue.repo_id, issue.idx)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("issue vanished after conflict")))?;
        Ok((stored, false))
    }

    /// Insert a pull request issue and its pull request row atomically.
    ///
    /// Both rows are written in one transaction; an error drops it, which
    /// rolls back, so neither row exists without the other.
    pub async fn insert_pull_request_if_absent(
        &self,
        issue: &Issue,
        pull: &PullRequest,
    ) -> Result<(Issue, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO issues (id, repo_id, idx, title, content, poster_id, is_closed, is_pull, original_author, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(repo_id, idx) DO NOTHING
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.repo_id)
        .bind(issue.idx)
        .bind(&issue.title)
        .bind(&issue.content)
        .bind(&issue.poster_id)
        .bind(issue.is_closed)
        .bind(&issue.original_author)
        .bind(issue.created_at)
        .execute(&mut *tx)
        .await?;

        let created = inserted.rows_affected() == 1;
        if created {
            sqlx::query(
                r#"
                INSERT INTO pull_requests (id, issue_id, head_repo_id, base_repo_id, head_branch, base_branch, merge_base)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&pull.id)
            .bind(&issue.id)
            .bind(&pull.head_repo_id)
            .bind(&pull.base_repo_id)
            .bind(&pull.head_branch)
            .bind(&pull.base_branch)
            .bind(&pull.merge_base)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let stored = self
            .get_issue_by_index(&issue.repo_id, issue.idx)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("issue vanished after insert")))?;
        Ok((stored, created))
    }

    pub async fn get_issue_by_index(&self, repo_id: &str, idx: i64) -> Result<Option<Issue>, AppError> {
        let issue = sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE repo_id = ? AND idx = ?"
        ))
        .bind(repo_id)
        .bind(idx)
        .fetch_optional(&self.pool)
        .await?;
        Ok(issue)
    }

    pub async fn get_issue_by_id(&self, id: &str) -> Result<Option<Issue>, AppError> {
        let issue = sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(issue)
    }

    pub async fn count_issues(&self, repo_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM issues WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_pull_request_by_issue_id(
        &self,
        issue_id: &str,
    ) -> Result<Option<PullRequest>, AppError> {
        let pull = sqlx::query_as::<_, PullRequest>(
            "SELECT id, issue_id, head_repo_id, base_repo_id, head_branch, base_branch, merge_base FROM pull_requests WHERE issue_id = ?",
        )
        .bind(issue_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pull)
    }

    pub async fn count_pull_requests(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pull_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Insert a comment. Comments carrying a note IRI are inserted at most once.
    pub async fn insert_comment_if_absent(
        &self,
        comment: &Comment,
    ) -> Result<(Comment, bool), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, issue_id, poster_id, content, note_iri, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(note_iri) DO NOTHING
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.issue_id)
        .bind(&comment.poster_id)
        .bind(&comment.content)
        .bind(&comment.note_iri)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok((comment.clone(), true));
        }

        let note_iri = comment.note_iri.as_deref().unwrap_or_default();
        let stored = sqlx::query_as::<_, Comment>(
            "SELECT id, issue_id, poster_id, content, note_iri, created_at FROM comments WHERE note_iri = ?",
        )
        .bind(note_iri)
        .fetch_one(&self.pool)
        .await?;
        Ok((stored, false))
    }

    pub async fn get_comment_by_id(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, issue_id, poster_id, content, note_iri, created_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    pub async fn list_issue_comments(&self, issue_id: &str) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, issue_id, poster_id, content, note_iri, created_at FROM comments WHERE issue_id = ? ORDER BY created_at, id",
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }
}
