//! Local user creation

use std::sync::Arc;

use crate::data::{Database, User};
use crate::error::AppError;
use crate::federation::keys;

pub struct UserService {
    db: Arc<Database>,
    key_bits: usize,
}

impl UserService {
    pub fn new(db: Arc<Database>, key_bits: usize) -> Self {
        Self { db, key_bits }
    }

    /// Create a local user together with its federation keypair.
    pub async fn create_local_user(&self, name: &str, email: &str) -> Result<User, AppError> {
        if name.is_empty() || name.contains('@') || name.contains('/') {
            return Err(AppError::Validation(format!("invalid user name: {:?}", name)));
        }
        if email.is_empty() {
            return Err(AppError::Validation("email is required".to_string()));
        }

        let (user, created) = self.db.insert_user_if_absent(&User::new_local(name, email)).await?;
        if !created {
            return Err(AppError::Conflict(format!("user {} already exists", name)));
        }

        keys::ensure_keypair(&self.db, &user, self.key_bits).await?;
        tracing::info!(user = %user.name, "Created local user");

        Ok(user)
    }
}
