//! Service layer
//!
//! Local actions that have a federation side: the local change is applied
//! first, then the matching activity is delivered. Delivery failures are
//! logged and never undo the local change.

mod comment;
mod follow;
mod star;
mod user;

pub use comment::CommentService;
pub use follow::FollowService;
pub use star::StarService;
pub use user::UserService;

use crate::federation::DeliveryResult;

/// Log per-recipient failures of a delivery that already ran.
fn log_delivery(action: &str, results: Result<Vec<DeliveryResult>, crate::error::AppError>) {
    match results {
        Ok(results) => {
            let failed = results.iter().filter(|result| !result.success).count();
            tracing::debug!(action, delivered = results.len() - failed, failed, "Delivery finished");
        }
        Err(e) => tracing::warn!(action, error = %e, "Delivery could not be attempted"),
    }
}
