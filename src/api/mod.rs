//! API layer
//!
//! HTTP handlers for:
//! - ForgeFed (actor/repository/ticket documents, inboxes, collections)
//! - WebFinger
//! - Remote interaction and avatars
//! - Metrics (Prometheus)

mod activitypub;
mod interaction;
pub mod metrics;
mod wellknown;

pub use activitypub::activitypub_router;
pub use interaction::interaction_router;
pub use metrics::metrics_router;
pub use wellknown::wellknown_router;
