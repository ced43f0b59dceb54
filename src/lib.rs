//! forgefed - ForgeFed federation for a software forge
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Actor/repository/ticket documents, inboxes, collections  │
//! │  - WebFinger, authorize_interaction                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Federation + Service Layer                     │
//! │  - Signature verification, activity dispatch                │
//! │  - Materialization of remote entities                       │
//! │  - Outbound delivery for local stars/follows/comments       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: local actions with a federation side
//! - `federation`: ForgeFed protocol handling
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use federation::{
    ActivityDelivery, ActivityProcessor, HttpTransport, IriCodec, Materializer, ObjectFetcher,
    SignatureVerifier, Transport,
};

/// Application state shared across all handlers
///
/// Cloned for each request; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    pub codec: IriCodec,

    /// Bounded GET of remote documents
    pub fetcher: ObjectFetcher,

    pub materializer: Materializer,

    /// Inbound HTTP Signature verification
    pub verifier: Arc<SignatureVerifier>,

    /// Inbound activity dispatch
    pub processor: ActivityProcessor,

    /// Outbound signed delivery
    pub delivery: ActivityDelivery,

    pub stars: Arc<service::StarService>,
    pub follows: Arc<service::FollowService>,
    pub comments: Arc<service::CommentService>,
    pub users: Arc<service::UserService>,
}

impl AppState {
    /// Initialize application state with the reqwest transport
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the database
    /// cannot be opened
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let transport = HttpTransport::new(&config.federation)?;
        Self::with_transport(config, Arc::new(transport)).await
    }

    /// Initialize application state over an arbitrary transport
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the federation components
    /// 3. Build the services
    pub async fn with_transport(
        config: config::AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Federation components
        let base_url = config.server.base_url();
        let federation = &config.federation;
        let codec = IriCodec::new(&config.server.domain, &base_url);
        let fetcher = ObjectFetcher::new(transport.clone(), federation.max_size);
        let materializer = Materializer::new(
            db.clone(),
            fetcher.clone(),
            codec.clone(),
            federation.no_reply_domain(&config.server.domain),
        );
        let verifier = SignatureVerifier::new(
            fetcher.clone(),
            materializer.clone(),
            federation.algorithms.clone(),
        );
        let processor = ActivityProcessor::new(db.clone(), materializer.clone());
        let delivery = ActivityDelivery::new(
            db.clone(),
            transport,
            base_url.clone(),
            federation.signing_algorithm().to_string(),
            federation.max_size,
        );

        // 3. Services
        let stars = service::StarService::new(db.clone(), delivery.clone(), base_url.clone());
        let follows = service::FollowService::new(db.clone(), delivery.clone(), base_url);
        let comments = service::CommentService::new(db.clone(), delivery.clone(), codec.clone());
        let users = service::UserService::new(db.clone(), federation.key_bits);

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            codec,
            fetcher,
            materializer,
            verifier: Arc::new(verifier),
            processor,
            delivery,
            stars: Arc::new(stars),
            follows: Arc::new(follows),
            comments: Arc::new(comments),
            users: Arc::new(users),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use axum::extract::DefaultBodyLimit;
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);
    let max_size = state.config.federation.max_size;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .merge(api::interaction_router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
