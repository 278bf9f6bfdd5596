//! Reference backend for the Gmail connection flow.
//!
//! Stores tokens handed over by clients, acknowledges the connection
//! handshake and forgets tokens on logout.

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod tokens;

use tokens::TokenVault;

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<TokenVault>,
}

impl AppState {
    pub fn new(vault: TokenVault) -> Self {
        Self {
            vault: Arc::new(vault),
        }
    }
}

pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/store-gmail-token", post(handlers::store_gmail_token))
        .route("/connect-gmail", post(handlers::connect_gmail))
        .route("/logout-gmail", post(handlers::logout_gmail))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build CORS layer from a comma-separated origin list.
///
/// Without a usable list, falls back to permissive CORS (for development only).
pub fn build_cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!(
            "CORS_ALLOWED_ORIGINS not set or empty, using permissive CORS (not recommended for production)"
        );
        return CorsLayer::permissive();
    }

    tracing::info!("CORS configured for origins: {:?}", origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
