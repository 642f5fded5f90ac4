//! # notegraph HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Row counts and consistency verdict
//! - `GET /notes`, `POST /notes` - List or save notes
//! - `GET|PUT|DELETE /notes/{id}` - Read, edit or delete one note
//! - `GET /graph` - Nodes and labeled edges
//! - `GET /entities/{id}` - Entity profile
//! - `GET /lookup?name=` - Name or alias to entity id
//! - `GET /search?q=` - Substring search over names and aliases
//! - `POST /entities/merge` - Fold a duplicate entity into its twin
//! - `POST /maintenance/sweep` - Remove orphans
//! - `GET /maintenance/check` - Report dangling rows and orphans
//!
//! ## Security Configuration
//!
//! Taken from [`ServerConfig`]: `cors_origins` (default localhost only),
//! `rate_limit` (default 100/s, 0 disables), `api_key` (Bearer auth when
//! set) and `body_limit` (default 2 MiB).

mod auth;
mod handlers;
mod middleware;
mod types;

pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ApiError, CheckResponse, DeleteResponse, ErrorResponse, HealthResponse, LookupParams,
    LookupResponse, MergeRequest, MergeResponse, NoteRequest, NoteResponse, SearchParams,
    StatusResponse, SweepResponse,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use notegraph_core::{Notebook, NotegraphError};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the notebook plus the server settings.
///
/// [`Notebook`] serializes writers through its store, so handlers share
/// it without an outer lock.
#[derive(Clone)]
pub struct AppState {
    pub notebook: Arc<Notebook>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(notebook: Notebook, server: ServerConfig) -> Self {
        Self {
            notebook: Arc::new(notebook),
            server: Arc::new(server),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer from `cors_origins`.
///
/// - `"*"`: any origin (development only)
/// - `None`: localhost only
/// - otherwise: the comma-separated list, falling back to localhost when
///   nothing in it parses
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - protects against floods (if enabled)
/// 5. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let server = Arc::clone(&state.server);

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/notes",
            get(handlers::list_notes_handler).post(handlers::create_note_handler),
        )
        .route(
            "/notes/{id}",
            get(handlers::get_note_handler)
                .put(handlers::update_note_handler)
                .delete(handlers::delete_note_handler),
        )
        .route("/graph", get(handlers::graph_handler))
        .route("/entities/merge", post(handlers::merge_handler))
        .route("/entities/{id}", get(handlers::entity_handler))
        .route("/lookup", get(handlers::lookup_handler))
        .route("/search", get(handlers::search_handler))
        .route("/maintenance/sweep", post(handlers::sweep_handler))
        .route("/maintenance/check", get(handlers::check_handler));

    match server.api_key.as_deref() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                Arc::<str>::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set NOTEGRAPH_API_KEY or server.api_key to enable authentication."
            );
        }
    }

    match create_rate_limiter(server.rate_limit) {
        Some(limiter) => {
            tracing::info!("Rate limiting enabled: {} requests/second", server.rate_limit);
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(server.cors_origins.as_deref()))
                .layer(axum::extract::DefaultBodyLimit::max(server.body_limit)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind `addr` and serve until the process is stopped.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), NotegraphError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NotegraphError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("notegraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| NotegraphError::Io(format!("Server error: {}", e)))
}
