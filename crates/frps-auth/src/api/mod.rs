//! HTTP API for the authorization service.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{
    admin_auth_middleware, logging_middleware, parse_basic_auth, rate_limit_middleware, AdminGate,
    RateLimitState, HANDSHAKE_PATH, STATIC_PREFIX,
};
pub use types::*;

use crate::handshake::Handshake;
use crate::lifecycle::Authorizations;
use crate::signer::Signer;
use crate::store::RecordStore;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Administrative record operations
    pub authorizations: Authorizations,
    /// Registration verification
    pub handshake: Handshake,
}

impl AppState {
    /// Create new application state over one store and signer.
    pub fn new(store: Arc<dyn RecordStore>, signer: Arc<Signer>) -> Self {
        Self {
            authorizations: Authorizations::new(store.clone(), signer.clone()),
            handshake: Handshake::new(store, signer),
        }
    }
}

/// Create the API router with the default rate limit and static directory.
pub fn create_router(state: AppState, gate: AdminGate) -> Router {
    create_router_with_rate_limit(state, gate, RateLimitState::new(600), Path::new("static"))
}

/// Create the API router with custom rate limiting and static directory.
pub fn create_router_with_rate_limit(
    state: AppState,
    gate: AdminGate,
    rate_limit: RateLimitState,
    static_dir: &Path,
) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health))
        // Tunnel server callback
        .route(HANDSHAKE_PATH, post(handlers::handshake))
        // Administration
        .route("/add-auth", post(handlers::add_auth))
        .route("/update-auth", post(handlers::update_auth))
        .route("/disable-auth/:id", post(handlers::disable_auth))
        .route("/enable-auth/:id", post(handlers::enable_auth))
        .route("/delete-auth/:id", post(handlers::delete_auth))
        .route("/list-auth", get(handlers::list_auth).post(handlers::list_auth))
        .route("/get-auth/:id", get(handlers::get_auth))
        .route("/get-auth-config/:id", get(handlers::get_auth_config));

    static_routes(router, static_dir)
        .layer(axum_middleware::from_fn_with_state(gate, admin_auth_middleware))
        .layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Static assets, exempt from the credential gate.
///
/// Falls back to the statistics page built into the binary when the
/// configured directory does not exist.
fn static_routes(router: Router<AppState>, static_dir: &Path) -> Router<AppState> {
    if static_dir.is_dir() {
        info!(dir = %static_dir.display(), "Serving static assets from directory");
        router.nest_service(STATIC_PREFIX, ServeDir::new(static_dir))
    } else {
        info!(dir = %static_dir.display(), "Static directory missing, serving built-in assets");
        router
            .route(STATIC_PREFIX, get(handlers::statistics_page))
            .route(&format!("{}/", STATIC_PREFIX), get(handlers::statistics_page))
            .route(
                &format!("{}/index.html", STATIC_PREFIX),
                get(handlers::statistics_page),
            )
    }
}
