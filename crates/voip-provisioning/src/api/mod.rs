//! HTTP API for the provisioning service.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{log_requests, throttle_registrations, RegistrationThrottle};
pub use types::*;

use crate::config::RateLimitConfig;
use crate::provisioner::Provisioner;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Registration pipeline
    pub provisioner: Arc<Provisioner>,
}

impl AppState {
    /// Create new application state.
    pub fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner: Arc::new(provisioner),
        }
    }
}

/// Create the API router with the default registration quota.
pub fn create_router(state: AppState) -> Router {
    create_router_with_throttle(state, RegistrationThrottle::new(RateLimitConfig::default().quota()))
}

/// Create the API router with a custom registration quota.
///
/// Only `/register` is throttled; health and account lookups never touch
/// the configuration file and are always served.
pub fn create_router_with_throttle(state: AppState, throttle: RegistrationThrottle) -> Router {
    let register = Router::new()
        .route("/register", post(handlers::register))
        .route_layer(axum_middleware::from_fn_with_state(
            throttle,
            throttle_registrations,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/accounts", get(handlers::list_accounts))
        .route("/v1/accounts/:identifier", get(handlers::get_account))
        .merge(register)
        .layer(axum_middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
