//! Management API.
//!
//! JSON over HTTP, protected by a bearer API key. Validation failures are
//! 400 with `{error, field}`; unknown ids are 404.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::gateway::Gateway;

/// Largest accepted admin request body.
pub const MAX_ADMIN_BODY_BYTES: usize = 64 * 1024;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(gateway: Arc<Gateway>, api_key: &str) -> Self {
        Self {
            gateway,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(list_routes).post(create_route))
        .route("/admin/routes/{id}", put(update_route).delete(delete_route))
        .route("/admin/routes/{id}/enabled", put(set_route_enabled))
        .route("/admin/routes/{id}/duplicate", post(duplicate_route))
        .route("/admin/policies", get(list_policies).post(create_policy))
        .route("/admin/policies/stats", get(policy_stats))
        .route("/admin/policies/{id}", put(update_policy).delete(delete_policy))
        .route("/admin/policies/{id}/enabled", put(set_policy_enabled))
        .route("/admin/explain", post(explain))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_ADMIN_BODY_BYTES))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AdminState,
    shutdown: crate::lifecycle::Shutdown,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
