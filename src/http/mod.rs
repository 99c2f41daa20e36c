//! HTTP surface: generated submission endpoints plus status polling.
//!
//! The router exposes one submission endpoint per registered task under the
//! route prefix (`POST /run/{task_name}` by default), a generic status
//! endpoint (`GET /tasks/{task_id}`), and a liveness probe (`GET /healthz`).
//! Route and handler construction are split so tests can drive the
//! [`Router`] directly through `tower::ServiceExt` without binding a socket.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::constants::DEFAULT_ROUTE_PREFIX;
use crate::dispatch::Dispatcher;
use crate::registry::SealedRegistry;

/// Shared application state
pub struct AppState {
    pub registry: SealedRegistry,
    pub dispatcher: Dispatcher,
}

/// Builds the application router over the default route prefix.
pub fn router(state: Arc<AppState>) -> Router {
    router_with_prefix(state, DEFAULT_ROUTE_PREFIX)
}

/// Builds the application router with a custom submission route prefix.
///
/// Submission goes through one parametrized route; the handler resolves
/// the task name against the sealed registry, so the set of live
/// endpoints is exactly the set of registered tasks.
pub fn router_with_prefix(state: Arc<AppState>, prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            &format!("{prefix}/{{task_name}}"),
            post(handlers::submit),
        )
        .route("/tasks/{task_id}", get(handlers::task_status))
        // A bare "/tasks/" does not match the parametrized route; it gets
        // an explicit 400 rather than a silent 404.
        .route("/tasks/", get(handlers::empty_task_id))
        .route("/healthz", get(handlers::healthz))
        .layer(cors)
        .with_state(state)
}

/// Binds the listen address and serves until the process is stopped.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state.clone());
    let listener = TcpListener::bind(addr).await?;
    info!(
        addr,
        tasks = state.registry.len(),
        mode = ?state.dispatcher.mode(),
        "server listening"
    );
    for task in state.registry.iter() {
        info!(task = task.name(), route = format!("{DEFAULT_ROUTE_PREFIX}/{}", task.name()), "endpoint ready");
    }
    axum::serve(listener, app).await?;
    Ok(())
}
