pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown;
use crate::lifecycle::startup::BackendFactory;
use crate::load_balancer::BackendRegistry;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<BackendRegistry>,
    pub factory: BackendFactory,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(registry: Arc<BackendRegistry>, factory: BackendFactory, api_key: String) -> Self {
        Self {
            registry,
            factory,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route(
            "/admin/backends",
            get(get_backends).post(add_backend).delete(remove_backend),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub fn spawn(listener: TcpListener, state: AdminState, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    let router = setup_admin_router(state);
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Admin API listening");
        }
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await
        {
            tracing::error!(error = %e, "Admin API stopped with error");
        }
    })
}
