//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener
//! - Hand each request to the dispatcher
//! - Run the health probe, config reload and admin API alongside

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::ProxyConfig;
use crate::health::HealthProbe;
use crate::http::dispatcher::RequestDispatcher;
use crate::http::request::{request_id, MakeRequestUuid, UpstreamRequest};
use crate::lifecycle::shutdown;
use crate::lifecycle::startup::BackendFactory;
use crate::load_balancer::BackendRegistry;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher>,
    pub max_body_bytes: usize,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Arc<BackendRegistry>,
    factory: BackendFactory,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let factory = BackendFactory::new(&config);
        let registry = factory.build_registry(&config);

        let dispatcher = Arc::new(RequestDispatcher::new(
            registry.clone(),
            RetryPolicy::from(&config.retries),
            Duration::from_secs(config.timeouts.request_secs),
        ));

        let state = AppState {
            dispatcher,
            max_body_bytes: config.limits.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            factory,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes)),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// `config_updates` carries reloaded configurations; only their backend
    /// lists are applied.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.registry.len(),
            "Load balancer started"
        );

        // Bind before spawning anything so a bind failure leaves no task behind.
        let admin_listener = if self.config.admin.enabled {
            Some(TcpListener::bind(&self.config.admin.bind_address).await?)
        } else {
            None
        };

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if self.config.health_check.enabled {
            let probe = HealthProbe::new(self.registry.clone(), &self.config.health_check);
            tasks.push(probe.spawn(shutdown.resubscribe()));
        } else {
            tracing::info!("Health probe disabled");
        }

        tasks.push(tokio::spawn(apply_reloads(
            self.registry.clone(),
            self.factory.clone(),
            config_updates,
            shutdown.resubscribe(),
        )));

        if let Some(admin_listener) = admin_listener {
            let admin_state = admin::AdminState::new(
                self.registry.clone(),
                self.factory.clone(),
                self.config.admin.api_key.clone(),
            );
            tasks.push(admin::spawn(admin_listener, admin_state, shutdown.resubscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await;

        for task in tasks {
            task.abort();
        }

        tracing::info!("HTTP server stopped");
        result
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

async fn apply_reloads(
    registry: Arc<BackendRegistry>,
    factory: BackendFactory,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => factory.apply(&registry, &config),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// Main proxy handler.
/// Buffers the body, dispatches, and maps the outcome to a response.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let id = request_id(&parts.headers).to_string();

    tracing::debug!(
        request_id = %id,
        method = %method,
        path = %parts.uri.path(),
        "Dispatching request"
    );

    // Retries replay the same bytes, so the body is read up front.
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %id, error = %e, "Failed to read request body");
            metrics::record_request(&method, 413, "none", start_time);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let upstream = UpstreamRequest::from_parts(&parts, body, client);
    match state.dispatcher.dispatch(upstream).await {
        Ok(dispatched) => {
            let status = dispatched.response.status();
            metrics::record_request(&method, status.as_u16(), dispatched.backend.url().as_str(), start_time);
            dispatched.response
        }
        Err(e) => {
            let response = e.into_response();
            metrics::record_request(&method, response.status().as_u16(), "none", start_time);
            response
        }
    }
}
