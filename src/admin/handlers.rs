use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::config::validation::parse_backend_url;
use crate::load_balancer::{Backend, LoadBalancerError};

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub backends: usize,
    pub reachable: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendStatus {
    pub address: String,
    pub reachable: bool,
}

impl From<&Backend> for BackendStatus {
    fn from(backend: &Backend) -> Self {
        Self {
            address: backend.url().to_string(),
            reachable: backend.is_reachable(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendRequest {
    pub address: String,
}

type ApiError = (StatusCode, String);

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let backends = state.registry.all_backends();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        backends: backends.len(),
        reachable: backends.iter().filter(|b| b.is_reachable()).count(),
    })
}

/// Backends in rotation order.
pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .registry
        .all_backends()
        .iter()
        .map(|b| BackendStatus::from(b.as_ref()))
        .collect();
    Json(statuses)
}

pub async fn add_backend(
    State(state): State<AdminState>,
    Json(body): Json<BackendRequest>,
) -> Result<(StatusCode, Json<BackendStatus>), ApiError> {
    let url = parse_backend_url(&body.address).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let backend = state.factory.make_backend(&url);

    match state.registry.add(backend.clone()) {
        Ok(()) => Ok((StatusCode::CREATED, Json(BackendStatus::from(backend.as_ref())))),
        Err(e @ LoadBalancerError::DuplicateBackend(_)) => Err((StatusCode::CONFLICT, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn remove_backend(
    State(state): State<AdminState>,
    Json(body): Json<BackendRequest>,
) -> Result<StatusCode, ApiError> {
    let url = parse_backend_url(&body.address).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if state.registry.remove(&url) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("backend {} is not registered", url)))
    }
}
