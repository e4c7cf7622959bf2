//! Configuration extension endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, info};
use woodconf_core::{Environment, File, Resolution};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub configs: Vec<File>,
}

/// Resolve the pipeline configuration for the build described by the body.
///
/// Responds 204 when no configuration was found so the CI server falls back
/// to the repository's own files.
pub async fn resolve_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let env: Environment = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;

    info!(
        repo = %env.repo.full_name,
        event = %env.pipeline.event,
        commit = %env.pipeline.commit,
        "Configuration requested"
    );

    match state.resolver.resolve(&env).await {
        Ok(Resolution::Empty) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(Resolution::Configs(configs)) => Ok(Json(ConfigResponse { configs }).into_response()),
        Err(e) => {
            error!(repo = %env.repo.full_name, error = %e, "Failed to resolve configuration");
            Err(e.into())
        }
    }
}
