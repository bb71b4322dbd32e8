use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson};
use crate::coordinator::CoordinatorState;
use crate::tokens::Token;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenStateResponse {
    #[serde(rename = "cacheDuration")]
    pub cache_duration: u64,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<String>,
    pub playing: Playing,
    pub token: Token,
}

/// The cached payload, or `{}` when nothing is cached
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Playing {
    Cached(Box<RawValue>),
    Empty(EmptyObject),
}

#[derive(Debug, Serialize)]
pub struct EmptyObject {}

impl From<CoordinatorState> for TokenStateResponse {
    fn from(state: CoordinatorState) -> Self {
        let expires_at = state.cache.expires_at().map(|t| t.to_rfc3339());
        let playing = match state.cache.payload() {
            Some(payload) => Playing::Cached(payload.to_owned()),
            None => Playing::Empty(EmptyObject {}),
        };

        Self {
            cache_duration: state.cache_duration_seconds,
            expires_at,
            playing,
            token: state.token,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn get_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TokenStateResponse>, ApiError> {
    let coordinator = state.registry.main().await?;
    let view = coordinator.get_token().await?;
    Ok(Json(view.into()))
}

pub async fn refresh_token(State(state): State<Arc<AppState>>) -> Result<Json<Token>, ApiError> {
    let coordinator = state.registry.main().await?;
    let token = coordinator.refresh_token().await?;
    Ok(Json(token))
}

pub async fn set_cache(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<Box<RawValue>>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.registry.main().await?;
    coordinator.set_cache(payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn purge_cache(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    let coordinator = state.registry.main().await?;
    coordinator.purge_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}
