use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::coordinator::CoordinatorError;
use crate::AppState;

/// Presence-only flags; any value (including empty) turns them on
#[derive(Debug, Default)]
pub struct PlayingFlags {
    pub from_cache: bool,
    pub purge_cache: bool,
    pub save_to_cache: bool,
}

impl PlayingFlags {
    fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            from_cache: query.contains_key("fromCache"),
            purge_cache: query.contains_key("purgeCache"),
            save_to_cache: query.contains_key("cached"),
        }
    }
}

/// Serve what is playing on the account, optionally through the cache.
pub async fn playing(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Box<RawValue>>, ApiError> {
    let flags = PlayingFlags::from_query(&query);
    let coordinator = state.registry.main().await?;
    let view = coordinator.get_token().await?;

    if flags.from_cache {
        if let Some(cached) = view.cache.fresh(Utc::now()) {
            tracing::debug!("Serving now-playing from cache");
            return Ok(Json(cached.to_owned()));
        }
    }

    let access_token = view
        .token
        .access_token
        .as_deref()
        .ok_or_else(|| ApiError::bad_gateway("No access token available"))?;

    let playing = state
        .playback
        .currently_playing(access_token)
        .await
        .map_err(|e| ApiError::from(CoordinatorError::from(e)))?
        .ok_or_else(|| ApiError::not_found("Nothing is playing"))?;

    if flags.purge_cache {
        if let Err(e) = coordinator.purge_cache().await {
            tracing::warn!(error = %e, "Failed to purge now-playing cache");
        }
    } else if flags.save_to_cache {
        if let Err(e) = coordinator.set_cache(playing.clone()).await {
            tracing::warn!(error = %e, "Failed to cache now-playing payload");
        }
    }

    Ok(Json(playing))
}
