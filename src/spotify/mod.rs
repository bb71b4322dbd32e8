//! Outbound Spotify collaborators: the OAuth token endpoint and the Web API
//! "currently playing" endpoint.
//!
//! Both are reached through traits so the coordinator and the HTTP layer can
//! be exercised without a network.

mod client;
pub mod models;

pub use client::SpotifyClient;
pub use models::RefreshResponse;

use async_trait::async_trait;
use serde_json::value::RawValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream response was malformed: {0}")]
    Malformed(String),
    #[error("No refresh token is available")]
    MissingRefreshToken,
    #[error("Upstream rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Upstream failed ({status}): {body}")]
    ServerError { status: u16, body: String },
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if (400..500).contains(&status) {
            UpstreamError::Rejected { status, body }
        } else {
            UpstreamError::ServerError { status, body }
        }
    }

    /// Whether the failure means our credentials were refused, as opposed to
    /// a transient condition a caller may retry.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            UpstreamError::Rejected { .. } | UpstreamError::MissingRefreshToken
        )
    }
}

/// OAuth refresh-grant exchange.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, UpstreamError>;
}

/// Source of the "currently playing" snapshot.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Returns `None` when nothing is playing.
    async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<Option<Box<RawValue>>, UpstreamError>;
}
