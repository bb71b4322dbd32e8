use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::value::RawValue;
use tracing::debug;

use super::models::RefreshResponse;
use super::{PlaybackSource, TokenExchange, UpstreamError};
use crate::config::SpotifyConfig;

/// reqwest-backed client for the token endpoint and the Web API
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    api_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token_url: String,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig, http: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http,
            token_url: config.token_url.clone(),
        }
    }
}

#[async_trait]
impl TokenExchange for SpotifyClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, UpstreamError> {
        if refresh_token.is_empty() {
            return Err(UpstreamError::MissingRefreshToken);
        }

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(UpstreamError::from_status(status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        let parsed: RefreshResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::Malformed(format!("token response: {e}")))?;

        if parsed.access_token.is_empty() {
            return Err(UpstreamError::Malformed(
                "token response carried an empty access_token".to_string(),
            ));
        }

        debug!(expires_in = ?parsed.expires_in, "Token endpoint issued a new access token");
        Ok(parsed)
    }
}

#[async_trait]
impl PlaybackSource for SpotifyClient {
    async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<Option<Box<RawValue>>, UpstreamError> {
        let url = format!("{}/me/player/currently-playing", self.api_url);
        let response = self.http.get(&url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(UpstreamError::from_status(status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        let payload: Box<RawValue> = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::Malformed(format!("currently-playing response: {e}")))?;
        Ok(Some(payload))
    }
}

/// Body of a non-success response, empty if it cannot be read
async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(%status, error = %e, "Failed to read upstream error body");
            String::new()
        }
    }
}
