use serde::{Deserialize, Serialize};

use crate::spotify::RefreshResponse;

/// Where a token is in its lifecycle.
///
/// `Bootstrap` holds the externally supplied credential pair and has never
/// been exchanged. The first successful refresh moves it to `Active`, and it
/// never goes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenPhase {
    #[default]
    Bootstrap,
    Active,
}

/// The OAuth access/refresh pair for the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TokenRecord", into = "TokenRecord")]
pub struct Token {
    pub access_token: Option<String>,
    /// Advisory validity from the last refresh, in seconds
    pub expires_in: Option<u64>,
    pub phase: TokenPhase,
    pub refresh_token: Option<String>,
}

/// Wire and storage shape of a [`Token`]
#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default)]
    initial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl From<TokenRecord> for Token {
    fn from(record: TokenRecord) -> Self {
        Token {
            access_token: record.access_token,
            expires_in: record.expires_in,
            phase: if record.initial {
                TokenPhase::Bootstrap
            } else {
                TokenPhase::Active
            },
            refresh_token: record.refresh_token,
        }
    }
}

impl From<Token> for TokenRecord {
    fn from(token: Token) -> Self {
        TokenRecord {
            access_token: token.access_token,
            expires_in: token.expires_in,
            initial: token.phase == TokenPhase::Bootstrap,
            refresh_token: token.refresh_token,
        }
    }
}

impl Token {
    /// Seed a token from bootstrap credentials.
    pub fn bootstrap(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Token {
            access_token: access_token.filter(|t| !t.is_empty()),
            expires_in: None,
            phase: TokenPhase::Bootstrap,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn needs_bootstrap(&self) -> bool {
        self.phase == TokenPhase::Bootstrap
    }

    /// The refresh token, if a usable one is held
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// The token that results from a successful exchange.
    ///
    /// The access token is replaced wholesale. A rotated refresh token is
    /// adopted only when non-empty, so the pair never loses its refresh
    /// credential. Any successful exchange leaves the token `Active`.
    pub fn refreshed(&self, response: &RefreshResponse) -> Token {
        let rotated = response
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Token {
            access_token: Some(response.access_token.clone()),
            expires_in: response.expires_in,
            phase: TokenPhase::Active,
            refresh_token: rotated.or_else(|| self.refresh_token.clone()),
        }
    }
}
