//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::value::RawValue;
use tempfile::TempDir;

use crate::config::{
    ApiConfig, BootstrapCredentials, CacheConfig, Config, RefreshConfig, ServerConfig,
    SpotifyConfig,
};
use crate::coordinator::{CoordinatorRegistry, CoordinatorSettings};
use crate::spotify::{PlaybackSource, RefreshResponse, TokenExchange, UpstreamError};
use crate::storage::Database;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard; the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

pub fn raw(json: &str) -> Box<RawValue> {
    RawValue::from_string(json.to_string()).unwrap()
}

/// A `Config` for unit tests: `admin:hunter2` on the management routes,
/// bootstrap pair `A0`/`R0`, scheduled refresh disabled.
pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            password: "hunter2".to_string(),
            username: "admin".to_string(),
        },
        bootstrap: BootstrapCredentials {
            access_token: Some("A0".to_string()),
            refresh_token: Some("R0".to_string()),
        },
        cache: CacheConfig::default(),
        refresh: RefreshConfig {
            interval_seconds: 0,
        },
        server: ServerConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        spotify: SpotifyConfig {
            api_url: "http://127.0.0.1:9/v1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            timeout_seconds: 1,
            token_url: "http://127.0.0.1:9/api/token".to_string(),
        },
    }
}

/// Build a full `Arc<AppState>` around the given database and fakes.
pub fn test_state(
    db: Database,
    exchange: Arc<FakeExchange>,
    playback: Arc<FakePlayback>,
) -> Arc<AppState> {
    let config = test_config();
    let registry = CoordinatorRegistry::new(db, exchange, CoordinatorSettings::from_config(&config));
    Arc::new(AppState {
        config,
        playback,
        registry,
    })
}

// ============================================================================
// Fake token endpoint
// ============================================================================

/// Hands out `A1`, `A2`, ... in call order. Failed calls still consume a
/// number.
pub struct FakeExchange {
    calls: Mutex<Vec<String>>,
    delay: Duration,
    failure: Mutex<Option<(u16, String)>>,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
}

impl FakeExchange {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Each exchange sleeps for `delay`, widening the window for overlap.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
            failure: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        })
    }

    /// Answer every following call with this HTTP status and body.
    pub fn fail_with(&self, status: u16, body: &str) {
        *self.failure.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Refresh tokens presented so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether two exchanges were ever in flight at once
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, UpstreamError> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(refresh_token.to_string());
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((status, body)) = self.failure.lock().unwrap().clone() {
            return Err(UpstreamError::from_status(status, body));
        }

        let mut response = RefreshResponse::new(format!("A{n}"));
        response.expires_in = Some(3600);
        Ok(response)
    }
}

// ============================================================================
// Fake player endpoint
// ============================================================================

/// Reports a fixed payload, or nothing playing when unset.
pub struct FakePlayback {
    calls: Mutex<Vec<String>>,
    playing: Mutex<Option<String>>,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            playing: Mutex::new(None),
        })
    }

    pub fn set_playing(&self, json: Option<&str>) {
        *self.playing.lock().unwrap() = json.map(str::to_string);
    }

    /// Access tokens presented so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSource for FakePlayback {
    async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<Option<Box<RawValue>>, UpstreamError> {
        self.calls.lock().unwrap().push(access_token.to_string());
        Ok(self.playing.lock().unwrap().as_deref().map(raw))
    }
}
