//! The coordinator actor
//!
//! A dedicated tokio task owns the [`CoordinatorState`] of one named
//! instance. Callers enqueue a [`Command`] over an mpsc channel and await the
//! reply on a oneshot, so many requests can arrive concurrently while the
//! task applies them strictly one at a time, in the order they were admitted.
//!
//! Every mutation is computed on a copy, written to the store, and only then
//! swapped into memory. A failed exchange or a failed write leaves both
//! memory and disk as they were.

use std::sync::Arc;

use chrono::Utc;
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::CoordinatorError;
use super::state::CoordinatorState;
use crate::cache::PlaybackCache;
use crate::config::{BootstrapCredentials, Config};
use crate::spotify::{TokenExchange, UpstreamError};
use crate::storage::{Database, DatabaseError};
use crate::tokens::Token;

/// Pending requests per instance before senders start waiting
const MAILBOX_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, CoordinatorError>>;

enum Command {
    GetToken(Reply<CoordinatorState>),
    PurgeCache(Reply<()>),
    RefreshToken(Reply<Token>),
    SetCache(Box<RawValue>, Reply<()>),
}

/// What a coordinator needs beyond its store and exchange
#[derive(Debug, Clone, Default)]
pub struct CoordinatorSettings {
    pub bootstrap: BootstrapCredentials,
    pub default_cache_duration_seconds: u64,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bootstrap: config.bootstrap.clone(),
            default_cache_duration_seconds: config.cache.default_duration_seconds,
        }
    }
}

/// Address of a running coordinator. Cheap to clone.
#[derive(Clone)]
pub struct CoordinatorHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the owning task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Current token and cache. Bootstraps the token first if it has never
    /// been refreshed.
    pub async fn get_token(&self) -> Result<CoordinatorState, CoordinatorError> {
        self.request(Command::GetToken).await
    }

    /// Exchange the refresh token for a new access token, unconditionally.
    pub async fn refresh_token(&self) -> Result<Token, CoordinatorError> {
        self.request(Command::RefreshToken).await
    }

    pub async fn set_cache(&self, payload: Box<RawValue>) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::SetCache(payload, reply)).await
    }

    pub async fn purge_cache(&self) -> Result<(), CoordinatorError> {
        self.request(Command::PurgeCache).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;

        reply_rx.await.map_err(|_| CoordinatorError::Unavailable)?
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct Coordinator {
    db: Database,
    exchange: Arc<dyn TokenExchange>,
    name: String,
    state: CoordinatorState,
}

impl Coordinator {
    /// Load an instance from the store, seeding it when nothing was stored.
    pub async fn load(
        name: &str,
        db: Database,
        exchange: Arc<dyn TokenExchange>,
        settings: &CoordinatorSettings,
    ) -> Result<Self, CoordinatorError> {
        let instance = name.to_string();
        let stored = run_blocking(&db, move |db| db.load_state(&instance)).await?;
        let restored = stored.token.is_some();

        let state = CoordinatorState::from_stored(
            stored,
            &settings.bootstrap,
            settings.default_cache_duration_seconds,
        );

        info!(
            instance = %name,
            restored,
            phase = ?state.token.phase,
            cached = !state.cache.is_empty(),
            "Coordinator state loaded"
        );

        Ok(Self {
            db,
            exchange,
            name: name.to_string(),
            state,
        })
    }

    /// Start the owning task and return its address.
    ///
    /// The task runs until every handle has been dropped.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = CoordinatorHandle {
            name: Arc::from(self.name.as_str()),
            tx,
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            // A caller that went away still gets its command applied;
            // only the reply is discarded.
            match command {
                Command::GetToken(reply) => {
                    let _ = reply.send(self.get_token().await);
                }
                Command::PurgeCache(reply) => {
                    let _ = reply.send(self.purge_cache().await);
                }
                Command::RefreshToken(reply) => {
                    let _ = reply.send(self.refresh_token().await);
                }
                Command::SetCache(payload, reply) => {
                    let _ = reply.send(self.set_cache(payload).await);
                }
            }
        }

        debug!(instance = %self.name, "Coordinator task exiting (mailbox closed)");
    }

    async fn get_token(&mut self) -> Result<CoordinatorState, CoordinatorError> {
        if self.state.token.needs_bootstrap() {
            info!(instance = %self.name, "Bootstrap token found, performing first refresh");
            self.refresh_token().await?;
        }
        Ok(self.state.clone())
    }

    async fn refresh_token(&mut self) -> Result<Token, CoordinatorError> {
        let refresh_token = self
            .state
            .token
            .refresh_token()
            .ok_or(UpstreamError::MissingRefreshToken)?
            .to_string();

        let response = match self.exchange.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(instance = %self.name, error = %e, "Token refresh failed");
                return Err(e.into());
            }
        };

        let next = self.state.token.refreshed(&response);

        let instance = self.name.clone();
        let to_store = next.clone();
        run_blocking(&self.db, move |db| db.put_token(&instance, &to_store)).await?;

        let was_bootstrap = self.state.token.needs_bootstrap();
        self.state.token = next;
        info!(
            instance = %self.name,
            bootstrap = was_bootstrap,
            expires_in = ?self.state.token.expires_in,
            "Token refreshed"
        );

        Ok(self.state.token.clone())
    }

    async fn set_cache(&mut self, payload: Box<RawValue>) -> Result<(), CoordinatorError> {
        let duration = self.state.cache_duration_seconds;
        let expires_at = PlaybackCache::expiry(Utc::now(), duration)
            .ok_or(CoordinatorError::InvalidCacheDuration(duration))?;

        let instance = self.name.clone();
        let to_store = payload.clone();
        run_blocking(&self.db, move |db| {
            db.put_cache(&instance, &to_store, expires_at, duration)
        })
        .await?;

        self.state.cache = PlaybackCache::new(Some(payload), Some(expires_at));
        debug!(instance = %self.name, %expires_at, "Playback cached");
        Ok(())
    }

    async fn purge_cache(&mut self) -> Result<(), CoordinatorError> {
        let instance = self.name.clone();
        let removed = run_blocking(&self.db, move |db| db.delete_cache(&instance)).await?;

        self.state.cache.purge();
        debug!(instance = %self.name, removed, "Playback cache purged");
        Ok(())
    }
}

/// Run a store operation off the async workers.
async fn run_blocking<T, F>(db: &Database, op: F) -> Result<T, DatabaseError>
where
    F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || op(&db)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{raw, setup_db, FakeExchange};
    use crate::tokens::TokenPhase;
    use chrono::Duration;

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            bootstrap: BootstrapCredentials {
                access_token: Some("A0".to_string()),
                refresh_token: Some("R0".to_string()),
            },
            default_cache_duration_seconds: 30,
        }
    }

    async fn start(db: &Database, exchange: &Arc<FakeExchange>) -> CoordinatorHandle {
        let exchange: Arc<dyn TokenExchange> = exchange.clone();
        let coordinator = Coordinator::load("MAIN_TOKEN", db.clone(), exchange, &settings())
            .await
            .unwrap();
        coordinator.spawn().0
    }

    // ========================================================================
    // Token lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_first_get_token_bootstraps_once() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;

        let view = handle.get_token().await.unwrap();
        assert_eq!(exchange.calls(), vec!["R0"]);
        assert_eq!(
            view.token,
            Token {
                access_token: Some("A1".to_string()),
                expires_in: Some(3600),
                phase: TokenPhase::Active,
                refresh_token: Some("R0".to_string()),
            }
        );

        let stored = db.load_state("MAIN_TOKEN").unwrap().token.unwrap();
        assert_eq!(stored, view.token);

        // Second read performs no exchange
        let again = handle.get_token().await.unwrap();
        assert_eq!(exchange.calls().len(), 1);
        assert_eq!(again.token.access_token.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_refresh_always_exchanges() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;

        handle.get_token().await.unwrap();
        let token = handle.refresh_token().await.unwrap();
        let token2 = handle.refresh_token().await.unwrap();

        assert_eq!(token.access_token.as_deref(), Some("A2"));
        assert_eq!(token2.access_token.as_deref(), Some("A3"));
        assert_eq!(exchange.calls(), vec!["R0", "R0", "R0"]);
        assert_eq!(
            db.load_state("MAIN_TOKEN").unwrap().token.unwrap().access_token,
            Some("A3".to_string())
        );
    }

    #[tokio::test]
    async fn test_scheduled_refresh_ends_bootstrap() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;

        handle.refresh_token().await.unwrap();
        let view = handle.get_token().await.unwrap();

        assert_eq!(view.token.phase, TokenPhase::Active);
        assert_eq!(exchange.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_leaves_token_untouched() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;
        handle.get_token().await.unwrap();

        exchange.fail_with(400, r#"{"error":"invalid_grant"}"#);
        let err = handle.refresh_token().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UpstreamAuth(_)));

        let stored = db.load_state("MAIN_TOKEN").unwrap().token.unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("A1"));

        exchange.succeed();
        let view = handle.get_token().await.unwrap();
        assert_eq!(view.token.access_token.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_failed_bootstrap_stays_in_bootstrap() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        exchange.fail_with(503, "upstream down");
        let handle = start(&db, &exchange).await;

        let err = handle.get_token().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UpstreamTransient(_)));
        assert!(db.load_state("MAIN_TOKEN").unwrap().token.is_none());

        // The next read retries the bootstrap
        exchange.succeed();
        let view = handle.get_token().await.unwrap();
        assert_eq!(view.token.phase, TokenPhase::Active);
        assert_eq!(exchange.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_auth_error() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let exchange_dyn: Arc<dyn TokenExchange> = exchange.clone();
        let coordinator = Coordinator::load(
            "MAIN_TOKEN",
            db.clone(),
            exchange_dyn,
            &CoordinatorSettings::default(),
        )
        .await
        .unwrap();
        let (handle, _task) = coordinator.spawn();

        let err = handle.refresh_token().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UpstreamAuth(_)));
        assert!(exchange.calls().is_empty());
    }

    // ========================================================================
    // Playback cache
    // ========================================================================

    #[tokio::test]
    async fn test_set_cache_records_expiry() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;

        let before = Utc::now();
        handle.set_cache(raw(r#"{"track":"X"}"#)).await.unwrap();
        let after = Utc::now();

        let stored = db.load_state("MAIN_TOKEN").unwrap();
        assert_eq!(stored.playing.unwrap().get(), r#"{"track":"X"}"#);
        let expires_at = stored.expires_at.unwrap();
        assert!(expires_at >= before + Duration::seconds(30));
        assert!(expires_at <= after + Duration::seconds(30));

        let view = handle.get_token().await.unwrap();
        assert_eq!(view.cache.expires_at(), Some(expires_at));
        assert_eq!(view.cache.payload().unwrap().get(), r#"{"track":"X"}"#);
    }

    #[tokio::test]
    async fn test_purge_clears_payload_and_is_idempotent() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;
        handle.set_cache(raw(r#"{"track":"X"}"#)).await.unwrap();

        handle.purge_cache().await.unwrap();
        let once = db.load_state("MAIN_TOKEN").unwrap();
        handle.purge_cache().await.unwrap();
        let twice = db.load_state("MAIN_TOKEN").unwrap();

        assert!(once.playing.is_none() && twice.playing.is_none());
        assert!(once.expires_at.is_none() && twice.expires_at.is_none());
        assert_eq!(once.cache_duration_seconds, twice.cache_duration_seconds);

        let view = handle.get_token().await.unwrap();
        assert!(view.cache.is_empty());
        assert!(view.cache.expires_at().is_none());
    }

    #[tokio::test]
    async fn test_restart_restores_cache_and_token() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;
        handle.get_token().await.unwrap();
        handle.set_cache(raw(r#"{"track":"X"}"#)).await.unwrap();
        let before = handle.get_token().await.unwrap();
        drop(handle);

        let restarted = start(&db, &exchange).await;
        let after = restarted.get_token().await.unwrap();

        assert_eq!(after.token, before.token);
        assert_eq!(after.cache.payload().unwrap().get(), r#"{"track":"X"}"#);
        assert_eq!(after.cache.expires_at(), before.cache.expires_at());
        // Already active: no second bootstrap
        assert_eq!(exchange.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_an_error() {
        let (db, _temp) = setup_db();
        let exchange: Arc<dyn TokenExchange> = FakeExchange::new();
        let settings = CoordinatorSettings {
            default_cache_duration_seconds: u64::MAX,
            ..settings()
        };
        let coordinator = Coordinator::load("MAIN_TOKEN", db.clone(), exchange, &settings)
            .await
            .unwrap();
        let (handle, task) = coordinator.spawn();

        let err = handle.set_cache(raw(r#"{"track":"X"}"#)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidCacheDuration(u64::MAX)));
        assert!(db.load_state("MAIN_TOKEN").unwrap().playing.is_none());

        // The task survives and keeps serving
        assert!(!task.is_finished());
        assert!(handle.get_token().await.unwrap().cache.is_empty());
    }

    // ========================================================================
    // Storage failures
    // ========================================================================

    #[tokio::test]
    async fn test_failed_writes_leave_memory_and_disk_untouched() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let handle = start(&db, &exchange).await;
        handle.get_token().await.unwrap();
        handle.set_cache(raw(r#"{"track":"X"}"#)).await.unwrap();
        let before = handle.get_token().await.unwrap();

        db.fail_writes(true);
        let err = handle.set_cache(raw(r#"{"track":"Y"}"#)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Storage(_)));
        let err = handle.refresh_token().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Storage(_)));
        let err = handle.purge_cache().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Storage(_)));

        // The exchange ran, but its token was never committed
        assert_eq!(exchange.calls().len(), 2);
        let after = handle.get_token().await.unwrap();
        assert_eq!(after.token, before.token);
        assert_eq!(after.token.access_token.as_deref(), Some("A1"));
        assert_eq!(after.cache.payload().unwrap().get(), r#"{"track":"X"}"#);
        assert_eq!(after.cache.expires_at(), before.cache.expires_at());

        db.fail_writes(false);
        let stored = db.load_state("MAIN_TOKEN").unwrap();
        assert_eq!(stored.token.unwrap(), before.token);
        assert_eq!(stored.playing.unwrap().get(), r#"{"track":"X"}"#);
        assert_eq!(stored.expires_at, before.cache.expires_at());
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[tokio::test]
    async fn test_interleaved_commands_apply_in_admission_order() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::with_delay(std::time::Duration::from_millis(20));
        let handle = start(&db, &exchange).await;

        // join! polls in order, so admission order is a, refresh, purge, b, refresh
        let (a, r1, p, b, r2) = tokio::join!(
            handle.set_cache(raw(r#"{"track":"a"}"#)),
            handle.refresh_token(),
            handle.purge_cache(),
            handle.set_cache(raw(r#"{"track":"b"}"#)),
            handle.refresh_token(),
        );
        a.unwrap();
        p.unwrap();
        b.unwrap();
        assert_eq!(r1.unwrap().access_token.as_deref(), Some("A1"));
        assert_eq!(r2.unwrap().access_token.as_deref(), Some("A2"));
        assert!(!exchange.overlapped());

        let stored = db.load_state("MAIN_TOKEN").unwrap();
        assert_eq!(stored.playing.unwrap().get(), r#"{"track":"b"}"#);
        assert_eq!(stored.token.unwrap().access_token.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_overlap() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::with_delay(std::time::Duration::from_millis(5));
        let handle = start(&db, &exchange).await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                match i % 3 {
                    0 => handle.refresh_token().await.map(|_| ()),
                    1 => handle.set_cache(raw(&format!(r#"{{"n":{i}}}"#))).await,
                    _ => handle.purge_cache().await,
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(!exchange.overlapped());
        let memory = handle.get_token().await.unwrap();
        let stored = db.load_state("MAIN_TOKEN").unwrap();
        assert_eq!(stored.token.unwrap(), memory.token);
        assert_eq!(
            stored.playing.as_deref().map(RawValue::get),
            memory.cache.payload().map(RawValue::get)
        );
        assert_eq!(stored.expires_at, memory.cache.expires_at());
    }

    #[tokio::test]
    async fn test_handle_reports_closed_task() {
        let (db, _temp) = setup_db();
        let exchange = FakeExchange::new();
        let exchange_dyn: Arc<dyn TokenExchange> = exchange.clone();
        let coordinator = Coordinator::load("MAIN_TOKEN", db.clone(), exchange_dyn, &settings())
            .await
            .unwrap();
        let (handle, task) = coordinator.spawn();

        task.abort();
        let _ = task.await;

        assert!(handle.is_closed());
        assert!(matches!(
            handle.purge_cache().await,
            Err(CoordinatorError::Unavailable)
        ));
    }
}
