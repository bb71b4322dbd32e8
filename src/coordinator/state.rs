use crate::cache::PlaybackCache;
use crate::config::BootstrapCredentials;
use crate::storage::StoredState;
use crate::tokens::Token;

/// Everything one coordinator owns. Also the view returned by `GetToken`.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub cache: PlaybackCache,
    pub cache_duration_seconds: u64,
    pub token: Token,
}

impl CoordinatorState {
    /// Rebuild state from what was persisted, seeding missing pieces.
    ///
    /// Without a stored token the bootstrap credentials are used and the
    /// token starts in the `Bootstrap` phase.
    pub fn from_stored(
        stored: StoredState,
        bootstrap: &BootstrapCredentials,
        default_cache_duration: u64,
    ) -> Self {
        let token = stored.token.unwrap_or_else(|| {
            Token::bootstrap(
                bootstrap.access_token.clone(),
                bootstrap.refresh_token.clone(),
            )
        });

        Self {
            cache: PlaybackCache::new(stored.playing, stored.expires_at),
            cache_duration_seconds: stored
                .cache_duration_seconds
                .unwrap_or(default_cache_duration),
            token,
        }
    }
}
