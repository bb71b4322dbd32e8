use chrono::{DateTime, Utc};
use serde_json::value::RawValue;

use crate::tokens::Token;

/// Everything persisted for one coordinator instance.
///
/// Each field is stored under its own key, so any of them may be absent
/// (a fresh instance, or a purged cache).
#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub cache_duration_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub playing: Option<Box<RawValue>>,
    pub token: Option<Token>,
}
