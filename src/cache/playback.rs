use chrono::{DateTime, Duration, Utc};
use serde_json::value::RawValue;

/// The last fetched now-playing snapshot and when it stops being fresh.
///
/// The payload is kept as raw JSON text and handed back exactly as written.
#[derive(Debug, Clone, Default)]
pub struct PlaybackCache {
    expires_at: Option<DateTime<Utc>>,
    payload: Option<Box<RawValue>>,
}

impl PlaybackCache {
    pub fn new(payload: Option<Box<RawValue>>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            expires_at,
            payload,
        }
    }

    /// When a payload written at `now` stops being fresh.
    ///
    /// `None` when the duration does not fit a timestamp.
    pub fn expiry(now: DateTime<Utc>, duration_seconds: u64) -> Option<DateTime<Utc>> {
        let seconds = i64::try_from(duration_seconds).ok()?;
        now.checked_add_signed(Duration::try_seconds(seconds)?)
    }

    /// The stored payload regardless of expiry
    pub fn payload(&self) -> Option<&RawValue> {
        self.payload.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    /// The payload, only while it has not expired at `now`.
    ///
    /// A payload without an expiry is never fresh.
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<&RawValue> {
        match (self.payload.as_deref(), self.expires_at) {
            (Some(payload), Some(expires_at)) if now < expires_at => Some(payload),
            _ => None,
        }
    }

    /// Drop both the payload and its expiry
    pub fn purge(&mut self) {
        self.payload = None;
        self.expires_at = None;
    }
}
