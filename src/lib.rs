//! playing-token - Spotify token and now-playing cache service
//!
//! This crate keeps one Spotify OAuth credential pair alive and caches what
//! the account is playing:
//! - A single-owner coordinator task per account that serializes refreshes
//!   and cache writes
//! - Bootstrap from externally supplied credentials on first use
//! - Scheduled background refresh
//! - redb embedded database (ACID, crash-safe) for restart recovery
//! - REST API behind basic auth, plus a public now-playing route

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod scheduler;
pub mod spotify;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use config::Config;
use coordinator::CoordinatorRegistry;
use spotify::PlaybackSource;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub playback: Arc<dyn PlaybackSource>,
    pub registry: CoordinatorRegistry,
}
