use redb::TableDefinition;

/// Coordinator state: "<instance>/<field>" -> encoded value
pub const COORDINATOR_STATE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("coordinator_state");

/// Token (MessagePack)
pub const TOKEN_FIELD: &str = "token";

/// Cache duration in seconds (MessagePack u64)
pub const CACHE_DURATION_FIELD: &str = "cacheDuration";

/// Cached now-playing payload (raw JSON bytes, stored verbatim)
pub const PLAYING_FIELD: &str = "playing";

/// Cache expiry (MessagePack RFC 3339 timestamp)
pub const EXPIRES_AT_FIELD: &str = "expiresAt";
