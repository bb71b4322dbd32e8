use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    /// Credentials seeded into a brand-new coordinator. Ignored once a token
    /// has been stored.
    pub bootstrap: BootstrapCredentials,
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
    pub server: ServerConfig,
    pub spotify: SpotifyConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
}

/// Basic-auth credentials for the management routes
#[derive(Clone)]
pub struct ApiConfig {
    pub password: String,
    pub username: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct SpotifyConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_seconds: u64,
    pub token_url: String,
}

impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct BootstrapCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for BootstrapCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapCredentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<set>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<set>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used when no duration has been stored for the instance
    pub default_duration_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Period of the scheduled refresh; 0 disables it
    pub interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_duration_seconds: 30,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 1800, // access tokens live for an hour
        }
    }
}

pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Longest accepted cache TTL (one day)
pub const MAX_CACHE_DURATION_SECONDS: u64 = 86_400;

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match var(key) {
                Some(raw) => raw.parse().map_err(|_| {
                    ConfigError::ValidationError(format!("{key} must be a non-negative integer"))
                }),
                None => Ok(default),
            }
        };

        let server_defaults = ServerConfig::default();

        let config = Config {
            api: ApiConfig {
                password: var("API_PASSWORD").unwrap_or_default(),
                username: var("API_USERNAME").unwrap_or_default(),
            },
            bootstrap: BootstrapCredentials {
                access_token: var("SPOTIFY_ACCESS_TOKEN"),
                refresh_token: var("SPOTIFY_REFRESH_TOKEN"),
            },
            cache: CacheConfig {
                default_duration_seconds: number(
                    "CACHE_DURATION_SECONDS",
                    CacheConfig::default().default_duration_seconds,
                )?,
            },
            refresh: RefreshConfig {
                interval_seconds: number(
                    "REFRESH_INTERVAL_SECONDS",
                    RefreshConfig::default().interval_seconds,
                )?,
            },
            server: ServerConfig {
                bind_address: var("BIND_ADDRESS").unwrap_or(server_defaults.bind_address),
                data_dir: var("DATA_DIR").unwrap_or(server_defaults.data_dir),
            },
            spotify: SpotifyConfig {
                api_url: var("SPOTIFY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                client_id: var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
                client_secret: var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
                timeout_seconds: number("UPSTREAM_TIMEOUT_SECONDS", 10)?,
                token_url: var("SPOTIFY_TOKEN_URL")
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.username.is_empty() || self.api.password.is_empty() {
            return Err(ConfigError::ValidationError(
                "API_USERNAME and API_PASSWORD are required".to_string(),
            ));
        }

        if self.spotify.client_id.is_empty() || self.spotify.client_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are required".to_string(),
            ));
        }

        if self.cache.default_duration_seconds > MAX_CACHE_DURATION_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "CACHE_DURATION_SECONDS must be at most {MAX_CACHE_DURATION_SECONDS}"
            )));
        }

        if self.spotify.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "UPSTREAM_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.bootstrap.refresh_token.is_none() {
            tracing::warn!(
                "SPOTIFY_REFRESH_TOKEN is not set. A coordinator without a stored token \
                 will fail to bootstrap."
            );
        }

        Ok(())
    }

    /// Whether the scheduled refresh task should run.
    pub fn refresh_enabled(&self) -> bool {
        self.refresh.interval_seconds > 0
    }
}
