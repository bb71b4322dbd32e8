mod health;
mod playing;
mod token;

pub use health::health;
pub use playing::playing;
pub use token::{get_token, purge_cache, refresh_token, set_cache, TokenStateResponse};
