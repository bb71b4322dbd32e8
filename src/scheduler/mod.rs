pub mod refresh;

pub use refresh::start_refresh_scheduler;
