//! Serialized owner of the account's token and now-playing cache.

mod actor;
mod error;
mod registry;
mod state;

pub use actor::{Coordinator, CoordinatorHandle, CoordinatorSettings};
pub use error::CoordinatorError;
pub use registry::{CoordinatorRegistry, MAIN_TOKEN};
pub use state::CoordinatorState;
