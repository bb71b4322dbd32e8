pub mod db;
pub mod models;
mod state;
mod tables;

pub use db::{Database, DatabaseError};
pub use models::StoredState;
pub use tables::*;
