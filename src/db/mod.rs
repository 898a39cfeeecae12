//! Persistence collaborator
//!
//! - **Memory**: no durability, used by default and in tests
//! - **SQLite** (feature `storage-sqlite`): single-file store with migrations

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::Database;
pub use error::{DbError, DbResult};
pub use memory::MemoryDatabase;
