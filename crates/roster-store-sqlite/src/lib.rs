//! SQLite backends for Roster: the identity database and a read-only view of
//! the event warehouse.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;
mod warehouse;

pub mod error;

pub use error::{Error, Result};
pub use schema::WAREHOUSE_SCHEMA;
pub use store::SqliteStore;
pub use warehouse::SqliteWarehouse;
