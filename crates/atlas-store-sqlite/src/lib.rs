//! SQLite backend for the History Atlas story store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every order mutation for a tag runs in
//! one transaction on that thread.

mod encode;
mod ordering;
mod reader;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreConfig};
