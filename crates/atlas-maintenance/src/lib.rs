//! Story-order maintenance for History Atlas.
//!
//! The bulk backfill driver places every unordered tag instance, either on
//! one connection or across a pool of workers that each own a connection.
//! The fix, reset and verify operations cover the rest of the story-order
//! lifecycle. Everything here is generic over
//! [`atlas_core::store::StoryOrdering`]; [`SqliteConnect`] plugs in the
//! SQLite backend.

pub mod backfill;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod report;

pub use backfill::{BackfillOptions, Concurrency, Connect, backfill};
pub use config::{MaintenanceConfig, SqliteConnect};
pub use error::Error;
pub use report::{Report, TagFailure, VerifyReport};

#[cfg(test)]
mod tests;
