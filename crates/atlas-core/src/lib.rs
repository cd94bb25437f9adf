//! Core types and trait definitions for the History Atlas story backend.
//!
//! No HTTP or database dependencies live here. This crate owns
//! the time comparator, the story-order algorithms (gap insertion, renumbering,
//! dependency ordering), the store traits, and story traversal.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod instance;
pub mod order;
pub mod recent;
pub mod store;
pub mod story;
pub mod tag;
pub mod time;

pub use error::{Error, Result};
