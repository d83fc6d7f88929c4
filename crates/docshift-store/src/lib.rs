//! docshift store - in-memory document store
//!
//! A [`DocumentStore`](docshift_core::DocumentStore) implementation with:
//! - Filter matching over dotted paths with implicit array traversal
//! - `$set` updates with upsert, multi and ordered bulk semantics
//! - Explain plans with execution statistics
//! - JSON file persistence and contract fixtures

#![warn(unreachable_pub)]

pub mod document;
pub mod file;
pub mod fixtures;
pub mod matcher;
pub mod memory;

pub use file::{load_collection, save_collection};
pub use fixtures::{generate_contracts, seed_contracts, DEFAULT_FIXTURE_COUNT};
pub use matcher::matches;
pub use memory::{MemoryStore, StoreStats};
