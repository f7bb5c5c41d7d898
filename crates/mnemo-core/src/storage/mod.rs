//! Storage Module
//!
//! SQLite-backed storage with:
//! - FTS5 full-text search with query sanitization
//! - Bi-temporal supersession and scope isolation
//! - Typed link graph with Hebbian strengthening
//! - Hot/warm/cold tiering under token budgets
//! - Procedures with outcome-derived confidence
//! - Idempotent, probe-gated schema migrations

mod links;
mod migrations;
mod procedures;
mod scope;
mod store;
mod tiering;

pub use migrations::{apply_migrations, column_exists, Migration, MIGRATIONS};
pub use procedures::{DEFAULT_REINFORCE_PROMOTION_THRESHOLD, DEFAULT_SKILL_READY_SUCCESSES};
pub use store::{new_fact_id, Result, Store, StoreConfig, StoreError};
pub use tiering::{CompactionOptions, CompactionReport};
