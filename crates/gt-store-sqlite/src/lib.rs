//! # gt-store-sqlite
//!
//! Durable [`EntityStore`](gt_goal::EntityStore) for Goal Tree, backed by a
//! bundled SQLite.
//!
//! Goal updates are compare-and-swap on the `version` column, and deleting
//! a goal cascades to its subgoals, tasks and memberships through foreign
//! keys.

mod schema;
pub mod store;

pub use store::SqliteStore;
