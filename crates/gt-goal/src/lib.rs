//! # gt-goal
//!
//! Goal hierarchy records, progress aggregation and membership rules for
//! Goal Tree.
//!
//! Goals form per-user trees. A goal's progress is the mean of its direct
//! subgoals' progress; every write re-aggregates from the changed goal up to
//! its root, and a goal that reaches 100% is marked completed exactly once.
//!
//! ## Key components
//!
//! - [`GoalService`] — the operations exposed to the request layer
//! - [`Aggregator`] — derives one goal's progress and status, committed with
//!   a version check so concurrent sibling updates aren't lost
//! - [`Propagator`] — validates parent assignment (no cycles, same owner) and
//!   walks recomputation upward
//! - [`Hierarchy`] — read-only views: children, descendants, tree, analytics
//! - [`Memberships`] — rosters of shared group goals
//! - [`EntityStore`] — the persistence seam; [`MemoryStore`] is the in-process
//!   implementation, `gt-store-sqlite` the durable one

pub mod aggregate;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod membership;
pub mod model;
pub mod propagate;
pub mod service;
pub mod store;

pub use aggregate::{recompute, Aggregator, Recomputed};
pub use config::{ChildlessProgress, GoalTreeConfig, ProjectPaths};
pub use error::{GoalError, RecordKind, StoreError};
pub use hierarchy::{GoalAnalytics, GoalDetail, GoalTree, Hierarchy};
pub use membership::{MemberAction, MembershipReport, Memberships};
pub use model::{
    Goal, GoalId, GoalStatus, MemberRole, Membership, MembershipId, Priority, Task, TaskId,
    TaskStatus, User, UserId,
};
pub use propagate::{ChangedChild, Propagator};
pub use service::{
    GoalService, GoalUpdate, GroupGoalCreated, NewGoal, NewGroupGoal, NewTask, TaskUpdate,
};
pub use store::{EntityStore, GoalFilter, MemoryStore, ParentFilter, StoreResult};
