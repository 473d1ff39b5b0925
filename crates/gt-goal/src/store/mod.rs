// store — EntityStore trait: the durable record store the engine runs on.
//
// The engine never caches goal state; every recompute reads through this
// trait. Backends must serialize writes to a single goal row, which the
// trait expresses as a compare-and-swap on `Goal::version`.
//
// `MemoryStore` is the in-process implementation used by tests and
// embedders; the relational implementation lives in `gt-store-sqlite`.

mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::{Goal, GoalId, Membership, Task, TaskId, User, UserId};

pub type StoreResult<T> = Result<T, StoreError>;

/// Which goals a scan should return, by parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    /// Goals without a parent.
    Root,
    /// Direct subgoals of the given goal.
    ChildOf(GoalId),
}

/// Filter for goal scans. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalFilter {
    pub user_id: Option<UserId>,
    pub parent: ParentFilter,
    pub is_group_goal: Option<bool>,
    /// Only goals on which this user holds a membership.
    pub member: Option<UserId>,
}

impl GoalFilter {
    pub fn children_of(goal_id: GoalId) -> Self {
        Self {
            parent: ParentFilter::ChildOf(goal_id),
            ..Self::default()
        }
    }

    pub fn roots_of(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            parent: ParentFilter::Root,
            ..Self::default()
        }
    }

    /// Goals of `user_id` sharing the given parent (siblings of a new goal).
    pub fn siblings(user_id: UserId, parent_id: Option<GoalId>) -> Self {
        Self {
            user_id: Some(user_id),
            parent: match parent_id {
                Some(id) => ParentFilter::ChildOf(id),
                None => ParentFilter::Root,
            },
            ..Self::default()
        }
    }

    pub fn group_goals_of(member: UserId) -> Self {
        Self {
            is_group_goal: Some(true),
            member: Some(member),
            ..Self::default()
        }
    }

    /// Evaluate the filter against a goal. `is_member` answers the
    /// membership condition for backends that check it in memory.
    pub fn matches(&self, goal: &Goal, is_member: impl Fn(GoalId, UserId) -> bool) -> bool {
        if self.user_id.is_some_and(|u| goal.user_id != u) {
            return false;
        }
        let parent_ok = match self.parent {
            ParentFilter::Any => true,
            ParentFilter::Root => goal.parent_id.is_none(),
            ParentFilter::ChildOf(p) => goal.parent_id == Some(p),
        };
        if !parent_ok {
            return false;
        }
        if self.is_group_goal.is_some_and(|g| goal.is_group_goal != g) {
            return false;
        }
        match self.member {
            Some(user) => is_member(goal.id, user),
            None => true,
        }
    }
}

/// Durable keyed storage for goals, tasks, memberships and users.
///
/// Listings are ordered newest first (`created_at` descending, ties broken by
/// id descending), except memberships which are listed in join order.
///
/// Implementations must be shareable across request threads; the service
/// holds them as `Arc<dyn EntityStore>`.
pub trait EntityStore: Send + Sync {
    // Users

    /// Register a user. Usernames are unique.
    fn insert_user(&self, username: &str) -> StoreResult<User>;

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    // Goals

    /// Insert a goal and return it with its assigned id and version 0.
    fn insert_goal(&self, goal: Goal) -> StoreResult<Goal>;

    /// Insert a group goal together with its owner membership, atomically.
    /// Either both records are stored or neither is.
    fn insert_group_goal(&self, goal: Goal) -> StoreResult<(Goal, Membership)>;

    fn get_goal(&self, id: GoalId) -> StoreResult<Option<Goal>>;

    fn list_goals(&self, filter: &GoalFilter) -> StoreResult<Vec<Goal>>;

    /// Overwrite a goal if its stored version still equals `goal.version`.
    ///
    /// Returns the stored goal with the bumped version. Fails with
    /// `StaleVersion` if another writer got there first, or `MissingRecord`
    /// if the goal is gone.
    fn update_goal(&self, goal: &Goal) -> StoreResult<Goal>;

    /// Delete a goal together with its subgoals, tasks and memberships.
    /// Returns false if it did not exist.
    fn delete_goal(&self, id: GoalId) -> StoreResult<bool>;

    // Tasks

    fn insert_task(&self, task: Task) -> StoreResult<Task>;

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// Tasks attached directly to a goal.
    fn list_tasks(&self, goal_id: GoalId) -> StoreResult<Vec<Task>>;

    fn update_task(&self, task: &Task) -> StoreResult<()>;

    fn delete_task(&self, id: TaskId) -> StoreResult<bool>;

    // Memberships

    /// Insert a membership. Fails with `UniqueViolation` if the user already
    /// holds a role on the goal.
    fn insert_membership(&self, membership: Membership) -> StoreResult<Membership>;

    fn get_membership(&self, goal_id: GoalId, user_id: UserId)
        -> StoreResult<Option<Membership>>;

    fn list_memberships(&self, goal_id: GoalId) -> StoreResult<Vec<Membership>>;

    /// Delete the memberships of `user_ids` on a goal, whatever their role.
    /// Returns how many were removed.
    fn delete_memberships(&self, goal_id: GoalId, user_ids: &[UserId]) -> StoreResult<usize>;
}
