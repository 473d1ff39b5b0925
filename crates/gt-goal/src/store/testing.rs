// testing.rs — Store wrappers for exercising failure and race paths.

use crate::model::{Goal, GoalId, Membership, Task, TaskId, User, UserId};
use crate::store::{EntityStore, GoalFilter, MemoryStore, StoreResult};

type UpdateHook = Box<dyn Fn(&MemoryStore, &Goal) -> StoreResult<()> + Send + Sync>;

/// A MemoryStore whose `update_goal` first runs a hook. The hook may fail
/// the write or sneak in concurrent writes through the inner store.
pub struct HookStore {
    pub inner: MemoryStore,
    on_update_goal: UpdateHook,
}

impl HookStore {
    pub fn new(
        inner: MemoryStore,
        hook: impl Fn(&MemoryStore, &Goal) -> StoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            on_update_goal: Box::new(hook),
        }
    }
}

impl EntityStore for HookStore {
    fn insert_user(&self, username: &str) -> StoreResult<User> {
        self.inner.insert_user(username)
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.inner.get_user(id)
    }

    fn insert_goal(&self, goal: Goal) -> StoreResult<Goal> {
        self.inner.insert_goal(goal)
    }

    fn insert_group_goal(&self, goal: Goal) -> StoreResult<(Goal, Membership)> {
        self.inner.insert_group_goal(goal)
    }

    fn get_goal(&self, id: GoalId) -> StoreResult<Option<Goal>> {
        self.inner.get_goal(id)
    }

    fn list_goals(&self, filter: &GoalFilter) -> StoreResult<Vec<Goal>> {
        self.inner.list_goals(filter)
    }

    fn update_goal(&self, goal: &Goal) -> StoreResult<Goal> {
        (self.on_update_goal)(&self.inner, goal)?;
        self.inner.update_goal(goal)
    }

    fn delete_goal(&self, id: GoalId) -> StoreResult<bool> {
        self.inner.delete_goal(id)
    }

    fn insert_task(&self, task: Task) -> StoreResult<Task> {
        self.inner.insert_task(task)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.inner.get_task(id)
    }

    fn list_tasks(&self, goal_id: GoalId) -> StoreResult<Vec<Task>> {
        self.inner.list_tasks(goal_id)
    }

    fn update_task(&self, task: &Task) -> StoreResult<()> {
        self.inner.update_task(task)
    }

    fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        self.inner.delete_task(id)
    }

    fn insert_membership(&self, membership: Membership) -> StoreResult<Membership> {
        self.inner.insert_membership(membership)
    }

    fn get_membership(
        &self,
        goal_id: GoalId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        self.inner.get_membership(goal_id, user_id)
    }

    fn list_memberships(&self, goal_id: GoalId) -> StoreResult<Vec<Membership>> {
        self.inner.list_memberships(goal_id)
    }

    fn delete_memberships(&self, goal_id: GoalId, user_ids: &[UserId]) -> StoreResult<usize> {
        self.inner.delete_memberships(goal_id, user_ids)
    }
}
