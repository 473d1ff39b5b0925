// memory.rs — MemoryStore: an in-process EntityStore.
//
// All tables sit behind one mutex, so every operation is atomic and writes
// to a goal are trivially serialized. The version check in `update_goal`
// still applies: a recompute that read stale children loses its write.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{RecordKind, StoreError};
use crate::model::{
    Goal, GoalId, MemberRole, Membership, MembershipId, Task, TaskId, User, UserId,
};
use crate::store::{EntityStore, GoalFilter, StoreResult};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    goals: BTreeMap<GoalId, Goal>,
    tasks: BTreeMap<TaskId, Task>,
    memberships: BTreeMap<MembershipId, Membership>,
    last_user: i64,
    last_goal: i64,
    last_task: i64,
    last_membership: i64,
}

impl Tables {
    fn sibling_name_taken(&self, goal: &Goal) -> bool {
        self.goals.values().any(|g| {
            g.id != goal.id
                && g.user_id == goal.user_id
                && g.parent_id == goal.parent_id
                && g.name == goal.name
        })
    }

    fn check_goal_refs(&self, goal: &Goal) -> StoreResult<()> {
        if !self.users.contains_key(&goal.user_id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::User,
                id: goal.user_id.0,
            });
        }
        if let Some(parent) = goal.parent_id {
            if !self.goals.contains_key(&parent) {
                return Err(StoreError::MissingRecord {
                    kind: RecordKind::Goal,
                    id: parent.0,
                });
            }
        }
        if self.sibling_name_taken(goal) {
            return Err(StoreError::UniqueViolation(format!(
                "goal named '{}' already exists under the same parent",
                goal.name
            )));
        }
        Ok(())
    }

    fn is_member(&self, goal_id: GoalId, user_id: UserId) -> bool {
        self.memberships
            .values()
            .any(|m| m.goal_id == goal_id && m.user_id == user_id)
    }
}

/// EntityStore kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Backend(format!("memory store lock poisoned: {}", e)))
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl EntityStore for MemoryStore {
    fn insert_user(&self, username: &str) -> StoreResult<User> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.username == username) {
            return Err(StoreError::UniqueViolation(format!(
                "username '{}' is taken",
                username
            )));
        }
        t.last_user += 1;
        let user = User {
            id: UserId(t.last_user),
            username: username.to_string(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn insert_goal(&self, mut goal: Goal) -> StoreResult<Goal> {
        let mut t = self.lock()?;
        t.last_goal += 1;
        goal.id = GoalId(t.last_goal);
        goal.version = 0;
        if let Err(e) = t.check_goal_refs(&goal) {
            t.last_goal -= 1;
            return Err(e);
        }
        t.goals.insert(goal.id, goal.clone());
        Ok(goal)
    }

    fn insert_group_goal(&self, mut goal: Goal) -> StoreResult<(Goal, Membership)> {
        let mut t = self.lock()?;
        goal.is_group_goal = true;
        goal.version = 0;
        goal.id = GoalId(t.last_goal + 1);
        t.check_goal_refs(&goal)?;
        t.last_goal += 1;
        t.goals.insert(goal.id, goal.clone());

        t.last_membership += 1;
        let mut owner = Membership::new(goal.id, goal.user_id, MemberRole::Owner);
        owner.id = MembershipId(t.last_membership);
        t.memberships.insert(owner.id, owner.clone());
        Ok((goal, owner))
    }

    fn get_goal(&self, id: GoalId) -> StoreResult<Option<Goal>> {
        Ok(self.lock()?.goals.get(&id).cloned())
    }

    fn list_goals(&self, filter: &GoalFilter) -> StoreResult<Vec<Goal>> {
        let t = self.lock()?;
        let mut goals: Vec<Goal> = t
            .goals
            .values()
            .filter(|g| filter.matches(g, |goal, user| t.is_member(goal, user)))
            .cloned()
            .collect();
        newest_first(&mut goals, |g| (g.created_at, g.id.0));
        Ok(goals)
    }

    fn update_goal(&self, goal: &Goal) -> StoreResult<Goal> {
        let mut t = self.lock()?;
        let stored_version = match t.goals.get(&goal.id) {
            Some(stored) => stored.version,
            None => {
                return Err(StoreError::MissingRecord {
                    kind: RecordKind::Goal,
                    id: goal.id.0,
                })
            }
        };
        if stored_version != goal.version {
            return Err(StoreError::StaleVersion {
                id: goal.id,
                expected: goal.version,
            });
        }
        t.check_goal_refs(goal)?;
        let mut saved = goal.clone();
        saved.version += 1;
        t.goals.insert(saved.id, saved.clone());
        Ok(saved)
    }

    fn delete_goal(&self, id: GoalId) -> StoreResult<bool> {
        let mut t = self.lock()?;
        if !t.goals.contains_key(&id) {
            return Ok(false);
        }

        // Collect the whole subtree before removing anything.
        let mut doomed = BTreeSet::from([id]);
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for g in t.goals.values() {
                if g.parent_id == Some(current) && doomed.insert(g.id) {
                    frontier.push(g.id);
                }
            }
        }

        t.goals.retain(|gid, _| !doomed.contains(gid));
        t.tasks.retain(|_, task| !doomed.contains(&task.goal_id));
        t.memberships.retain(|_, m| !doomed.contains(&m.goal_id));
        Ok(true)
    }

    fn insert_task(&self, mut task: Task) -> StoreResult<Task> {
        let mut t = self.lock()?;
        if !t.goals.contains_key(&task.goal_id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::Goal,
                id: task.goal_id.0,
            });
        }
        t.last_task += 1;
        task.id = TaskId(t.last_task);
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    fn list_tasks(&self, goal_id: GoalId) -> StoreResult<Vec<Task>> {
        let t = self.lock()?;
        let mut tasks: Vec<Task> = t
            .tasks
            .values()
            .filter(|task| task.goal_id == goal_id)
            .cloned()
            .collect();
        newest_first(&mut tasks, |task| (task.created_at, task.id.0));
        Ok(tasks)
    }

    fn update_task(&self, task: &Task) -> StoreResult<()> {
        let mut t = self.lock()?;
        if !t.tasks.contains_key(&task.id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::Task,
                id: task.id.0,
            });
        }
        if !t.goals.contains_key(&task.goal_id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::Goal,
                id: task.goal_id.0,
            });
        }
        t.tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        Ok(self.lock()?.tasks.remove(&id).is_some())
    }

    fn insert_membership(&self, mut membership: Membership) -> StoreResult<Membership> {
        let mut t = self.lock()?;
        if !t.goals.contains_key(&membership.goal_id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::Goal,
                id: membership.goal_id.0,
            });
        }
        if !t.users.contains_key(&membership.user_id) {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::User,
                id: membership.user_id.0,
            });
        }
        if t.is_member(membership.goal_id, membership.user_id) {
            return Err(StoreError::UniqueViolation(format!(
                "user {} already belongs to goal {}",
                membership.user_id, membership.goal_id
            )));
        }
        t.last_membership += 1;
        membership.id = MembershipId(t.last_membership);
        t.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    fn get_membership(
        &self,
        goal_id: GoalId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .lock()?
            .memberships
            .values()
            .find(|m| m.goal_id == goal_id && m.user_id == user_id)
            .cloned())
    }

    fn list_memberships(&self, goal_id: GoalId) -> StoreResult<Vec<Membership>> {
        let t = self.lock()?;
        let mut members: Vec<Membership> = t
            .memberships
            .values()
            .filter(|m| m.goal_id == goal_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(members)
    }

    fn delete_memberships(&self, goal_id: GoalId, user_ids: &[UserId]) -> StoreResult<usize> {
        let mut t = self.lock()?;
        let before = t.memberships.len();
        t.memberships
            .retain(|_, m| !(m.goal_id == goal_id && user_ids.contains(&m.user_id)));
        Ok(before - t.memberships.len())
    }
}
