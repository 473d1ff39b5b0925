// service.rs — GoalService: the operations the request layer calls.
//
// Every write follows the same shape:
//   1. Load and check: existence, ownership, attribute validation, parent
//      cycle/ownership, sibling-name uniqueness. Nothing is written if any
//      check fails.
//   2. Commit the changed record.
//   3. Propagate: re-aggregate from the affected goal up to its root.
//
// Step 3 runs synchronously, so when a call returns every ancestor already
// reflects the change. If the store fails during step 3 the error is
// returned and the levels already committed stay as they are; the next
// mutation in that subtree recomputes them again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GoalTreeConfig;
use crate::error::{GoalError, RecordKind};
use crate::hierarchy::{GoalAnalytics, GoalDetail, GoalTree, Hierarchy};
use crate::membership::{MemberAction, MembershipReport, Memberships};
use crate::model::{
    Goal, GoalId, GoalStatus, MemberRole, Membership, Priority, Task, TaskId, TaskStatus, User,
    UserId,
};
use crate::propagate::{ChangedChild, Propagator};
use crate::store::{EntityStore, GoalFilter};

/// Attributes of a goal to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGoal {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<GoalId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl NewGoal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent_id: GoalId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Changes to an existing goal. `None` leaves a field alone; for optional
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<GoalId>>,
    pub status: Option<GoalStatus>,
    pub priority: Option<Priority>,
    /// Kept only on goals without subgoals; otherwise re-derived.
    pub progress: Option<f64>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

impl GoalUpdate {
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }
}

/// Attributes of a task to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Minutes; the configured default when absent.
    #[serde(default)]
    pub estimated_time: Option<u32>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Changes to an existing task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub is_recurring: Option<bool>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub estimated_time: Option<u32>,
    /// Move the task under another goal of the same owner.
    pub goal_id: Option<GoalId>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Attributes of a group goal to create. Group goals are always roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroupGoal {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

/// Result of creating a group goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupGoalCreated {
    pub goal: Goal,
    pub members: MembershipReport,
}

/// Entry point for the request layer.
///
/// Cheap to clone and safe to share between request threads; all state
/// lives in the store.
#[derive(Clone)]
pub struct GoalService {
    store: Arc<dyn EntityStore>,
    config: GoalTreeConfig,
}

impl GoalService {
    pub fn new(store: Arc<dyn EntityStore>, config: GoalTreeConfig) -> Self {
        Self { store, config }
    }

    fn propagator(&self) -> Propagator<'_> {
        Propagator::new(&*self.store, &self.config)
    }

    fn hierarchy(&self) -> Hierarchy<'_> {
        Hierarchy::new(&*self.store)
    }

    fn memberships(&self) -> Memberships<'_> {
        Memberships::new(&*self.store)
    }

    // Users

    pub fn create_user(&self, username: &str) -> Result<User, GoalError> {
        if username.trim().is_empty() {
            return Err(GoalError::validation("username", "must not be empty"));
        }
        let user = self.store.insert_user(username.trim())?;
        tracing::info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    fn require_user(&self, user_id: UserId) -> Result<User, GoalError> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::User, user_id))
    }

    // Goals

    pub fn get_goal(&self, goal_id: GoalId) -> Result<Goal, GoalError> {
        self.store
            .get_goal(goal_id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::Goal, goal_id))
    }

    fn owned_goal(&self, actor: UserId, goal_id: GoalId) -> Result<Goal, GoalError> {
        let goal = self.get_goal(goal_id)?;
        if goal.user_id != actor {
            return Err(GoalError::Ownership(format!(
                "goal {} is not owned by user {}",
                goal_id, actor
            )));
        }
        Ok(goal)
    }

    fn ensure_unique_name(&self, goal: &Goal) -> Result<(), GoalError> {
        let taken = self
            .store
            .list_goals(&GoalFilter::siblings(goal.user_id, goal.parent_id))?
            .iter()
            .any(|g| g.id != goal.id && g.name == goal.name);
        if taken {
            return Err(GoalError::Conflict(format!(
                "a goal named '{}' already exists at this level",
                goal.name
            )));
        }
        Ok(())
    }

    /// Create a goal owned by `actor`, optionally under one of their goals.
    pub fn create_goal(&self, actor: UserId, new: NewGoal) -> Result<Goal, GoalError> {
        self.require_user(actor)?;

        let mut goal = Goal::new(actor, new.name);
        goal.description = new.description;
        goal.parent_id = new.parent_id;
        goal.priority = new.priority;
        goal.deadline = new.deadline;
        goal.validate()?;

        if let Some(parent_id) = goal.parent_id {
            self.propagator().validate_parent(None, actor, parent_id)?;
        }
        self.ensure_unique_name(&goal)?;

        let goal = self.store.insert_goal(goal)?;
        tracing::info!(goal_id = %goal.id, user_id = %actor, parent = ?goal.parent_id, "created goal");

        self.propagator().propagate_from(goal.id)?;
        self.get_goal(goal.id)
    }

    /// Edit a goal owned by `actor` and re-aggregate its ancestors.
    pub fn update_goal(
        &self,
        actor: UserId,
        goal_id: GoalId,
        update: GoalUpdate,
    ) -> Result<Goal, GoalError> {
        let current = self.owned_goal(actor, goal_id)?;
        let mut goal = current.clone();
        let now = Utc::now();

        if let Some(name) = update.name {
            goal.name = name;
        }
        if let Some(description) = update.description {
            goal.description = description;
        }
        if let Some(priority) = update.priority {
            goal.priority = priority;
        }
        if let Some(deadline) = update.deadline {
            goal.deadline = deadline;
        }
        if let Some(status) = update.status {
            goal.status = status;
            if status == GoalStatus::Completed && goal.completed_at.is_none() {
                goal.completed_at = Some(now);
            }
        }
        if let Some(progress) = update.progress {
            // On a goal with subgoals the recompute below replaces it.
            goal.progress = progress;
        }
        if let Some(parent_id) = update.parent_id {
            if let Some(parent_id) = parent_id {
                if goal.is_group_goal {
                    return Err(GoalError::validation(
                        "parent",
                        "group goals are always roots",
                    ));
                }
                self.propagator()
                    .validate_parent(Some(goal_id), goal.user_id, parent_id)?;
            }
            goal.parent_id = parent_id;
        }

        goal.validate()?;
        if goal.name != current.name || goal.parent_id != current.parent_id {
            self.ensure_unique_name(&goal)?;
        }

        goal.updated_at = now;
        self.store.update_goal(&goal)?;
        tracing::info!(goal_id = %goal_id, "updated goal");

        let propagator = self.propagator();
        propagator.propagate_from(goal_id)?;
        if current.parent_id != goal.parent_id {
            if let Some(old_parent) = current.parent_id {
                propagator.propagate_from(old_parent)?;
            }
        }
        self.get_goal(goal_id)
    }

    /// Delete a goal and everything beneath it, then re-aggregate what
    /// remains of its ancestor chain.
    pub fn delete_goal(&self, actor: UserId, goal_id: GoalId) -> Result<(), GoalError> {
        let goal = self.owned_goal(actor, goal_id)?;
        if !self.store.delete_goal(goal_id)? {
            return Err(GoalError::not_found(RecordKind::Goal, goal_id));
        }
        tracing::info!(goal_id = %goal_id, "deleted goal and its subtree");

        if let Some(parent_id) = goal.parent_id {
            self.propagator().propagate_from(parent_id)?;
        }
        Ok(())
    }

    pub fn goal_detail(&self, goal_id: GoalId) -> Result<GoalDetail, GoalError> {
        self.hierarchy().detail(goal_id)
    }

    pub fn root_goals(&self, user_id: UserId) -> Result<Vec<Goal>, GoalError> {
        self.hierarchy().root_goals(user_id)
    }

    pub fn children(&self, goal_id: GoalId) -> Result<Vec<Goal>, GoalError> {
        self.hierarchy().immediate_children(goal_id)
    }

    pub fn descendants(&self, goal_id: GoalId) -> Result<Vec<Goal>, GoalError> {
        self.hierarchy().all_descendants(goal_id)
    }

    pub fn tree_view(&self, goal_id: GoalId) -> Result<GoalTree, GoalError> {
        self.hierarchy().tree_view(goal_id)
    }

    pub fn analytics(&self, goal_id: GoalId) -> Result<GoalAnalytics, GoalError> {
        self.hierarchy().analytics(goal_id)
    }

    // Tasks

    pub fn get_task(&self, task_id: TaskId) -> Result<Task, GoalError> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::Task, task_id))
    }

    pub fn list_tasks(&self, goal_id: GoalId) -> Result<Vec<Task>, GoalError> {
        self.get_goal(goal_id)?;
        Ok(self.store.list_tasks(goal_id)?)
    }

    fn task_goal(&self, actor: UserId, goal_id: GoalId) -> Result<Goal, GoalError> {
        self.owned_goal(actor, goal_id).map_err(|e| match e {
            GoalError::Ownership(_) => GoalError::Ownership(format!(
                "tasks can only be attached to your own goals (goal {})",
                goal_id
            )),
            other => other,
        })
    }

    /// Attach a task to one of `actor`'s goals.
    pub fn create_task(
        &self,
        actor: UserId,
        goal_id: GoalId,
        new: NewTask,
    ) -> Result<Task, GoalError> {
        self.task_goal(actor, goal_id)?;

        let mut task = Task::new(goal_id, new.title);
        task.description = new.description;
        task.is_recurring = new.is_recurring;
        task.due_date = new.due_date;
        task.estimated_time = new
            .estimated_time
            .unwrap_or(self.config.tasks.default_estimated_time);
        task.validate()?;

        let task = self.store.insert_task(task)?;
        tracing::info!(task_id = %task.id, goal_id = %goal_id, "created task");

        self.propagator().on_child_changed(ChangedChild::Task(&task))?;
        Ok(task)
    }

    pub fn update_task(
        &self,
        actor: UserId,
        task_id: TaskId,
        update: TaskUpdate,
    ) -> Result<Task, GoalError> {
        let current = self.get_task(task_id)?;
        self.task_goal(actor, current.goal_id)?;
        let mut task = current.clone();
        let now = Utc::now();

        if let Some(goal_id) = update.goal_id {
            self.task_goal(actor, goal_id)?;
            task.goal_id = goal_id;
        }
        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(is_recurring) = update.is_recurring {
            task.is_recurring = is_recurring;
        }
        if let Some(due_date) = update.due_date {
            task.due_date = due_date;
        }
        if let Some(estimated_time) = update.estimated_time {
            task.estimated_time = estimated_time;
        }
        if let Some(status) = update.status {
            task.set_status(status, now);
        }
        task.validate()?;

        task.updated_at = now;
        self.store.update_task(&task)?;
        tracing::info!(task_id = %task_id, status = %task.status, "updated task");

        let propagator = self.propagator();
        propagator.on_child_changed(ChangedChild::Task(&task))?;
        if current.goal_id != task.goal_id {
            propagator.on_child_changed(ChangedChild::Task(&current))?;
        }
        Ok(task)
    }

    pub fn delete_task(&self, actor: UserId, task_id: TaskId) -> Result<(), GoalError> {
        let task = self.get_task(task_id)?;
        self.task_goal(actor, task.goal_id)?;
        if !self.store.delete_task(task_id)? {
            return Err(GoalError::not_found(RecordKind::Task, task_id));
        }
        tracing::info!(task_id = %task_id, "deleted task");

        self.propagator().on_child_changed(ChangedChild::Task(&task))?;
        Ok(())
    }

    // Group goals

    /// Create a group goal owned by `actor`. Unknown member ids are skipped
    /// and listed in the report.
    pub fn create_group_goal(
        &self,
        actor: UserId,
        new: NewGroupGoal,
    ) -> Result<GroupGoalCreated, GoalError> {
        self.require_user(actor)?;

        let mut goal = Goal::new(actor, new.name);
        goal.description = new.description;
        goal.priority = new.priority;
        goal.deadline = new.deadline;
        goal.is_group_goal = true;
        goal.validate()?;
        self.ensure_unique_name(&goal)?;

        let (goal, members) = self
            .memberships()
            .create_group_goal(goal, &new.member_ids)?;
        Ok(GroupGoalCreated { goal, members })
    }

    /// Add or remove members. Only the owner or an admin may change the
    /// roster, and the owner is never removed.
    pub fn update_members(
        &self,
        actor: UserId,
        goal_id: GoalId,
        action: MemberAction,
        user_ids: &[UserId],
    ) -> Result<MembershipReport, GoalError> {
        let memberships = self.memberships();
        match memberships.role_of(goal_id, actor)? {
            Some(MemberRole::Owner) | Some(MemberRole::Admin) => {}
            _ => {
                self.get_goal(goal_id)?;
                return Err(GoalError::Ownership(format!(
                    "user {} can't manage members of goal {}",
                    actor, goal_id
                )));
            }
        }
        memberships.update_members(goal_id, action, user_ids)
    }

    pub fn members(&self, goal_id: GoalId) -> Result<Vec<Membership>, GoalError> {
        self.get_goal(goal_id)?;
        self.memberships().members(goal_id)
    }

    pub fn group_goals_for(&self, user_id: UserId) -> Result<Vec<Goal>, GoalError> {
        self.memberships().group_goals_for(user_id)
    }
}
