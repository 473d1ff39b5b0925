// hierarchy.rs — Hierarchy Walker: read-only views over a goal's subtree.
//
// Every view is computed fresh from the store on each call. Views that go
// out to clients (tree, analytics, detail) are deliberately one level deep;
// callers that need more walk the children themselves.

use serde::{Deserialize, Serialize};

use crate::error::{GoalError, RecordKind};
use crate::model::{Goal, GoalId, GoalStatus, Membership, Task, UserId};
use crate::store::{EntityStore, GoalFilter};

/// One-level adjacency view of a goal, for tree widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTree {
    pub id: GoalId,
    pub name: String,
    pub children: Vec<TreeChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeChild {
    pub goal_id: GoalId,
    pub subgoal_name: String,
}

/// One-level progress breakdown of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAnalytics {
    pub id: GoalId,
    pub name: String,
    pub progress: f64,
    pub immediate_children: Vec<ChildBreakdown>,
    /// Sum of estimated minutes over tasks attached directly to the goal.
    pub total_time_spent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildBreakdown {
    pub goal_id: GoalId,
    pub name: String,
    pub progress: f64,
    pub status: GoalStatus,
}

/// A goal with its immediate relations, as shown on a detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDetail {
    #[serde(flatten)]
    pub goal: Goal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    pub subgoals: Vec<Goal>,
    pub tasks: Vec<Task>,
    pub group_members: Vec<Membership>,
}

pub struct Hierarchy<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> Hierarchy<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    fn goal(&self, id: GoalId) -> Result<Goal, GoalError> {
        self.store
            .get_goal(id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::Goal, id))
    }

    /// Direct subgoals, newest first.
    pub fn immediate_children(&self, goal_id: GoalId) -> Result<Vec<Goal>, GoalError> {
        self.goal(goal_id)?;
        Ok(self.store.list_goals(&GoalFilter::children_of(goal_id))?)
    }

    pub fn has_children(&self, goal_id: GoalId) -> Result<bool, GoalError> {
        Ok(!self.immediate_children(goal_id)?.is_empty())
    }

    /// Every goal below `goal_id`, pre-order: each goal comes before its own
    /// subgoals, and siblings keep the newest-first listing order.
    pub fn all_descendants(&self, goal_id: GoalId) -> Result<Vec<Goal>, GoalError> {
        let mut out = Vec::new();
        let mut stack = self.immediate_children(goal_id)?;
        stack.reverse();
        while let Some(goal) = stack.pop() {
            let mut children = self.store.list_goals(&GoalFilter::children_of(goal.id))?;
            children.reverse();
            stack.extend(children);
            out.push(goal);
        }
        Ok(out)
    }

    pub fn tree_view(&self, goal_id: GoalId) -> Result<GoalTree, GoalError> {
        let goal = self.goal(goal_id)?;
        let children = self
            .store
            .list_goals(&GoalFilter::children_of(goal_id))?
            .into_iter()
            .map(|child| TreeChild {
                goal_id: child.id,
                subgoal_name: child.name,
            })
            .collect();
        Ok(GoalTree {
            id: goal.id,
            name: goal.name,
            children,
        })
    }

    /// Goals of `user_id` without a parent, newest first.
    pub fn root_goals(&self, user_id: UserId) -> Result<Vec<Goal>, GoalError> {
        Ok(self.store.list_goals(&GoalFilter::roots_of(user_id))?)
    }

    /// Progress of the goal and each immediate child, plus the estimated time
    /// of the goal's own tasks. Tasks of subgoals are not counted.
    pub fn analytics(&self, goal_id: GoalId) -> Result<GoalAnalytics, GoalError> {
        let goal = self.goal(goal_id)?;
        let immediate_children = self
            .store
            .list_goals(&GoalFilter::children_of(goal_id))?
            .into_iter()
            .map(|child| ChildBreakdown {
                goal_id: child.id,
                name: child.name,
                progress: child.progress,
                status: child.status,
            })
            .collect();
        let total_time_spent = self
            .store
            .list_tasks(goal_id)?
            .iter()
            .map(|t| u64::from(t.estimated_time))
            .sum();
        Ok(GoalAnalytics {
            id: goal.id,
            name: goal.name,
            progress: goal.progress,
            immediate_children,
            total_time_spent,
        })
    }

    pub fn detail(&self, goal_id: GoalId) -> Result<GoalDetail, GoalError> {
        let goal = self.goal(goal_id)?;
        let parent_name = match goal.parent_id {
            Some(parent) => self.store.get_goal(parent)?.map(|p| p.name),
            None => None,
        };
        let subgoals = self.store.list_goals(&GoalFilter::children_of(goal_id))?;
        let tasks = self.store.list_tasks(goal_id)?;
        let group_members = self.store.list_memberships(goal_id)?;
        Ok(GoalDetail {
            goal,
            parent_name,
            subgoals,
            tasks,
            group_members,
        })
    }
}
