// propagate.rs — Propagation Controller: parent validation and upward recompute.
//
// Writes follow a two-step protocol: the caller commits the changed record,
// then asks the controller to re-aggregate from the affected goal up to its
// root. Each level is committed before the next one is read, so a parent
// never reflects children older than the level below it.
//
// Parent assignment is validated before any write by walking the subtree of
// the moved goal and the ancestor chain of the proposed parent. Both walks
// are bounded by the configured maximum depth, so corrupt data can't make
// them loop.

use std::collections::HashSet;

use crate::aggregate::Aggregator;
use crate::config::GoalTreeConfig;
use crate::error::{GoalError, RecordKind};
use crate::model::{Goal, GoalId, Task, UserId};
use crate::store::{EntityStore, GoalFilter};

/// The record whose change should be reflected in its ancestors.
#[derive(Debug, Clone, Copy)]
pub enum ChangedChild<'a> {
    /// A task was created, edited or deleted; its goal is recomputed first.
    Task(&'a Task),
    /// A goal's progress moved; its parent (if any) is recomputed first.
    Subgoal(&'a Goal),
}

impl ChangedChild<'_> {
    /// The first goal to recompute, if any.
    pub fn parent(&self) -> Option<GoalId> {
        match self {
            ChangedChild::Task(task) => Some(task.goal_id),
            ChangedChild::Subgoal(goal) => goal.parent_id,
        }
    }
}

pub struct Propagator<'a> {
    store: &'a dyn EntityStore,
    config: &'a GoalTreeConfig,
}

impl<'a> Propagator<'a> {
    pub fn new(store: &'a dyn EntityStore, config: &'a GoalTreeConfig) -> Self {
        Self { store, config }
    }

    /// Check that `parent_id` may become the parent of a goal owned by
    /// `owner`. `goal_id` is `None` for a goal that doesn't exist yet.
    ///
    /// Returns the parent on success. Nothing is written either way.
    pub fn validate_parent(
        &self,
        goal_id: Option<GoalId>,
        owner: UserId,
        parent_id: GoalId,
    ) -> Result<Goal, GoalError> {
        if goal_id == Some(parent_id) {
            return Err(GoalError::Cycle {
                goal: parent_id,
                parent: parent_id,
            });
        }

        let parent = self
            .store
            .get_goal(parent_id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::Goal, parent_id))?;
        if parent.user_id != owner {
            return Err(GoalError::Ownership(format!(
                "parent goal {} belongs to another user",
                parent_id
            )));
        }

        // A moved goal brings its subtree along; the deepest descendant
        // must still fit under the new parent.
        let max_depth = self.config.hierarchy.max_tree_depth;
        let height = match goal_id {
            Some(id) => self.subtree_height(id, parent_id)?,
            None => 1,
        };

        // Walk parent → root. Meeting the goal itself means the parent is
        // one of its descendants.
        let mut visited = HashSet::new();
        let mut cursor = Some(parent.clone());
        while let Some(ancestor) = cursor {
            if Some(ancestor.id) == goal_id || !visited.insert(ancestor.id) {
                return Err(GoalError::Cycle {
                    goal: goal_id.unwrap_or(ancestor.id),
                    parent: parent_id,
                });
            }
            if visited.len() + height > max_depth {
                return Err(too_deep(max_depth));
            }
            cursor = match ancestor.parent_id {
                Some(next) => Some(
                    self.store
                        .get_goal(next)?
                        .ok_or_else(|| GoalError::not_found(RecordKind::Goal, next))?,
                ),
                None => None,
            };
        }

        Ok(parent)
    }

    /// Number of levels in the subtree rooted at `goal_id`, the goal
    /// included. Finding `parent_id` inside it is a cycle.
    fn subtree_height(&self, goal_id: GoalId, parent_id: GoalId) -> Result<usize, GoalError> {
        let max_depth = self.config.hierarchy.max_tree_depth;
        let mut visited = HashSet::from([goal_id]);
        let mut level = vec![goal_id];
        let mut height = 0;

        while !level.is_empty() {
            height += 1;
            if height > max_depth {
                return Err(too_deep(max_depth));
            }
            let mut next = Vec::new();
            for id in level {
                for child in self.store.list_goals(&GoalFilter::children_of(id))? {
                    if child.id == parent_id {
                        return Err(GoalError::Cycle {
                            goal: goal_id,
                            parent: parent_id,
                        });
                    }
                    if visited.insert(child.id) {
                        next.push(child.id);
                    }
                }
            }
            level = next;
        }
        Ok(height)
    }

    /// Re-aggregate the parent chain of a changed child.
    ///
    /// Returns the ids recomputed, nearest first. A root subgoal change
    /// recomputes nothing.
    pub fn on_child_changed(&self, child: ChangedChild<'_>) -> Result<Vec<GoalId>, GoalError> {
        match child.parent() {
            Some(start) => self.propagate_from(start),
            None => Ok(Vec::new()),
        }
    }

    /// Recompute `start`, then its parent, and so on up to the root.
    ///
    /// Siblings are never touched. A store failure stops the walk; levels
    /// already committed stay committed.
    pub fn propagate_from(&self, start: GoalId) -> Result<Vec<GoalId>, GoalError> {
        let aggregator = Aggregator::new(self.store, &self.config.aggregation);
        let max_depth = self.config.hierarchy.max_tree_depth;
        let mut chain = Vec::new();
        let mut cursor = Some(start);

        while let Some(goal_id) = cursor {
            if chain.contains(&goal_id) {
                return Err(GoalError::Cycle {
                    goal: start,
                    parent: goal_id,
                });
            }
            if chain.len() >= max_depth {
                return Err(too_deep(max_depth));
            }
            let saved = aggregator.commit(goal_id)?;
            chain.push(goal_id);
            cursor = saved.parent_id;
        }

        tracing::debug!(start = %start, levels = chain.len(), "propagated progress");
        Ok(chain)
    }
}

fn too_deep(max_depth: usize) -> GoalError {
    GoalError::validation("parent", format!("goal tree would exceed {} levels", max_depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::GoalStatus;
    use crate::store::testing::HookStore;
    use crate::store::MemoryStore;

    struct Tree {
        user: UserId,
        root: GoalId,
        a: GoalId,
        b: GoalId,
        a1: GoalId,
    }

    // root ─┬─ a ── a1
    //       └─ b
    fn seed(store: &dyn EntityStore) -> Tree {
        let user = store.insert_user("alice").unwrap().id;
        let insert = |name: &str, parent: Option<GoalId>| {
            let mut g = Goal::new(user, name);
            g.parent_id = parent;
            store.insert_goal(g).unwrap().id
        };
        let root = insert("root", None);
        let a = insert("a", Some(root));
        let b = insert("b", Some(root));
        let a1 = insert("a1", Some(a));
        Tree { user, root, a, b, a1 }
    }

    fn set_progress(store: &dyn EntityStore, id: GoalId, progress: f64) -> Goal {
        let mut g = store.get_goal(id).unwrap().unwrap();
        g.progress = progress;
        store.update_goal(&g).unwrap()
    }

    #[test]
    fn parent_cannot_be_self() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let result = Propagator::new(&store, &config).validate_parent(Some(t.a), t.user, t.a);
        assert!(matches!(result, Err(GoalError::Cycle { .. })));
    }

    #[test]
    fn parent_cannot_be_a_descendant() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let p = Propagator::new(&store, &config);

        assert!(matches!(
            p.validate_parent(Some(t.root), t.user, t.a1),
            Err(GoalError::Cycle { goal, parent }) if goal == t.root && parent == t.a1
        ));
        assert!(matches!(
            p.validate_parent(Some(t.a), t.user, t.a1),
            Err(GoalError::Cycle { .. })
        ));
        // Moving a1 under b is fine.
        assert_eq!(p.validate_parent(Some(t.a1), t.user, t.b).unwrap().id, t.b);
    }

    #[test]
    fn parent_must_share_owner() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let bob = store.insert_user("bob").unwrap().id;
        let result = Propagator::new(&store, &config).validate_parent(None, bob, t.root);
        assert!(matches!(result, Err(GoalError::Ownership(_))));
    }

    #[test]
    fn missing_parent_is_not_found() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let result = Propagator::new(&store, &config).validate_parent(None, t.user, GoalId(404));
        assert!(matches!(result, Err(GoalError::NotFound { id: 404, .. })));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let store = MemoryStore::new();
        let mut config = GoalTreeConfig::default();
        config.hierarchy.max_tree_depth = 3;
        let t = seed(&store);
        let p = Propagator::new(&store, &config);
        // a1 already sits three levels deep.
        assert!(p.validate_parent(None, t.user, t.a).is_ok());
        assert!(matches!(
            p.validate_parent(None, t.user, t.a1),
            Err(GoalError::Validation { field: "parent", .. })
        ));
    }

    #[test]
    fn moved_subtree_must_fit_under_new_parent() {
        let store = MemoryStore::new();
        let mut config = GoalTreeConfig::default();
        config.hierarchy.max_tree_depth = 3;
        let t = seed(&store);
        let mut b1 = Goal::new(t.user, "b1");
        b1.parent_id = Some(t.b);
        store.insert_goal(b1).unwrap();
        let p = Propagator::new(&store, &config);

        // b carries b1 along: root > a > b > b1 is four levels.
        assert!(matches!(
            p.validate_parent(Some(t.b), t.user, t.a),
            Err(GoalError::Validation { field: "parent", .. })
        ));
        // A leaf fits at the third level.
        assert!(p.validate_parent(Some(t.a1), t.user, t.b).is_ok());
    }

    #[test]
    fn overdeep_chain_is_not_reported_as_cycle() {
        let store = MemoryStore::new();
        let mut config = GoalTreeConfig::default();
        config.hierarchy.max_tree_depth = 2;
        // Written straight to the store, so nothing checked the depth.
        let t = seed(&store);
        let result = Propagator::new(&store, &config).propagate_from(t.a1);
        assert!(matches!(
            result,
            Err(GoalError::Validation { field: "parent", .. })
        ));
    }

    #[test]
    fn propagation_walks_strictly_upward() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let b_before = store.get_goal(t.b).unwrap().unwrap();

        let a1 = set_progress(&store, t.a1, 100.0);
        let chain = Propagator::new(&store, &config)
            .on_child_changed(ChangedChild::Subgoal(&a1))
            .unwrap();

        assert_eq!(chain, vec![t.a, t.root]);
        let a = store.get_goal(t.a).unwrap().unwrap();
        assert_eq!(a.progress, 100.0);
        assert_eq!(a.status, GoalStatus::Completed);
        assert_eq!(store.get_goal(t.root).unwrap().unwrap().progress, 50.0);
        // The sibling was not rewritten.
        assert_eq!(store.get_goal(t.b).unwrap().unwrap(), b_before);
    }

    #[test]
    fn task_change_starts_at_its_goal() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let task = store.insert_task(Task::new(t.a1, "do it")).unwrap();

        let chain = Propagator::new(&store, &config)
            .on_child_changed(ChangedChild::Task(&task))
            .unwrap();
        assert_eq!(chain, vec![t.a1, t.a, t.root]);
    }

    #[test]
    fn root_subgoal_change_recomputes_nothing() {
        let store = MemoryStore::new();
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let root = store.get_goal(t.root).unwrap().unwrap();
        let chain = Propagator::new(&store, &config)
            .on_child_changed(ChangedChild::Subgoal(&root))
            .unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn store_failure_stops_the_walk_and_keeps_lower_levels() {
        // Ids: root 1, a 2, b 3, a1 4. Writes to root fail.
        let store = HookStore::new(MemoryStore::new(), |_, goal| {
            if goal.id == GoalId(1) {
                Err(StoreError::Backend("disk full".into()))
            } else {
                Ok(())
            }
        });
        let config = GoalTreeConfig::default();
        let t = seed(&store);
        let mut a1 = store.inner.get_goal(t.a1).unwrap().unwrap();
        a1.progress = 100.0;
        let a1 = store.inner.update_goal(&a1).unwrap();

        let result =
            Propagator::new(&store, &config).on_child_changed(ChangedChild::Subgoal(&a1));
        assert!(matches!(result, Err(ref e) if e.is_retryable()));
        assert_eq!(store.get_goal(t.a).unwrap().unwrap().progress, 100.0);
        assert_eq!(store.get_goal(t.root).unwrap().unwrap().progress, 0.0);
    }
}
