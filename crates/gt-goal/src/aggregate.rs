// aggregate.rs — Progress Aggregator: derive a goal's progress and status.
//
// Rules:
//   - A goal with subgoals has progress = plain mean of its immediate
//     subgoals' stored progress. Its own tasks are ignored.
//   - A goal without subgoals follows the configured ChildlessProgress
//     policy (user-set value, or completed-task ratio).
//   - Reaching 100 flips status to Completed and stamps completed_at, once.
//     Nothing is ever un-completed automatically.
//
// `recompute` is pure. `Aggregator::commit` reads the goal and its children
// from the store and persists the result with a versioned write, retrying
// from fresh reads if another writer committed the goal in between.

use chrono::{DateTime, Utc};

use crate::config::{AggregationConfig, ChildlessProgress};
use crate::error::{GoalError, RecordKind, StoreError};
use crate::model::{Goal, GoalId, GoalStatus, Task, TaskStatus};
use crate::store::{EntityStore, GoalFilter};

/// Outcome of one recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct Recomputed {
    pub progress: f64,
    pub status: GoalStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Recomputed {
    /// True if this is the recompute that completed the goal.
    pub fn completes(&self, before: &Goal) -> bool {
        self.status == GoalStatus::Completed && before.status != GoalStatus::Completed
    }

    pub fn apply_to(&self, goal: &mut Goal) {
        goal.progress = self.progress;
        goal.status = self.status;
        goal.completed_at = self.completed_at;
    }
}

/// Compute a goal's progress and status from its children.
pub fn recompute(
    goal: &Goal,
    subgoals: &[Goal],
    tasks: &[Task],
    policy: ChildlessProgress,
    now: DateTime<Utc>,
) -> Recomputed {
    let progress = if subgoals.is_empty() {
        childless_progress(goal, tasks, policy)
    } else {
        subgoals.iter().map(|g| g.progress).sum::<f64>() / subgoals.len() as f64
    }
    .clamp(0.0, 100.0);

    let mut status = goal.status;
    let mut completed_at = goal.completed_at;
    if progress >= 100.0 && status != GoalStatus::Completed {
        status = GoalStatus::Completed;
        completed_at = Some(completed_at.unwrap_or(now));
    }

    Recomputed {
        progress,
        status,
        completed_at,
    }
}

fn childless_progress(goal: &Goal, tasks: &[Task], policy: ChildlessProgress) -> f64 {
    match policy {
        ChildlessProgress::Manual => goal.progress,
        ChildlessProgress::TaskRatio => {
            let counted = tasks
                .iter()
                .filter(|t| t.status != TaskStatus::Cancelled)
                .count();
            if counted == 0 {
                return goal.progress;
            }
            let done = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();
            100.0 * done as f64 / counted as f64
        }
    }
}

/// Reads, recomputes and persists goals through an EntityStore.
pub struct Aggregator<'a> {
    store: &'a dyn EntityStore,
    config: &'a AggregationConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn EntityStore, config: &'a AggregationConfig) -> Self {
        Self { store, config }
    }

    /// Recompute one goal from the current stored state and persist it.
    ///
    /// The goal row (and its version) is read before its children, so a
    /// write based on children read before a concurrent sibling commit is
    /// rejected by the version check and redone.
    pub fn commit(&self, goal_id: GoalId) -> Result<Goal, GoalError> {
        let mut attempt = 0;
        loop {
            let goal = self
                .store
                .get_goal(goal_id)?
                .ok_or_else(|| GoalError::not_found(RecordKind::Goal, goal_id))?;
            let subgoals = self.store.list_goals(&GoalFilter::children_of(goal_id))?;
            let tasks = if subgoals.is_empty()
                && self.config.childless_progress == ChildlessProgress::TaskRatio
            {
                self.store.list_tasks(goal_id)?
            } else {
                Vec::new()
            };

            let now = Utc::now();
            let result = recompute(
                &goal,
                &subgoals,
                &tasks,
                self.config.childless_progress,
                now,
            );
            tracing::debug!(
                goal_id = %goal_id,
                subgoals = subgoals.len(),
                progress = result.progress,
                "recomputed goal progress"
            );

            let mut updated = goal.clone();
            result.apply_to(&mut updated);
            updated.updated_at = now;

            match self.store.update_goal(&updated) {
                Ok(saved) => {
                    if result.completes(&goal) {
                        tracing::info!(goal_id = %goal_id, name = %saved.name, "goal completed");
                    }
                    return Ok(saved);
                }
                Err(StoreError::StaleVersion { .. }) if attempt < self.config.max_commit_retries => {
                    attempt += 1;
                    tracing::warn!(
                        goal_id = %goal_id,
                        attempt,
                        "goal changed during recompute, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::store::testing::HookStore;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn goal_with_progress(progress: f64) -> Goal {
        let mut g = Goal::new(UserId(1), "g");
        g.progress = progress;
        g
    }

    fn task_with_status(status: TaskStatus) -> Task {
        let mut t = Task::new(GoalId(1), "t");
        t.status = status;
        t
    }

    #[test]
    fn mean_of_subgoals_ignores_order_and_tasks() {
        let parent = goal_with_progress(10.0);
        let subgoals = vec![
            goal_with_progress(20.0),
            goal_with_progress(50.0),
            goal_with_progress(80.0),
        ];
        let tasks = vec![task_with_status(TaskStatus::Completed)];
        let now = Utc::now();

        let forward = recompute(&parent, &subgoals, &tasks, ChildlessProgress::TaskRatio, now);
        let mut reversed = subgoals.clone();
        reversed.reverse();
        let backward = recompute(&parent, &reversed, &[], ChildlessProgress::Manual, now);

        assert_eq!(forward.progress, 50.0);
        assert_eq!(backward.progress, 50.0);
    }

    #[test]
    fn mean_is_not_weighted_by_subtree_size() {
        // One subgoal might itself have many descendants; only its own
        // stored progress counts.
        let parent = goal_with_progress(0.0);
        let subgoals = vec![goal_with_progress(100.0), goal_with_progress(0.0)];
        let r = recompute(&parent, &subgoals, &[], ChildlessProgress::Manual, Utc::now());
        assert_eq!(r.progress, 50.0);
        assert_eq!(r.status, GoalStatus::Active);
    }

    #[test]
    fn manual_policy_keeps_stored_progress_despite_completed_tasks() {
        let goal = goal_with_progress(30.0);
        let tasks = vec![
            task_with_status(TaskStatus::Completed),
            task_with_status(TaskStatus::Completed),
        ];
        let r = recompute(&goal, &[], &tasks, ChildlessProgress::Manual, Utc::now());
        assert_eq!(r.progress, 30.0);
        assert_eq!(r.status, GoalStatus::Active);
    }

    #[test]
    fn task_ratio_policy_skips_cancelled_tasks() {
        let goal = goal_with_progress(0.0);
        let tasks = vec![
            task_with_status(TaskStatus::Completed),
            task_with_status(TaskStatus::Pending),
            task_with_status(TaskStatus::InProgress),
            task_with_status(TaskStatus::Completed),
            task_with_status(TaskStatus::Cancelled),
        ];
        let r = recompute(&goal, &[], &tasks, ChildlessProgress::TaskRatio, Utc::now());
        assert_eq!(r.progress, 50.0);
    }

    #[test]
    fn task_ratio_without_countable_tasks_keeps_stored_value() {
        let goal = goal_with_progress(42.0);
        let tasks = vec![task_with_status(TaskStatus::Cancelled)];
        let r = recompute(&goal, &[], &tasks, ChildlessProgress::TaskRatio, Utc::now());
        assert_eq!(r.progress, 42.0);
    }

    #[test]
    fn reaching_100_completes_once() {
        let mut goal = goal_with_progress(100.0);
        let first = Utc::now();
        let r = recompute(&goal, &[], &[], ChildlessProgress::Manual, first);
        assert_eq!(r.status, GoalStatus::Completed);
        assert_eq!(r.completed_at, Some(first));
        assert!(r.completes(&goal));

        r.apply_to(&mut goal);
        let again = recompute(
            &goal,
            &[],
            &[],
            ChildlessProgress::Manual,
            first + Duration::hours(1),
        );
        assert_eq!(again.completed_at, Some(first));
        assert!(!again.completes(&goal));
    }

    #[test]
    fn dropping_below_100_does_not_reopen() {
        let mut goal = goal_with_progress(100.0);
        let stamped = Utc::now();
        goal.status = GoalStatus::Completed;
        goal.completed_at = Some(stamped);

        let subgoals = vec![goal_with_progress(40.0)];
        let r = recompute(&goal, &subgoals, &[], ChildlessProgress::Manual, Utc::now());
        assert_eq!(r.progress, 40.0);
        assert_eq!(r.status, GoalStatus::Completed);
        assert_eq!(r.completed_at, Some(stamped));
    }

    #[test]
    fn paused_goal_still_auto_completes() {
        let mut goal = goal_with_progress(100.0);
        goal.status = GoalStatus::Paused;
        let r = recompute(&goal, &[], &[], ChildlessProgress::Manual, Utc::now());
        assert_eq!(r.status, GoalStatus::Completed);
    }

    #[test]
    fn commit_persists_mean_of_stored_children() {
        let store = MemoryStore::new();
        let user = store.insert_user("u").unwrap().id;
        let parent = store.insert_goal(Goal::new(user, "parent")).unwrap();
        for (name, p) in [("a", 25.0), ("b", 75.0)] {
            let mut g = Goal::new(user, name);
            g.parent_id = Some(parent.id);
            g.progress = p;
            store.insert_goal(g).unwrap();
        }

        let config = AggregationConfig::default();
        let saved = Aggregator::new(&store, &config).commit(parent.id).unwrap();
        assert_eq!(saved.progress, 50.0);
        assert_eq!(store.get_goal(parent.id).unwrap().unwrap().progress, 50.0);
    }

    #[test]
    fn commit_missing_goal_is_not_found() {
        let store = MemoryStore::new();
        let config = AggregationConfig::default();
        let result = Aggregator::new(&store, &config).commit(GoalId(99));
        assert!(matches!(
            result,
            Err(GoalError::NotFound {
                kind: RecordKind::Goal,
                id: 99
            })
        ));
    }

    /// A hook that, before the first versioned write of `parent`, lets
    /// another request finish `sibling` and recompute `parent` itself.
    fn race_once(parent: GoalId, sibling: GoalId) -> HookStore {
        let raced = AtomicBool::new(false);
        HookStore::new(MemoryStore::new(), move |inner, goal| {
            if goal.id == parent && !raced.swap(true, Ordering::SeqCst) {
                let mut s = inner.get_goal(sibling)?.unwrap();
                s.progress = 100.0;
                inner.update_goal(&s)?;
                let mut p = inner.get_goal(parent)?.unwrap();
                p.progress = 100.0;
                inner.update_goal(&p)?;
            }
            Ok(())
        })
    }

    fn seed_pair(store: &dyn EntityStore, first_progress: f64) -> (GoalId, GoalId) {
        let user = store.insert_user("u").unwrap().id;
        let parent = store.insert_goal(Goal::new(user, "parent")).unwrap();
        let mut a = Goal::new(user, "a");
        a.parent_id = Some(parent.id);
        a.progress = first_progress;
        store.insert_goal(a).unwrap();
        let mut b = Goal::new(user, "b");
        b.parent_id = Some(parent.id);
        let b = store.insert_goal(b).unwrap();
        (parent.id, b.id)
    }

    #[test]
    fn stale_write_is_retried_from_fresh_children() {
        // Ids are assigned deterministically: parent 1, a 2, b 3.
        let store = race_once(GoalId(1), GoalId(3));
        let (parent, sibling) = seed_pair(&store, 100.0);
        assert_eq!((parent, sibling), (GoalId(1), GoalId(3)));

        let config = AggregationConfig::default();
        let saved = Aggregator::new(&store, &config).commit(parent).unwrap();

        // The first attempt computed 50 from stale children and lost the
        // version race; the retry saw both siblings at 100.
        assert_eq!(saved.progress, 100.0);
        assert_eq!(saved.status, GoalStatus::Completed);
    }

    #[test]
    fn retries_are_bounded() {
        let store = race_once(GoalId(1), GoalId(3));
        let (parent, _) = seed_pair(&store, 0.0);

        let config = AggregationConfig {
            max_commit_retries: 0,
            ..AggregationConfig::default()
        };
        let result = Aggregator::new(&store, &config).commit(parent);
        assert!(matches!(
            result,
            Err(GoalError::Store(StoreError::StaleVersion { .. }))
        ));
    }
}
