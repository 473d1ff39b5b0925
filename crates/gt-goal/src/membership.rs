// membership.rs — Membership Manager: rosters of group goals.
//
// Invariants:
//   - A user holds at most one role per group goal.
//   - Each group goal has exactly one Owner, the creator, set at creation.
//   - The owner can't be removed here: owners are filtered out of every
//     removal set before the store is asked to delete anything.
//
// Bulk operations are lenient about unknown user ids: they are skipped, not
// errors, and come back in the `MembershipReport` so callers can tell.

use serde::{Deserialize, Serialize};

use crate::error::{GoalError, RecordKind, StoreError};
use crate::model::{Goal, GoalId, MemberRole, Membership, UserId};
use crate::store::{EntityStore, GoalFilter};

/// What a bulk membership change did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipReport {
    /// Users whose membership was created or removed.
    pub applied: Vec<UserId>,
    /// Users left alone: unknown ids, existing members on add, non-members
    /// or the owner on remove.
    pub skipped: Vec<UserId>,
}

/// Roster change requested by `update_members`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAction {
    Add,
    Remove,
}

pub struct Memberships<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> Memberships<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Insert a group goal and seed its roster: the creator as owner, then
    /// each resolvable id in `member_ids` as a member.
    ///
    /// The goal must already be validated; it is stored as a group goal
    /// owned by `goal.user_id`.
    pub fn create_group_goal(
        &self,
        goal: Goal,
        member_ids: &[UserId],
    ) -> Result<(Goal, MembershipReport), GoalError> {
        let (goal, _owner) = self.store.insert_group_goal(goal)?;
        tracing::info!(goal_id = %goal.id, owner = %goal.user_id, "created group goal");

        let report = self.add_members(goal.id, member_ids)?;
        Ok((goal, report))
    }

    /// Apply an add or remove to a group goal's roster.
    pub fn update_members(
        &self,
        goal_id: GoalId,
        action: MemberAction,
        user_ids: &[UserId],
    ) -> Result<MembershipReport, GoalError> {
        let goal = self
            .store
            .get_goal(goal_id)?
            .ok_or_else(|| GoalError::not_found(RecordKind::Goal, goal_id))?;
        if !goal.is_group_goal {
            return Err(GoalError::validation(
                "goal",
                format!("goal {} is not a group goal", goal_id),
            ));
        }
        match action {
            MemberAction::Add => self.add_members(goal_id, user_ids),
            MemberAction::Remove => self.remove_members(goal_id, user_ids),
        }
    }

    /// Group goals on which `user_id` holds any role.
    pub fn group_goals_for(&self, user_id: UserId) -> Result<Vec<Goal>, GoalError> {
        Ok(self.store.list_goals(&GoalFilter::group_goals_of(user_id))?)
    }

    /// The roster in join order.
    pub fn members(&self, goal_id: GoalId) -> Result<Vec<Membership>, GoalError> {
        Ok(self.store.list_memberships(goal_id)?)
    }

    pub fn role_of(&self, goal_id: GoalId, user_id: UserId) -> Result<Option<MemberRole>, GoalError> {
        Ok(self
            .store
            .get_membership(goal_id, user_id)?
            .map(|m| m.role))
    }

    fn add_members(
        &self,
        goal_id: GoalId,
        user_ids: &[UserId],
    ) -> Result<MembershipReport, GoalError> {
        let mut report = MembershipReport::default();
        for &user_id in user_ids {
            if self.store.get_user(user_id)?.is_none() {
                tracing::debug!(goal_id = %goal_id, user_id = %user_id, "skipping unknown user");
                report.skipped.push(user_id);
                continue;
            }
            if self.store.get_membership(goal_id, user_id)?.is_some() {
                report.skipped.push(user_id);
                continue;
            }
            match self
                .store
                .insert_membership(Membership::new(goal_id, user_id, MemberRole::Member))
            {
                Ok(_) => report.applied.push(user_id),
                // Lost a race with a concurrent add of the same user.
                Err(StoreError::UniqueViolation(_)) => report.skipped.push(user_id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }

    fn remove_members(
        &self,
        goal_id: GoalId,
        user_ids: &[UserId],
    ) -> Result<MembershipReport, GoalError> {
        let roster = self.store.list_memberships(goal_id)?;
        let mut report = MembershipReport::default();
        for &user_id in user_ids {
            let removable = roster
                .iter()
                .any(|m| m.user_id == user_id && m.role != MemberRole::Owner);
            if removable && !report.applied.contains(&user_id) {
                report.applied.push(user_id);
            } else if !removable {
                report.skipped.push(user_id);
            }
        }

        if !report.applied.is_empty() {
            let removed = self.store.delete_memberships(goal_id, &report.applied)?;
            tracing::info!(goal_id = %goal_id, removed, "removed group members");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn users(store: &MemoryStore, names: &[&str]) -> Vec<UserId> {
        names
            .iter()
            .map(|n| store.insert_user(n).unwrap().id)
            .collect()
    }

    fn roster(m: &Memberships<'_>, goal: GoalId) -> Vec<(UserId, MemberRole)> {
        m.members(goal)
            .unwrap()
            .into_iter()
            .map(|m| (m.user_id, m.role))
            .collect()
    }

    #[test]
    fn create_seeds_owner_and_skips_unknown_ids() {
        let store = MemoryStore::new();
        let ids = users(&store, &["u1", "u2"]);
        let (u1, u2) = (ids[0], ids[1]);
        let m = Memberships::new(&store);

        let (goal, report) = m
            .create_group_goal(Goal::new(u1, "Team trip"), &[u2, UserId(999_999)])
            .unwrap();

        assert!(goal.is_group_goal);
        assert_eq!(
            roster(&m, goal.id),
            vec![(u1, MemberRole::Owner), (u2, MemberRole::Member)]
        );
        assert_eq!(report.applied, vec![u2]);
        assert_eq!(report.skipped, vec![UserId(999_999)]);
    }

    #[test]
    fn creator_listed_as_member_keeps_owner_role() {
        let store = MemoryStore::new();
        let ids = users(&store, &["u1"]);
        let m = Memberships::new(&store);
        let (goal, report) = m
            .create_group_goal(Goal::new(ids[0], "Solo"), &[ids[0]])
            .unwrap();
        assert_eq!(roster(&m, goal.id), vec![(ids[0], MemberRole::Owner)]);
        assert_eq!(report.skipped, vec![ids[0]]);
    }

    #[test]
    fn add_is_idempotent() {
        let store = MemoryStore::new();
        let ids = users(&store, &["owner", "a"]);
        let m = Memberships::new(&store);
        let (goal, _) = m.create_group_goal(Goal::new(ids[0], "G"), &[]).unwrap();

        let first = m.update_members(goal.id, MemberAction::Add, &[ids[1]]).unwrap();
        let second = m
            .update_members(goal.id, MemberAction::Add, &[ids[1], ids[0]])
            .unwrap();
        assert_eq!(first.applied, vec![ids[1]]);
        assert!(second.applied.is_empty());
        assert_eq!(roster(&m, goal.id).len(), 2);
        assert_eq!(m.role_of(goal.id, ids[0]).unwrap(), Some(MemberRole::Owner));
    }

    #[test]
    fn owner_survives_removal() {
        let store = MemoryStore::new();
        let ids = users(&store, &["owner", "a", "b"]);
        let m = Memberships::new(&store);
        let (goal, _) = m
            .create_group_goal(Goal::new(ids[0], "G"), &[ids[1], ids[2]])
            .unwrap();

        let report = m
            .update_members(goal.id, MemberAction::Remove, &[ids[0], ids[1]])
            .unwrap();
        assert_eq!(report.applied, vec![ids[1]]);
        assert_eq!(report.skipped, vec![ids[0]]);
        assert_eq!(
            roster(&m, goal.id),
            vec![(ids[0], MemberRole::Owner), (ids[2], MemberRole::Member)]
        );
    }

    #[test]
    fn plain_goal_has_no_roster_to_update() {
        let store = MemoryStore::new();
        let ids = users(&store, &["owner"]);
        let goal = store.insert_goal(Goal::new(ids[0], "Private")).unwrap();
        let result = Memberships::new(&store).update_members(goal.id, MemberAction::Add, &ids);
        assert!(matches!(result, Err(GoalError::Validation { field: "goal", .. })));
    }

    #[test]
    fn group_goals_for_lists_memberships_only() {
        let store = MemoryStore::new();
        let ids = users(&store, &["owner", "member", "outsider"]);
        let m = Memberships::new(&store);
        let (goal, _) = m
            .create_group_goal(Goal::new(ids[0], "G"), &[ids[1]])
            .unwrap();
        store.insert_goal(Goal::new(ids[1], "Private")).unwrap();

        let for_member = m.group_goals_for(ids[1]).unwrap();
        assert_eq!(for_member.len(), 1);
        assert_eq!(for_member[0].id, goal.id);
        assert!(m.group_goals_for(ids[2]).unwrap().is_empty());
    }
}
