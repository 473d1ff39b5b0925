// store.rs — SqliteStore: EntityStore over a single SQLite connection.
//
// The connection sits behind a mutex, so calls from one process are
// serialized. Separate processes sharing the database file are kept apart
// by SQLite's own locking plus the version check on goal updates.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{Type, Value};
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use gt_goal::{
    EntityStore, Goal, GoalFilter, GoalId, MemberRole, Membership, MembershipId, ParentFilter,
    RecordKind, StoreError, StoreResult, Task, TaskId, User, UserId,
};

use crate::schema;

const GOAL_COLUMNS: &str = "id, user_id, parent_id, name, description, status, priority, \
     progress, is_group_goal, created_at, updated_at, deadline, completed_at, version";

const TASK_COLUMNS: &str = "id, goal_id, title, description, status, is_recurring, due_date, \
     completed_at, estimated_time, created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = "id, goal_id, user_id, role, joined_at";

/// SQLite-backed entity store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories
    /// as needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::Backend(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(sql)?;
        tracing::debug!(path = %path.display(), "opened goal database");
        Self::with_connection(conn)
    }

    /// A private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(sql)?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        schema::prepare(&conn).map_err(sql)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".into()))
    }
}

/// Map a rusqlite error, keeping uniqueness failures distinguishable.
fn sql(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e {
        if err.code == ErrorCode::ConstraintViolation
            && (err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        {
            return StoreError::UniqueViolation(msg.clone().unwrap_or_else(|| e.to_string()));
        }
    }
    StoreError::Backend(format!("sqlite: {}", e))
}

fn exists(conn: &Connection, table: &str, id: i64) -> StoreResult<bool> {
    conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
        [id],
        |row| row.get(0),
    )
    .map_err(sql)
}

fn require(conn: &Connection, kind: RecordKind, id: i64) -> StoreResult<()> {
    let table = match kind {
        RecordKind::Goal => "goals",
        RecordKind::Task => "tasks",
        RecordKind::User => "users",
        RecordKind::Membership => "memberships",
    };
    if exists(conn, table, id)? {
        Ok(())
    } else {
        Err(StoreError::MissingRecord { kind, id })
    }
}

fn text_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: GoalId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        parent_id: row.get::<_, Option<i64>>(2)?.map(GoalId),
        name: row.get(3)?,
        description: row.get(4)?,
        status: text_enum(row, 5)?,
        priority: text_enum(row, 6)?,
        progress: row.get(7)?,
        is_group_goal: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        deadline: row.get(11)?,
        completed_at: row.get(12)?,
        version: row.get(13)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId(row.get(0)?),
        goal_id: GoalId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: text_enum(row, 4)?,
        is_recurring: row.get(5)?,
        due_date: row.get(6)?,
        completed_at: row.get(7)?,
        estimated_time: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: MembershipId(row.get(0)?),
        goal_id: GoalId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        role: text_enum(row, 3)?,
        joined_at: row.get(4)?,
    })
}

fn load_goal(conn: &Connection, id: GoalId) -> StoreResult<Option<Goal>> {
    conn.query_row(
        &format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS),
        [id.0],
        goal_from_row,
    )
    .optional()
    .map_err(sql)
}

fn load_task(conn: &Connection, id: TaskId) -> StoreResult<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        [id.0],
        task_from_row,
    )
    .optional()
    .map_err(sql)
}

fn insert_goal_row(conn: &Connection, goal: &mut Goal) -> StoreResult<()> {
    require(conn, RecordKind::User, goal.user_id.0)?;
    if let Some(parent) = goal.parent_id {
        require(conn, RecordKind::Goal, parent.0)?;
    }
    conn.execute(
        "INSERT INTO goals (user_id, parent_id, name, description, status, priority, \
         progress, is_group_goal, created_at, updated_at, deadline, completed_at, version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
        params![
            goal.user_id.0,
            goal.parent_id.map(|p| p.0),
            goal.name,
            goal.description,
            goal.status.as_str(),
            goal.priority.as_str(),
            goal.progress,
            goal.is_group_goal,
            goal.created_at,
            goal.updated_at,
            goal.deadline,
            goal.completed_at,
        ],
    )
    .map_err(sql)?;
    goal.id = GoalId(conn.last_insert_rowid());
    goal.version = 0;
    Ok(())
}

fn insert_membership_row(conn: &Connection, membership: &mut Membership) -> StoreResult<()> {
    require(conn, RecordKind::Goal, membership.goal_id.0)?;
    require(conn, RecordKind::User, membership.user_id.0)?;
    conn.execute(
        "INSERT INTO memberships (goal_id, user_id, role, joined_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            membership.goal_id.0,
            membership.user_id.0,
            membership.role.as_str(),
            membership.joined_at,
        ],
    )
    .map_err(sql)?;
    membership.id = MembershipId(conn.last_insert_rowid());
    Ok(())
}

impl EntityStore for SqliteStore {
    fn insert_user(&self, username: &str) -> StoreResult<User> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO users (username) VALUES (?1)", [username])
            .map_err(sql)?;
        Ok(User {
            id: UserId(conn.last_insert_rowid()),
            username: username.to_string(),
        })
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, username FROM users WHERE id = ?1",
            [id.0],
            |row| {
                Ok(User {
                    id: UserId(row.get(0)?),
                    username: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(sql)
    }

    fn insert_goal(&self, mut goal: Goal) -> StoreResult<Goal> {
        let conn = self.lock()?;
        insert_goal_row(&conn, &mut goal)?;
        Ok(goal)
    }

    fn insert_group_goal(&self, mut goal: Goal) -> StoreResult<(Goal, Membership)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql)?;
        goal.is_group_goal = true;
        insert_goal_row(&tx, &mut goal)?;
        let mut owner = Membership::new(goal.id, goal.user_id, MemberRole::Owner);
        insert_membership_row(&tx, &mut owner)?;
        tx.commit().map_err(sql)?;
        Ok((goal, owner))
    }

    fn get_goal(&self, id: GoalId) -> StoreResult<Option<Goal>> {
        load_goal(&*self.lock()?, id)
    }

    fn list_goals(&self, filter: &GoalFilter) -> StoreResult<Vec<Goal>> {
        let mut sql_text = format!("SELECT {} FROM goals WHERE 1 = 1", GOAL_COLUMNS);
        let mut args: Vec<Value> = Vec::new();

        if let Some(user) = filter.user_id {
            sql_text.push_str(" AND user_id = ?");
            args.push(Value::Integer(user.0));
        }
        match filter.parent {
            ParentFilter::Any => {}
            ParentFilter::Root => sql_text.push_str(" AND parent_id IS NULL"),
            ParentFilter::ChildOf(parent) => {
                sql_text.push_str(" AND parent_id = ?");
                args.push(Value::Integer(parent.0));
            }
        }
        if let Some(group) = filter.is_group_goal {
            sql_text.push_str(" AND is_group_goal = ?");
            args.push(Value::Integer(i64::from(group)));
        }
        if let Some(member) = filter.member {
            sql_text.push_str(
                " AND EXISTS (SELECT 1 FROM memberships m \
                 WHERE m.goal_id = goals.id AND m.user_id = ?)",
            );
            args.push(Value::Integer(member.0));
        }
        sql_text.push_str(" ORDER BY created_at DESC, id DESC");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql_text).map_err(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), goal_from_row)
            .map_err(sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql)
    }

    fn update_goal(&self, goal: &Goal) -> StoreResult<Goal> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql)?;
        if let Some(parent) = goal.parent_id {
            require(&tx, RecordKind::Goal, parent.0)?;
        }
        let changed = tx
            .execute(
                "UPDATE goals SET parent_id = ?1, name = ?2, description = ?3, status = ?4, \
                 priority = ?5, progress = ?6, is_group_goal = ?7, updated_at = ?8, \
                 deadline = ?9, completed_at = ?10, version = version + 1 \
                 WHERE id = ?11 AND version = ?12",
                params![
                    goal.parent_id.map(|p| p.0),
                    goal.name,
                    goal.description,
                    goal.status.as_str(),
                    goal.priority.as_str(),
                    goal.progress,
                    goal.is_group_goal,
                    goal.updated_at,
                    goal.deadline,
                    goal.completed_at,
                    goal.id.0,
                    goal.version,
                ],
            )
            .map_err(sql)?;

        if changed == 0 {
            return Err(if exists(&tx, "goals", goal.id.0)? {
                StoreError::StaleVersion {
                    id: goal.id,
                    expected: goal.version,
                }
            } else {
                StoreError::MissingRecord {
                    kind: RecordKind::Goal,
                    id: goal.id.0,
                }
            });
        }

        let saved = load_goal(&tx, goal.id)?.ok_or(StoreError::MissingRecord {
            kind: RecordKind::Goal,
            id: goal.id.0,
        })?;
        tx.commit().map_err(sql)?;
        Ok(saved)
    }

    fn delete_goal(&self, id: GoalId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM goals WHERE id = ?1", [id.0])
            .map_err(sql)?;
        Ok(removed > 0)
    }

    fn insert_task(&self, mut task: Task) -> StoreResult<Task> {
        let conn = self.lock()?;
        require(&conn, RecordKind::Goal, task.goal_id.0)?;
        conn.execute(
            "INSERT INTO tasks (goal_id, title, description, status, is_recurring, due_date, \
             completed_at, estimated_time, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.goal_id.0,
                task.title,
                task.description,
                task.status.as_str(),
                task.is_recurring,
                task.due_date,
                task.completed_at,
                task.estimated_time,
                task.created_at,
                task.updated_at,
            ],
        )
        .map_err(sql)?;
        task.id = TaskId(conn.last_insert_rowid());
        Ok(task)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        load_task(&*self.lock()?, id)
    }

    fn list_tasks(&self, goal_id: GoalId) -> StoreResult<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM tasks WHERE goal_id = ?1 ORDER BY created_at DESC, id DESC",
                TASK_COLUMNS
            ))
            .map_err(sql)?;
        let rows = stmt.query_map([goal_id.0], task_from_row).map_err(sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql)
    }

    fn update_task(&self, task: &Task) -> StoreResult<()> {
        let conn = self.lock()?;
        require(&conn, RecordKind::Goal, task.goal_id.0)?;
        let changed = conn
            .execute(
                "UPDATE tasks SET goal_id = ?1, title = ?2, description = ?3, status = ?4, \
                 is_recurring = ?5, due_date = ?6, completed_at = ?7, estimated_time = ?8, \
                 updated_at = ?9 WHERE id = ?10",
                params![
                    task.goal_id.0,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.is_recurring,
                    task.due_date,
                    task.completed_at,
                    task.estimated_time,
                    task.updated_at,
                    task.id.0,
                ],
            )
            .map_err(sql)?;
        if changed == 0 {
            return Err(StoreError::MissingRecord {
                kind: RecordKind::Task,
                id: task.id.0,
            });
        }
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM tasks WHERE id = ?1", [id.0])
            .map_err(sql)?;
        Ok(removed > 0)
    }

    fn insert_membership(&self, mut membership: Membership) -> StoreResult<Membership> {
        let conn = self.lock()?;
        insert_membership_row(&conn, &mut membership)?;
        Ok(membership)
    }

    fn get_membership(
        &self,
        goal_id: GoalId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM memberships WHERE goal_id = ?1 AND user_id = ?2",
                MEMBERSHIP_COLUMNS
            ),
            [goal_id.0, user_id.0],
            membership_from_row,
        )
        .optional()
        .map_err(sql)
    }

    fn list_memberships(&self, goal_id: GoalId) -> StoreResult<Vec<Membership>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM memberships WHERE goal_id = ?1 ORDER BY joined_at ASC, id ASC",
                MEMBERSHIP_COLUMNS
            ))
            .map_err(sql)?;
        let rows = stmt
            .query_map([goal_id.0], membership_from_row)
            .map_err(sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql)
    }

    fn delete_memberships(&self, goal_id: GoalId, user_ids: &[UserId]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql)?;
        let mut removed = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM memberships WHERE goal_id = ?1 AND user_id = ?2")
                .map_err(sql)?;
            for user in user_ids {
                removed += stmt.execute([goal_id.0, user.0]).map_err(sql)?;
            }
        }
        tx.commit().map_err(sql)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt_goal::{GoalStatus, TaskStatus};

    fn store_with_user() -> (SqliteStore, UserId) {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.insert_user("alice").unwrap();
        (store, user.id)
    }

    fn child(user: UserId, name: &str, parent: GoalId) -> Goal {
        let mut g = Goal::new(user, name);
        g.parent_id = Some(parent);
        g
    }

    #[test]
    fn goal_round_trips_through_columns() {
        let (store, user) = store_with_user();
        let mut goal = Goal::new(user, "Learn Rust");
        goal.description = Some("the whole book".into());
        goal.progress = 12.5;
        goal.deadline = Some(goal.created_at + chrono::Duration::days(30));
        let inserted = store.insert_goal(goal).unwrap();

        let loaded = store.get_goal(inserted.id).unwrap().unwrap();
        assert_eq!(loaded, inserted);
    }

    #[test]
    fn update_is_compare_and_swap() {
        let (store, user) = store_with_user();
        let goal = store.insert_goal(Goal::new(user, "g")).unwrap();

        let mut first = goal.clone();
        first.progress = 40.0;
        let saved = store.update_goal(&first).unwrap();
        assert_eq!(saved.version, 1);

        let mut stale = goal.clone();
        stale.progress = 90.0;
        assert!(matches!(
            store.update_goal(&stale),
            Err(StoreError::StaleVersion { expected: 0, .. })
        ));
        assert_eq!(store.get_goal(goal.id).unwrap().unwrap().progress, 40.0);

        let mut gone = saved.clone();
        gone.id = GoalId(999);
        assert!(matches!(
            store.update_goal(&gone),
            Err(StoreError::MissingRecord { kind: RecordKind::Goal, id: 999 })
        ));
    }

    #[test]
    fn sibling_names_are_unique_including_roots() {
        let (store, user) = store_with_user();
        let root = store.insert_goal(Goal::new(user, "root")).unwrap();
        assert!(matches!(
            store.insert_goal(Goal::new(user, "root")),
            Err(StoreError::UniqueViolation(_))
        ));
        store.insert_goal(child(user, "x", root.id)).unwrap();
        assert!(matches!(
            store.insert_goal(child(user, "x", root.id)),
            Err(StoreError::UniqueViolation(_))
        ));
    }

    #[test]
    fn delete_cascades_through_subtree() {
        let (store, user) = store_with_user();
        let root = store.insert_goal(Goal::new(user, "root")).unwrap();
        let mid = store.insert_goal(child(user, "mid", root.id)).unwrap();
        let leaf = store.insert_goal(child(user, "leaf", mid.id)).unwrap();
        let task = store.insert_task(Task::new(leaf.id, "t")).unwrap();
        store
            .insert_membership(Membership::new(mid.id, user, MemberRole::Owner))
            .unwrap();

        assert!(store.delete_goal(mid.id).unwrap());
        assert!(store.get_goal(leaf.id).unwrap().is_none());
        assert!(store.get_task(task.id).unwrap().is_none());
        assert!(store.list_memberships(mid.id).unwrap().is_empty());
        assert!(store.get_goal(root.id).unwrap().is_some());
        assert!(!store.delete_goal(mid.id).unwrap());
    }

    #[test]
    fn filters_compose() {
        let (store, alice) = store_with_user();
        let bob = store.insert_user("bob").unwrap().id;
        let mut group = Goal::new(alice, "team");
        group.is_group_goal = true;
        let group = store.insert_goal(group).unwrap();
        store
            .insert_membership(Membership::new(group.id, bob, MemberRole::Member))
            .unwrap();
        store.insert_goal(Goal::new(bob, "solo")).unwrap();

        let bobs_groups = store.list_goals(&GoalFilter::group_goals_of(bob)).unwrap();
        assert_eq!(bobs_groups.len(), 1);
        assert_eq!(bobs_groups[0].id, group.id);

        let bobs_roots = store.list_goals(&GoalFilter::roots_of(bob)).unwrap();
        assert_eq!(bobs_roots.len(), 1);
        assert_eq!(bobs_roots[0].name, "solo");
    }

    #[test]
    fn listings_are_newest_first() {
        let (store, user) = store_with_user();
        let root = store.insert_goal(Goal::new(user, "root")).unwrap();
        let older = store.insert_goal(child(user, "older", root.id)).unwrap();
        let newer = store.insert_goal(child(user, "newer", root.id)).unwrap();
        let ids: Vec<GoalId> = store
            .list_goals(&GoalFilter::children_of(root.id))
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn group_goal_is_inserted_with_its_owner() {
        let (store, user) = store_with_user();
        let (goal, owner) = store.insert_group_goal(Goal::new(user, "team")).unwrap();
        assert!(goal.is_group_goal);
        assert_eq!(owner.role, MemberRole::Owner);
        assert_eq!(store.list_memberships(goal.id).unwrap(), vec![owner]);

        // A rejected insert leaves neither row behind.
        assert!(matches!(
            store.insert_group_goal(Goal::new(user, "team")),
            Err(StoreError::UniqueViolation(_))
        ));
        assert_eq!(store.list_goals(&GoalFilter::roots_of(user)).unwrap().len(), 1);
        assert_eq!(store.list_goals(&GoalFilter::group_goals_of(user)).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_membership_is_unique_violation() {
        let (store, user) = store_with_user();
        let goal = store.insert_goal(Goal::new(user, "g")).unwrap();
        store
            .insert_membership(Membership::new(goal.id, user, MemberRole::Owner))
            .unwrap();
        assert!(matches!(
            store.insert_membership(Membership::new(goal.id, user, MemberRole::Member)),
            Err(StoreError::UniqueViolation(_))
        ));
        assert_eq!(store.delete_memberships(goal.id, &[user, UserId(77)]).unwrap(), 1);
    }

    #[test]
    fn task_update_and_missing_references() {
        let (store, user) = store_with_user();
        let goal = store.insert_goal(Goal::new(user, "g")).unwrap();
        let mut task = store.insert_task(Task::new(goal.id, "t")).unwrap();
        task.set_status(TaskStatus::Completed, chrono::Utc::now());
        store.update_task(&task).unwrap();
        assert_eq!(store.get_task(task.id).unwrap().unwrap(), task);

        assert!(matches!(
            store.insert_task(Task::new(GoalId(404), "orphan")),
            Err(StoreError::MissingRecord { kind: RecordKind::Goal, id: 404 })
        ));
        assert!(matches!(
            store.insert_goal(Goal::new(UserId(404), "nobody")),
            Err(StoreError::MissingRecord { kind: RecordKind::User, id: 404 })
        ));
        assert_eq!(
            store.get_goal(goal.id).unwrap().unwrap().status,
            GoalStatus::Active
        );
    }
}
