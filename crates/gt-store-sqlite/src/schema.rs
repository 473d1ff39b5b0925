// schema.rs — Table definitions and connection setup.
//
// Deleting a goal removes its subtree, tasks and memberships through
// ON DELETE CASCADE, so foreign keys must be enabled on every connection.
// Root goals have a NULL parent, which a plain UNIQUE constraint treats as
// distinct; the partial index covers sibling-name uniqueness among roots.

use std::time::Duration;

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS goals (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    parent_id     INTEGER REFERENCES goals(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    description   TEXT,
    status        TEXT NOT NULL,
    priority      TEXT NOT NULL,
    progress      REAL NOT NULL CHECK (progress >= 0 AND progress <= 100),
    is_group_goal INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    deadline      TEXT,
    completed_at  TEXT,
    version       INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, parent_id, name)
);

CREATE UNIQUE INDEX IF NOT EXISTS goals_root_name
    ON goals (user_id, name) WHERE parent_id IS NULL;
CREATE INDEX IF NOT EXISTS goals_parent ON goals (parent_id);

CREATE TABLE IF NOT EXISTS tasks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    goal_id        INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
    title          TEXT NOT NULL,
    description    TEXT,
    status         TEXT NOT NULL,
    is_recurring   INTEGER NOT NULL DEFAULT 0,
    due_date       TEXT,
    completed_at   TEXT,
    estimated_time INTEGER NOT NULL CHECK (estimated_time > 0),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS tasks_goal ON tasks (goal_id);

CREATE TABLE IF NOT EXISTS memberships (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    goal_id   INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
    user_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role      TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    UNIQUE (goal_id, user_id)
);
";

/// Enable the pragmas the store relies on and create any missing tables.
pub(crate) fn prepare(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
