// model.rs — Records of the goal hierarchy: users, goals, tasks, memberships.
//
// Goals form a per-user forest through `parent_id`. Tasks are leaves attached
// to exactly one goal. Group goals carry a roster of memberships with a
// single owner.
//
// Records are plain data. Everything that derives state (progress, status,
// completion timestamps) lives in `aggregate`, and everything that writes
// lives behind the `EntityStore` seam.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GoalError;

/// Longest accepted goal name or task title.
pub const MAX_NAME_LEN: usize = 255;

/// Default estimated time for a task, in minutes.
pub const DEFAULT_ESTIMATED_TIME: u32 = 60;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

record_id!(
    /// Store-assigned goal identifier.
    GoalId
);
record_id!(
    /// Store-assigned task identifier.
    TaskId
);
record_id!(
    /// Identifier of a user in the external account system.
    UserId
);
record_id!(
    /// Store-assigned membership identifier.
    MembershipId
);

/// Placeholder id carried by records that have not been inserted yet.
pub const UNASSIGNED: i64 = 0;

/// A string did not name a known enum variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl From<ParseEnumError> for GoalError {
    fn from(e: ParseEnumError) -> Self {
        GoalError::validation(e.kind, format!("unknown value '{}'", e.value))
    }
}

// Closed string enums share the same snake_case wire names in JSON, SQL and
// CLI arguments.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Lifecycle status of a goal. Only `Completed` is ever set automatically.
    GoalStatus, "status" {
        Active => "active",
        Completed => "completed",
        Paused => "paused",
        Cancelled => "cancelled",
    }
);

string_enum!(
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
);

string_enum!(
    TaskStatus, "task status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Role of a user on a group goal. Exactly one `Owner` per group goal.
    MemberRole, "role" {
        Owner => "owner",
        Admin => "admin",
        Member => "member",
    }
);

impl Default for GoalStatus {
    fn default() -> Self {
        GoalStatus::Active
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// A user as known to the store. Accounts themselves live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// A node in a user's goal forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,

    /// The user who owns this goal and its whole subtree.
    pub user_id: UserId,

    /// Parent goal, owned by the same user. `None` for root goals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GoalId>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: GoalStatus,

    pub priority: Priority,

    /// Percentage in [0, 100]. Derived from subgoals when there are any.
    pub progress: f64,

    pub is_group_goal: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    /// Stamped once, the first time progress reaches 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Write counter for compare-and-swap updates. Bumped by the store.
    #[serde(default)]
    pub version: i64,
}

impl Goal {
    /// A fresh, not-yet-inserted goal in the Active state with zero progress.
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GoalId(UNASSIGNED),
            user_id,
            parent_id: None,
            name: name.into(),
            description: None,
            status: GoalStatus::Active,
            priority: Priority::Medium,
            progress: 0.0,
            is_group_goal: false,
            created_at: now,
            updated_at: now,
            deadline: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check the attributes a user can set directly.
    pub fn validate(&self) -> Result<(), GoalError> {
        validate_name("name", &self.name)?;
        validate_progress(self.progress)
    }
}

/// A leaf work item attached to one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub goal_id: GoalId,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: TaskStatus,

    pub is_recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Stamped once, the first time the status becomes Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Estimated effort in minutes.
    pub estimated_time: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh, not-yet-inserted pending task.
    pub fn new(goal_id: GoalId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId(UNASSIGNED),
            goal_id,
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            is_recurring: false,
            due_date: None,
            completed_at: None,
            estimated_time: DEFAULT_ESTIMATED_TIME,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), GoalError> {
        validate_name("title", &self.title)?;
        if self.estimated_time == 0 {
            return Err(GoalError::validation(
                "estimated_time",
                "must be a positive number of minutes",
            ));
        }
        Ok(())
    }

    /// Change the status, stamping `completed_at` on the first completion.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == TaskStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }
}

/// A user's role on a group goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub goal_id: GoalId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(goal_id: GoalId, user_id: UserId, role: MemberRole) -> Self {
        Self {
            id: MembershipId(UNASSIGNED),
            goal_id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), GoalError> {
    if value.trim().is_empty() {
        return Err(GoalError::validation(field, "must not be empty"));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(GoalError::validation(
            field,
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(())
}

fn validate_progress(progress: f64) -> Result<(), GoalError> {
    if !(0.0..=100.0).contains(&progress) {
        return Err(GoalError::validation(
            "progress",
            format!("{} is outside 0..=100", progress),
        ));
    }
    Ok(())
}
