// goal.rs — Goal subcommands: create, update, delete, show, roots, tree,
// analytics, descendants.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use gt_goal::{GoalId, GoalStatus, GoalUpdate, NewGoal, Priority, UserId};

use super::{parse_datetime, print_json, Context};

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Create a goal, optionally under one of your goals.
    Create {
        /// Goal name, unique among its siblings.
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Parent goal id.
        #[arg(long)]
        parent: Option<i64>,
        /// low, medium, high or urgent.
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Deadline (YYYY-MM-DD or RFC 3339).
        #[arg(long, value_parser = parse_datetime)]
        deadline: Option<DateTime<Utc>>,
    },
    /// Edit a goal. Ancestors are re-aggregated afterwards.
    Update {
        /// Goal id.
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        /// Move the goal under another of your goals.
        #[arg(long, conflicts_with = "detach")]
        parent: Option<i64>,
        /// Make the goal a root.
        #[arg(long)]
        detach: bool,
        /// active, completed, paused or cancelled.
        #[arg(long)]
        status: Option<GoalStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Progress percentage, only for goals without subgoals.
        #[arg(long)]
        progress: Option<f64>,
        #[arg(long, value_parser = parse_datetime, conflicts_with = "clear_deadline")]
        deadline: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_deadline: bool,
    },
    /// Delete a goal with its subgoals and tasks.
    Delete {
        /// Goal id.
        id: i64,
    },
    /// Show a goal with its subgoals, tasks and members.
    Show {
        /// Goal id.
        id: i64,
    },
    /// List root goals of a user (defaults to --as).
    Roots {
        #[arg(long)]
        user: Option<i64>,
    },
    /// Show a goal and the names of its direct subgoals.
    Tree {
        /// Goal id.
        id: i64,
    },
    /// One-level progress breakdown and estimated time of direct tasks.
    Analytics {
        /// Goal id.
        id: i64,
    },
    /// List every goal below a goal.
    Descendants {
        /// Goal id.
        id: i64,
    },
}

pub fn execute(cmd: &GoalCommands, ctx: &Context) -> anyhow::Result<()> {
    let svc = &ctx.service;
    match cmd {
        GoalCommands::Create {
            name,
            description,
            parent,
            priority,
            deadline,
        } => {
            let new = NewGoal {
                name: name.clone(),
                description: description.clone(),
                parent_id: parent.map(GoalId),
                priority: *priority,
                deadline: *deadline,
            };
            print_json(&svc.create_goal(ctx.actor()?, new)?)
        }
        GoalCommands::Update {
            id,
            name,
            description,
            clear_description,
            parent,
            detach,
            status,
            priority,
            progress,
            deadline,
            clear_deadline,
        } => {
            let update = GoalUpdate {
                name: name.clone(),
                description: clearable(description.clone(), *clear_description),
                parent_id: clearable(parent.map(GoalId), *detach),
                status: *status,
                priority: *priority,
                progress: *progress,
                deadline: clearable(*deadline, *clear_deadline),
            };
            print_json(&svc.update_goal(ctx.actor()?, GoalId(*id), update)?)
        }
        GoalCommands::Delete { id } => {
            svc.delete_goal(ctx.actor()?, GoalId(*id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        GoalCommands::Show { id } => print_json(&svc.goal_detail(GoalId(*id))?),
        GoalCommands::Roots { user } => {
            let user = match user {
                Some(u) => UserId(*u),
                None => ctx.actor()?,
            };
            print_json(&svc.root_goals(user)?)
        }
        GoalCommands::Tree { id } => print_json(&svc.tree_view(GoalId(*id))?),
        GoalCommands::Analytics { id } => print_json(&svc.analytics(GoalId(*id))?),
        GoalCommands::Descendants { id } => print_json(&svc.descendants(GoalId(*id))?),
    }
}

/// `--x value` sets, `--clear-x` clears, neither leaves the field alone.
fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}
