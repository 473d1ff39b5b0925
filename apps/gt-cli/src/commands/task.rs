// task.rs — Task subcommands: create, update, delete, list.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use gt_goal::{GoalId, NewTask, TaskId, TaskStatus, TaskUpdate};

use super::{parse_datetime, print_json, Context};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Attach a task to one of your goals.
    Create {
        /// Goal id.
        goal: i64,
        /// Task title.
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        recurring: bool,
        /// Due date (YYYY-MM-DD or RFC 3339).
        #[arg(long, value_parser = parse_datetime)]
        due: Option<DateTime<Utc>>,
        /// Estimated minutes (defaults to the configured value).
        #[arg(long)]
        estimate: Option<u32>,
    },
    /// Edit a task, or move it to another goal.
    Update {
        /// Task id.
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// pending, in_progress, completed or cancelled.
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        recurring: Option<bool>,
        #[arg(long, value_parser = parse_datetime)]
        due: Option<DateTime<Utc>>,
        #[arg(long)]
        estimate: Option<u32>,
        /// Move the task under this goal.
        #[arg(long)]
        goal: Option<i64>,
    },
    /// Delete a task.
    Delete {
        /// Task id.
        id: i64,
    },
    /// List the tasks attached to a goal.
    List {
        /// Goal id.
        goal: i64,
    },
}

pub fn execute(cmd: &TaskCommands, ctx: &Context) -> anyhow::Result<()> {
    let svc = &ctx.service;
    match cmd {
        TaskCommands::Create {
            goal,
            title,
            description,
            recurring,
            due,
            estimate,
        } => {
            let new = NewTask {
                title: title.clone(),
                description: description.clone(),
                is_recurring: *recurring,
                due_date: *due,
                estimated_time: *estimate,
            };
            print_json(&svc.create_task(ctx.actor()?, GoalId(*goal), new)?)
        }
        TaskCommands::Update {
            id,
            title,
            description,
            status,
            recurring,
            due,
            estimate,
            goal,
        } => {
            let update = TaskUpdate {
                title: title.clone(),
                description: description.clone().map(Some),
                status: *status,
                is_recurring: *recurring,
                due_date: due.map(Some),
                estimated_time: *estimate,
                goal_id: goal.map(GoalId),
            };
            print_json(&svc.update_task(ctx.actor()?, TaskId(*id), update)?)
        }
        TaskCommands::Delete { id } => {
            svc.delete_task(ctx.actor()?, TaskId(*id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        TaskCommands::List { goal } => print_json(&svc.list_tasks(GoalId(*goal))?),
    }
}
