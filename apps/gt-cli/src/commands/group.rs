// group.rs — Group goal subcommands: create, members, list, roster.

use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use gt_goal::{GoalId, MemberAction, NewGroupGoal, Priority, UserId};

use super::{parse_datetime, print_json, Context};

#[derive(Clone, Copy, ValueEnum)]
pub enum RosterChange {
    Add,
    Remove,
}

impl From<RosterChange> for MemberAction {
    fn from(change: RosterChange) -> Self {
        match change {
            RosterChange::Add => MemberAction::Add,
            RosterChange::Remove => MemberAction::Remove,
        }
    }
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a group goal owned by --as. Unknown member ids are skipped.
    Create {
        /// Goal name.
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long, value_parser = parse_datetime)]
        deadline: Option<DateTime<Utc>>,
        /// Member user id (repeatable).
        #[arg(long = "member")]
        members: Vec<i64>,
    },
    /// Add or remove members. The owner is never removed.
    Members {
        /// Group goal id.
        goal: i64,
        #[arg(value_enum)]
        change: RosterChange,
        /// User ids.
        #[arg(required = true)]
        users: Vec<i64>,
    },
    /// List group goals a user belongs to (defaults to --as).
    List {
        #[arg(long)]
        user: Option<i64>,
    },
    /// Show the roster of a group goal in join order.
    Roster {
        /// Group goal id.
        goal: i64,
    },
}

fn user_ids(ids: &[i64]) -> Vec<UserId> {
    ids.iter().copied().map(UserId).collect()
}

pub fn execute(cmd: &GroupCommands, ctx: &Context) -> anyhow::Result<()> {
    let svc = &ctx.service;
    match cmd {
        GroupCommands::Create {
            name,
            description,
            priority,
            deadline,
            members,
        } => {
            let new = NewGroupGoal {
                name: name.clone(),
                description: description.clone(),
                priority: *priority,
                deadline: *deadline,
                member_ids: user_ids(members),
            };
            let created = svc.create_group_goal(ctx.actor()?, new)?;
            if !created.members.skipped.is_empty() {
                tracing::warn!(skipped = ?created.members.skipped, "some members were not added");
            }
            print_json(&created)
        }
        GroupCommands::Members {
            goal,
            change,
            users,
        } => {
            let report =
                svc.update_members(ctx.actor()?, GoalId(*goal), (*change).into(), &user_ids(users))?;
            print_json(&report)
        }
        GroupCommands::List { user } => {
            let user = match user {
                Some(u) => UserId(*u),
                None => ctx.actor()?,
            };
            print_json(&svc.group_goals_for(user)?)
        }
        GroupCommands::Roster { goal } => print_json(&svc.members(GoalId(*goal))?),
    }
}
