//! # gt-cli
//!
//! Command-line interface for Goal Tree.
//!
//! Every command prints JSON on stdout; logs go to stderr.
//! - `gt user add` — register a user
//! - `gt goal create/update/delete/show/roots/tree/analytics/descendants`
//! - `gt task create/update/delete/list`
//! - `gt group create/members/list/roster` — shared goals and their rosters

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use gt_goal::{GoalService, GoalTreeConfig, ProjectPaths, UserId};
use gt_store_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

use commands::Context;

/// Goal Tree CLI — hierarchical goals whose progress rolls up to the root.
#[derive(Parser)]
#[command(name = "gt", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Database file (defaults to .goaltree/goaltree.db under the project root).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to .goaltree/config.toml under the project root).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting user id for commands that change or list someone's goals.
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    as_user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users.
    User {
        #[command(subcommand)]
        command: commands::user::UserCommands,
    },
    /// Create, edit and inspect goals.
    Goal {
        #[command(subcommand)]
        command: commands::goal::GoalCommands,
    },
    /// Manage tasks attached to goals.
    Task {
        #[command(subcommand)]
        command: commands::task::TaskCommands,
    },
    /// Manage group goals and their members.
    Group {
        #[command(subcommand)]
        command: commands::group::GroupCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with JSON on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gt_goal=info".parse()?)
                .add_directive("gt_store_sqlite=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let paths = ProjectPaths::for_project(&project_root);

    // An explicit --config must parse; the project default may be absent.
    let config = match &cli.config {
        Some(path) => GoalTreeConfig::load(path)?,
        None => GoalTreeConfig::load_or_default(&paths.config_path),
    };
    let db_path = cli.db.unwrap_or(paths.db_path);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open goal database at {}", db_path.display()))?;
    tracing::debug!(db = %db_path.display(), "goal database ready");

    let ctx = Context::new(
        GoalService::new(Arc::new(store), config),
        cli.as_user.map(UserId),
    );

    match &cli.command {
        Commands::User { command } => commands::user::execute(command, &ctx),
        Commands::Goal { command } => commands::goal::execute(command, &ctx),
        Commands::Task { command } => commands::task::execute(command, &ctx),
        Commands::Group { command } => commands::group::execute(command, &ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gt", "goal", "roots", "--as", "7", "--db", "/tmp/x.db",
        ])
        .unwrap();
        assert_eq!(cli.as_user, Some(7));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }
}
