// user.rs — User subcommands: add.

use clap::Subcommand;

use super::{print_json, Context};

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a user and print its id.
    Add {
        /// Unique username.
        username: String,
    },
}

pub fn execute(cmd: &UserCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Add { username } => print_json(&ctx.service.create_user(username)?),
    }
}
