pub mod check_roster;
pub mod serve;

use crate::args::CommonArgs;
use crate::command::check_roster::CheckRosterArgs;
use crate::command::serve::ServeArgs;
use clap::Subcommand;
use tracing::instrument;

#[derive(Subcommand)]
pub enum Command {
    /// Connect to Discord and grant roster roles whenever a guild becomes available
    #[command(name = "serve")]
    Serve(ServeArgs),
    /// Parse the roster without connecting to Discord
    #[command(name = "check-roster")]
    CheckRoster(CheckRosterArgs),
}

impl Command {
    #[instrument(level = "trace", skip(self, common_args))]
    pub async fn run(self, common_args: CommonArgs) -> anyhow::Result<()> {
        match self {
            Command::Serve(args) => serve::run(common_args, args).await,
            Command::CheckRoster(args) => check_roster::run(common_args, args),
        }
    }
}
