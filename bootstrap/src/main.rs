mod args;
mod command;
mod locator;
mod telemetry;

use crate::args::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let Cli { common, command } = Cli::parse();
    let _sentry_guard = telemetry::init(&common);

    command.run(common).await
}
