use clap::{Args, Parser};
use std::path::PathBuf;

use crate::command::Command;

#[derive(Parser)]
#[command(version, about = "Grants Discord roles from a roster file")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct CommonArgs {
    /// Comma-delimited file of `name#discriminator,role name` rows, no header
    #[arg(long, env = "ROSTER_PATH", default_value = "testers.csv")]
    pub roster_path: PathBuf,
    #[arg(long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
    #[arg(long, env = "SENTRY_ENVIRONMENT")]
    pub sentry_environment: Option<String>,
    #[arg(long, env = "SENTRY_SAMPLE_RATE")]
    pub sentry_sample_rate: Option<f32>,
    #[arg(long, env = "SENTRY_TRACES_SAMPLE_RATE")]
    pub sentry_traces_sample_rate: Option<f32>,
}
