use crate::args::CommonArgs;
use crate::locator::ApplicationPortLocator;
use anyhow::anyhow;
use application::role_grant::RoleGrantService;
use clap::Args;
use infrastructure::discord::DiscordAdapter;
use infrastructure::roster::CsvRosterRepository;
use presentation::discord::open_session;
use serenity::all::Http;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

#[derive(Args)]
pub struct ServeArgs {
    /// The token for the Discord bot. Falls back to the `TOKEN` variable used
    /// by older deployments when `DISCORD_BOT_TOKEN` is not set
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub discord_bot_token: Option<String>,

    #[arg(long = "token", env = "TOKEN", hide = true, hide_env_values = true)]
    pub legacy_token: Option<String>,
}

impl ServeArgs {
    fn token(self) -> anyhow::Result<String> {
        self.discord_bot_token.or(self.legacy_token).ok_or_else(|| {
            anyhow!("No Discord bot token provided, set DISCORD_BOT_TOKEN in the environment or .env")
        })
    }
}

#[instrument(level = "trace", skip(common_args, args))]
pub async fn run(common_args: CommonArgs, args: ServeArgs) -> anyhow::Result<()> {
    let CommonArgs { roster_path, .. } = common_args;
    let discord_bot_token = args.token()?;

    let serenity_client = Arc::new(Http::new(&discord_bot_token));

    let discord_adapter = Arc::new(DiscordAdapter::new(serenity_client));
    let roster_repository = Arc::new(CsvRosterRepository::new(roster_path));
    let role_grant_adapter = Arc::new(RoleGrantService::new(
        discord_adapter,
        roster_repository,
    ));

    let locator = ApplicationPortLocator::new(role_grant_adapter);

    let (fatal_errors, mut fatal_error_receiver) = mpsc::channel(1);
    let session = open_session(locator, &discord_bot_token, fatal_errors)
        .await
        .map_err(|e| anyhow!(e))?;
    let shard_manager = session.shard_manager();

    let bot = tokio::spawn(session.run());
    info!("Bot is now running. Press CTRL-C to exit.");

    tokio::select! {
        result = bot => {
            result?.map_err(|e| anyhow!(e))?;
        }
        Some(err) = fatal_error_receiver.recv() => {
            error!("Shutting down after fatal error: {}", err);
            shard_manager.shutdown_all().await;
            return Err(err.into());
        }
        result = shutdown_signal() => {
            result?;
            info!("Termination signal received, closing the gateway session");
            shard_manager.shutdown_all().await;
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
