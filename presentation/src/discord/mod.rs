use crate::application_ports::Locator;
use crate::discord::handler::GuildEventHandler;
use application_ports::guild_available::GuildAvailableError;
use serenity::all::{Client, GatewayIntents, ShardManager};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;

mod handler;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Guild and member metadata only; message content is never requested.
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS
}

pub struct GatewaySession {
    client: Client,
}

/// Builds the gateway client. Fatal errors raised while handling guild events
/// are forwarded to `fatal_errors`; deciding what to do with them is left to
/// the caller.
#[instrument(level = "debug", skip_all)]
pub async fn open_session<L: Locator + Send + Sync + 'static>(
    locator: L,
    token: &str,
    fatal_errors: mpsc::Sender<GuildAvailableError>,
) -> Result<GatewaySession, Error> {
    let handler = GuildEventHandler::new(locator, fatal_errors);

    let client = Client::builder(token, gateway_intents())
        .event_handler(handler)
        .await?;

    Ok(GatewaySession { client })
}

impl GatewaySession {
    pub fn shard_manager(&self) -> Arc<ShardManager> {
        self.client.shard_manager.clone()
    }

    /// Connects and runs until every shard has shut down. Authentication and
    /// handshake failures are returned here.
    #[instrument(level = "info", skip_all)]
    pub async fn run(mut self) -> Result<(), Error> {
        self.client.start().await?;

        Ok(())
    }
}
