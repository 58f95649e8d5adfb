use crate::application_ports::Locator;
use application_ports::guild_available::{GrantReport, GuildAvailable, GuildAvailableError};
use domain_shared::discord::{GuildId, Role, RoleId};
use serenity::all::{Context, EventHandler, Guild, Ready, UnavailableGuild};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

pub struct GuildEventHandler<L> {
    locator: L,
    fatal_errors: mpsc::Sender<GuildAvailableError>,
}

impl<L: Locator> GuildEventHandler<L> {
    pub fn new(locator: L, fatal_errors: mpsc::Sender<GuildAvailableError>) -> Self {
        Self {
            locator,
            fatal_errors,
        }
    }

    #[instrument(level = "debug", skip(self, event), fields(guild_id = event.guild_id.0))]
    pub(crate) async fn dispatch(&self, event: GuildAvailable) {
        let guild_id = event.guild_id;
        let port = self.locator.get_guild_available_port();

        match port.guild_available(event).await {
            Ok(GrantReport::Skipped) => {}
            Ok(GrantReport::Completed(summary)) => {
                info!(guild_id = guild_id.0, "Role grants finished: {:?}", summary);
            }
            Err(err) if err.is_fatal() => {
                error!(guild_id = guild_id.0, "Fatal error while granting roles: {}", err);
                if self.fatal_errors.send(err).await.is_err() {
                    error!("Nobody is listening for fatal errors anymore");
                }
            }
            Err(err) => {
                warn!(guild_id = guild_id.0, "Role grants aborted for this guild: {}", err);
            }
        }
    }
}

#[serenity::async_trait]
impl<L: Locator + Send + Sync + 'static> EventHandler for GuildEventHandler<L> {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected to {} guilds", ready.user.name, ready.guilds.len());
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let roles = guild
            .roles
            .values()
            .map(|role| Role {
                role_id: RoleId(role.id.get()),
                name: role.name.clone(),
            })
            .collect();

        self.dispatch(GuildAvailable {
            guild_id: GuildId(guild.id.get()),
            unavailable: false,
            roles,
        })
        .await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Without the flag the bot was removed from the guild.
        if !incomplete.unavailable {
            return;
        }

        self.dispatch(GuildAvailable {
            guild_id: GuildId(incomplete.id.get()),
            unavailable: true,
            roles: vec![],
        })
        .await;
    }
}
