use application_ports::guild_available::GuildAvailablePort;
use std::sync::Arc;

pub trait Locator {
    fn get_guild_available_port(&self) -> Arc<dyn GuildAvailablePort + Send + Sync>;
}
