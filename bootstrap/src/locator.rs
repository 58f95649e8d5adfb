use application::role_grant::RoleGrantService;
use application_ports::guild_available::GuildAvailablePort;
use presentation::application_ports::Locator;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct ApplicationPortLocator {
    pub(crate) role_grant_adapter: Arc<RoleGrantService>,
}

impl ApplicationPortLocator {
    #[instrument(level = "trace", skip_all)]
    pub fn new(role_grant_adapter: Arc<RoleGrantService>) -> Self {
        Self { role_grant_adapter }
    }
}

impl Locator for ApplicationPortLocator {
    #[instrument(level = "trace", skip(self))]
    fn get_guild_available_port(&self) -> Arc<dyn GuildAvailablePort + Send + Sync> {
        self.role_grant_adapter.clone()
    }
}
