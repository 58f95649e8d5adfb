mod guild_id;
mod member;
mod role_id;
mod user_id;

use crate::discord::guild_id::domain_to_serenity_guild_id;
use crate::discord::member::serenity_to_domain_member;
use crate::discord::role_id::domain_to_serenity_role_id;
use crate::discord::user_id::domain_to_serenity_user_id;
use async_trait::async_trait;
use domain::ports::discord::{DiscordError, DiscordPort, Member};
use domain_shared::discord::{GuildId, RoleId, UserId};
use serenity::all::Http;
use std::sync::Arc;
use tracing::instrument;

pub struct DiscordAdapter {
    client: Arc<Http>,
}

impl DiscordAdapter {
    #[instrument(level = "trace", skip_all)]
    pub fn new(client: Arc<Http>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscordPort for DiscordAdapter {
    #[instrument(level = "debug", err, skip(self))]
    async fn find_members_page(
        &self,
        guild_id: GuildId,
        after: Option<UserId>,
        limit: u64,
    ) -> Result<Vec<Member>, DiscordError> {
        let guild_id = domain_to_serenity_guild_id(guild_id);
        let after = after.map(|user_id| user_id.0);

        let members = self
            .client
            .get_guild_members(guild_id, Some(limit), after)
            .await
            .map_err(serenity_to_domain_error)?;

        Ok(members.into_iter().map(serenity_to_domain_member).collect())
    }

    #[instrument(level = "debug", err, skip(self, reason))]
    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<(), DiscordError> {
        let guild_id = domain_to_serenity_guild_id(guild_id);
        let user_id = domain_to_serenity_user_id(user_id);
        let role_id = domain_to_serenity_role_id(role_id);

        self.client
            .add_member_role(guild_id, user_id, role_id, Some(reason))
            .await
            .map_err(serenity_to_domain_error)?;

        Ok(())
    }
}

/// Client errors (4xx) mean Discord understood and refused the request, e.g.
/// missing permissions or a role above the bot's own. Everything else is
/// treated as Discord being unreachable.
fn serenity_to_domain_error(err: serenity::Error) -> DiscordError {
    let status = match &err {
        serenity::Error::Http(http_error) => http_error.status_code(),
        _ => None,
    };

    match status {
        Some(status) if status.is_client_error() => DiscordError::Rejected {
            status: status.as_u16(),
            message: err.to_string(),
        },
        _ => DiscordError::DiscordUnavailable(err.to_string()),
    }
}
