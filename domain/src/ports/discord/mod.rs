mod member;

pub use domain_shared::discord::Role;
pub use member::Member;

use async_trait::async_trait;
use domain_shared::discord::{GuildId, RoleId, UserId};
use thiserror::Error;

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait DiscordPort {
    /// Returns at most `limit` members whose user id is greater than `after`,
    /// ordered by user id.
    async fn find_members_page(
        &self,
        guild_id: GuildId,
        after: Option<UserId>,
        limit: u64,
    ) -> Result<Vec<Member>, DiscordError>;

    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<(), DiscordError>;
}

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Discord is unavailable: {0}")]
    DiscordUnavailable(String),
    #[error("Discord rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}
