use async_trait::async_trait;
use domain_shared::discord::{GuildId, Role};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct GuildAvailable {
    pub guild_id: GuildId,
    /// Set when Discord reports the guild as temporarily unavailable (outage).
    pub unavailable: bool,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReport {
    Skipped,
    Completed(GrantSummary),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GrantSummary {
    pub granted: usize,
    pub failed: usize,
    pub unknown_members: usize,
    pub unknown_roles: usize,
}

#[async_trait]
pub trait GuildAvailablePort {
    async fn guild_available(
        &self,
        event: GuildAvailable,
    ) -> Result<GrantReport, GuildAvailableError>;
}

#[derive(Debug, Error)]
pub enum GuildAvailableError {
    #[error("Roster is unavailable: {0}")]
    RosterUnavailable(String),
    #[error("Roster row at line {line} is malformed: {reason}")]
    MalformedRoster { line: u64, reason: String },
    #[error("Discord is temporarily unavailable")]
    DiscordUnavailable,
}

impl GuildAvailableError {
    /// Roster problems stop the bot; Discord outages only cost the current
    /// event.
    #[instrument(level = "trace")]
    pub fn is_fatal(&self) -> bool {
        match self {
            GuildAvailableError::RosterUnavailable(_)
            | GuildAvailableError::MalformedRoster { .. } => true,
            GuildAvailableError::DiscordUnavailable => false,
        }
    }
}
