//! Per-guild lookup tables used while granting roster roles.
//!
//! A [`GuildState`] is built from scratch for every guild-available event and
//! handed to the grant loop by value. Nothing is carried over between events.

use crate::ports::discord::{Member, Role};
use crate::roster::RosterEntry;
use domain_shared::discord::{GuildId, RoleId, UserId};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct GuildState {
    guild_id: GuildId,
    role_ids_by_name: HashMap<String, RoleId>,
    user_ids_by_handle: HashMap<String, UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDecision {
    Grant { user_id: UserId, role_id: RoleId },
    UnknownMember,
    UnknownRole,
}

impl GuildState {
    /// Role names are treated as unique; if two roles share a name the one
    /// seen last wins.
    #[instrument(level = "debug", skip(roles, members))]
    pub fn new(
        guild_id: GuildId,
        roles: impl IntoIterator<Item = Role>,
        members: impl IntoIterator<Item = Member>,
    ) -> Self {
        let role_ids_by_name = roles
            .into_iter()
            .inspect(|role| debug!(role_id = role.role_id.0, "Guild role {}", role.name))
            .map(|role| (role.name, role.role_id))
            .collect();

        let user_ids_by_handle = members
            .into_iter()
            .map(|member| (member.handle(), member.user_id))
            .collect();

        Self {
            guild_id,
            role_ids_by_name,
            user_ids_by_handle,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn role_id(&self, role_name: &str) -> Option<RoleId> {
        self.role_ids_by_name.get(role_name).copied()
    }

    pub fn user_id(&self, handle: &str) -> Option<UserId> {
        self.user_ids_by_handle.get(handle).copied()
    }

    pub fn role_count(&self) -> usize {
        self.role_ids_by_name.len()
    }

    pub fn member_count(&self) -> usize {
        self.user_ids_by_handle.len()
    }

    /// An entry is granted only when both its handle and its role resolve.
    /// The member is checked first, so an entry with neither is an unknown
    /// member.
    pub fn decide(&self, entry: &RosterEntry) -> GrantDecision {
        let Some(user_id) = self.user_id(&entry.handle) else {
            return GrantDecision::UnknownMember;
        };

        let Some(role_id) = self.role_id(&entry.role_name) else {
            return GrantDecision::UnknownRole;
        };

        GrantDecision::Grant { user_id, role_id }
    }
}
