use domain_shared::discord::GuildId;

pub fn domain_to_serenity_guild_id(guild_id: GuildId) -> serenity::all::GuildId {
    serenity::all::GuildId::new(guild_id.0)
}
