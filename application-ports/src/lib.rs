pub mod guild_available;
