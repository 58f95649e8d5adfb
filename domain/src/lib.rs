pub mod guild_state;
pub mod ports;
pub mod roster;
