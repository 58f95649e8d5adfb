pub mod discord;
pub mod roster;
