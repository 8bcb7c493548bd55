//! `chime-discord` — delivers reminders to Discord channels.

pub mod error;
pub mod gateway;
pub mod reaction;
pub mod send;

pub use error::DiscordError;
pub use gateway::DiscordGateway;
