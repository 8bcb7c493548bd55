/// Errors produced by the Discord gateway.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured")]
    NoToken,

    #[error("invalid Discord ID: {0:?}")]
    InvalidId(String),
}
