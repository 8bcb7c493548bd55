use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reminder definition is invalid or cannot be changed right now.
    #[error("Invalid reminder: {0}")]
    InvalidReminder(String),

    /// No reminder with the given ID exists in the store.
    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: String },

    /// The trusted time source could not be queried.
    #[error("Time source error: {0}")]
    TimeSource(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failures reported by a [`crate::gateway::DispatchGateway`].
///
/// These are logged by the processor and never abort a tick.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("reaction failed: {0}")]
    Reaction(String),
}
