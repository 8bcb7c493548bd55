//! `chime-core` — configuration shared by the scheduler, the Discord gateway
//! and the daemon binary.

pub mod config;
pub mod error;

pub use config::ChimeConfig;
pub use error::{ConfigError, Result};
