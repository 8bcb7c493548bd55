//! `chime-scheduler` — recurring reminder engine with SQLite persistence.
//!
//! # Overview
//!
//! Reminders live in the `reminders` table. The [`engine::ReminderProcessor`]
//! polls once per tick for reminders whose `next_notification_time` has
//! passed, claims each one in a transaction, sends it through a
//! [`gateway::DispatchGateway`] (or records it as missed when it is older than
//! the grace period) and writes back the next notification time.
//!
//! # Recurrence variants
//!
//! | Variant    | Behaviour                                             |
//! |------------|-------------------------------------------------------|
//! | `None`     | Single fire at `start_time`                           |
//! | `Daily`    | Every day at the anchor's HH:MM UTC                   |
//! | `Weekly`   | At the anchor's HH:MM UTC on each listed weekday      |
//! | `Interval` | Every N hours counted from the (advancing) anchor     |
//!
//! Each reminder carries descending `notification_offsets` (minutes); every
//! cycle produces one notification per offset, largest first.

pub mod clock;
pub mod compose;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod handle;
pub mod schedule;
pub mod store;
pub mod types;

pub use clock::{ClockCorrector, HttpDateTimeSource, SystemClock, TimeSource, WallClock};
pub use engine::{ReminderProcessor, TickReport};
pub use error::{DispatchError, Result, SchedulerError};
pub use gateway::{DeliveryChannel, DispatchGateway, MessageHandle};
pub use handle::ReminderHandle;
pub use store::{ReminderStore, SqliteReminderStore};
pub use types::{
    MissedNotification, NextState, Recurrence, Reminder, ReminderDraft, ReminderStatus,
};
