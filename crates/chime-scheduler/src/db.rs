use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, Row};

use crate::error::Result;
use crate::schedule::parse_anchor;
use crate::types::{MissedNotification, Recurrence, Reminder, ReminderStatus};

/// Column list shared by every reminder SELECT; order matches [`row_to_reminder`].
pub(crate) const REMINDER_COLUMNS: &str = "id, server_id, message, channel_id, channel_name,
     start_time, recurrence, notification_offsets, next_notification_time,
     next_offset_index, status, selected_emojis, hide_next_time, claimed_at,
     created_at, updated_at";

pub(crate) const MISSED_COLUMNS: &str =
    "id, server_id, message, missed_at, channel_name, acknowledged";

/// Initialise the reminder schema in `conn`.
///
/// Idempotent. The `(status, next_notification_time)` index serves the
/// due-reminder poll; timestamps are fixed-width RFC 3339 text so range
/// comparisons on them are chronological.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                     TEXT    NOT NULL PRIMARY KEY,
            server_id              TEXT    NOT NULL,
            message                TEXT    NOT NULL,
            channel_id             TEXT    NOT NULL,
            channel_name           TEXT    NOT NULL,
            start_time             TEXT    NOT NULL,   -- RFC 3339 anchor
            recurrence             TEXT    NOT NULL,   -- JSON-encoded Recurrence
            notification_offsets   TEXT    NOT NULL,   -- JSON array, minutes, descending
            next_notification_time TEXT,               -- NULL iff paused
            next_offset_index      INTEGER,
            status                 TEXT    NOT NULL DEFAULT 'active',
            selected_emojis        TEXT    NOT NULL DEFAULT '[]',
            hide_next_time         INTEGER NOT NULL DEFAULT 0,
            claimed_at             TEXT,
            created_at             TEXT    NOT NULL,
            updated_at             TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_due
            ON reminders (status, next_notification_time);
        CREATE INDEX IF NOT EXISTS idx_reminders_server
            ON reminders (server_id);

        CREATE TABLE IF NOT EXISTS missed_notifications (
            id           TEXT    NOT NULL PRIMARY KEY,
            server_id    TEXT    NOT NULL,
            message      TEXT    NOT NULL,
            missed_at    TEXT    NOT NULL,
            channel_name TEXT    NOT NULL,
            acknowledged INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_missed_server
            ON missed_notifications (server_id, missed_at DESC);
        ",
    )?;
    Ok(())
}

pub(crate) fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let recurrence: Recurrence = json_column(row, 6)?;
    let notification_offsets: Vec<u32> = json_column(row, 7)?;
    let status: ReminderStatus = row
        .get::<_, String>(10)?
        .parse()
        .map_err(|e: String| conversion_error(10, e.into()))?;
    let selected_emojis: Vec<String> = json_column(row, 11)?;

    Ok(Reminder {
        id: row.get(0)?,
        server_id: row.get(1)?,
        message: row.get(2)?,
        channel_id: row.get(3)?,
        channel_name: row.get(4)?,
        start_time: row.get(5)?,
        recurrence,
        notification_offsets,
        // A corrupt value reads as missing; the processor pauses such rows.
        next_notification_time: row
            .get::<_, Option<String>>(8)?
            .as_deref()
            .and_then(parse_anchor),
        next_offset_index: row
            .get::<_, Option<i64>>(9)?
            .and_then(|i| usize::try_from(i).ok()),
        status,
        selected_emojis,
        hide_next_time: row.get(12)?,
        claimed_at: row.get::<_, Option<String>>(13)?.as_deref().and_then(parse_anchor),
        created_at: timestamp_column(row, 14)?,
        updated_at: timestamp_column(row, 15)?,
    })
}

pub(crate) fn row_to_missed(row: &Row<'_>) -> rusqlite::Result<MissedNotification> {
    Ok(MissedNotification {
        id: row.get(0)?,
        server_id: row.get(1)?,
        message: row.get(2)?,
        missed_at: timestamp_column(row, 3)?,
        channel_name: row.get(4)?,
        acknowledged: row.get(5)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_anchor(&text)
        .ok_or_else(|| conversion_error(idx, format!("invalid timestamp: {text}").into()))
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}
