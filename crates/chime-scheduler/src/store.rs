use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{error, warn};

use crate::{
    db::{init_db, row_to_missed, row_to_reminder, MISSED_COLUMNS, REMINDER_COLUMNS},
    error::{Result, SchedulerError},
    schedule::format_instant,
    types::{MissedNotification, NextState, Reminder, ReminderStatus},
};

/// Persistence seam for reminders and the missed-notification audit log.
///
/// The processor never keeps reminders between ticks; every tick re-reads
/// through this trait. [`ReminderStore::claim`] must be atomic across every
/// process sharing the backing store.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn insert(&self, reminder: &Reminder) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Reminder>>;

    /// Overwrite a reminder's definition and scheduling state.
    ///
    /// Fails with `InvalidReminder` while the reminder is claimed.
    async fn update(&self, reminder: &Reminder) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn list_for_server(&self, server_id: &str) -> Result<Vec<Reminder>>;

    /// Active reminders with `next_notification_time <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>>;

    /// Earliest pending notification across all active reminders.
    async fn next_due_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Atomically move `active` → `processing`.
    ///
    /// Returns the freshly read record, or `None` when the reminder is gone or
    /// no longer active (claim lost).
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Reminder>>;

    /// Persist the post-dispatch state and end the claim.
    async fn release(&self, id: &str, next: &NextState, now: DateTime<Utc>) -> Result<()>;

    /// Return claims taken before `claimed_before` to `active`.
    async fn reclaim_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    async fn record_missed(&self, missed: &MissedNotification) -> Result<()>;

    /// Delete all but the newest `keep` records for `server_id`.
    async fn trim_missed(&self, server_id: &str, keep: usize) -> Result<usize>;

    /// Delete all but the newest `keep` records overall.
    async fn trim_missed_global(&self, keep: usize) -> Result<usize>;

    /// Newest first.
    async fn list_missed(&self, server_id: &str) -> Result<Vec<MissedNotification>>;

    async fn acknowledge_missed(&self, id: &str) -> Result<()>;
}

/// SQLite-backed [`ReminderStore`].
///
/// Claims run in `BEGIN IMMEDIATE` transactions, so they stay exclusive even
/// when several daemons share one database file.
pub struct SqliteReminderStore {
    conn: Mutex<Connection>,
}

impl SqliteReminderStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ReminderStore for SqliteReminderStore {
    async fn insert(&self, r: &Reminder) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO reminders ({REMINDER_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)"
            ),
            params![
                r.id,
                r.server_id,
                r.message,
                r.channel_id,
                r.channel_name,
                r.start_time,
                serde_json::to_string(&r.recurrence)?,
                serde_json::to_string(&r.notification_offsets)?,
                r.next_notification_time.map(format_instant),
                r.next_offset_index.map(|i| i as i64),
                r.status.to_string(),
                serde_json::to_string(&r.selected_emojis)?,
                r.hide_next_time,
                r.claimed_at.map(format_instant),
                format_instant(r.created_at),
                format_instant(r.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        let conn = self.lock();
        let reminder = conn
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                [id],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }

    async fn update(&self, r: &Reminder) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status: Option<String> = tx
            .query_row("SELECT status FROM reminders WHERE id = ?1", [&r.id], |row| {
                row.get(0)
            })
            .optional()?;
        match status.as_deref() {
            None => return Err(SchedulerError::ReminderNotFound { id: r.id.clone() }),
            Some("processing") => {
                return Err(SchedulerError::InvalidReminder(format!(
                    "reminder {} is being processed; retry shortly",
                    r.id
                )))
            }
            Some(_) => {}
        }
        tx.execute(
            "UPDATE reminders SET
                message = ?2, channel_id = ?3, channel_name = ?4, start_time = ?5,
                recurrence = ?6, notification_offsets = ?7, next_notification_time = ?8,
                next_offset_index = ?9, status = ?10, selected_emojis = ?11,
                hide_next_time = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                r.id,
                r.message,
                r.channel_id,
                r.channel_name,
                r.start_time,
                serde_json::to_string(&r.recurrence)?,
                serde_json::to_string(&r.notification_offsets)?,
                r.next_notification_time.map(format_instant),
                r.next_offset_index.map(|i| i as i64),
                r.status.to_string(),
                serde_json::to_string(&r.selected_emojis)?,
                r.hide_next_time,
                format_instant(r.updated_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM reminders WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn list_for_server(&self, server_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE server_id = ?1 ORDER BY created_at"
        ))?;
        let reminders = stmt
            .query_map([server_id], row_to_reminder)?
            .filter_map(|r| match r {
                Ok(reminder) => Some(reminder),
                Err(e) => {
                    warn!(%server_id, "skipping unreadable reminder row: {e}");
                    None
                }
            })
            .collect();
        Ok(reminders)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.lock();
        let rows: Vec<(String, rusqlite::Result<Reminder>)> = {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {REMINDER_COLUMNS} FROM reminders
                 WHERE status = 'active'
                   AND next_notification_time IS NOT NULL
                   AND next_notification_time <= ?1
                 ORDER BY next_notification_time"
            ))?;
            let rows = stmt
                .query_map([format_instant(now)], |row| {
                    Ok((row.get::<_, String>(0)?, row_to_reminder(row)))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut due = Vec::with_capacity(rows.len());
        for (id, decoded) in rows {
            match decoded {
                Ok(reminder) => due.push(reminder),
                Err(e) => {
                    // Undecodable rows would match this query forever.
                    error!(reminder_id = %id, "corrupt reminder row, pausing: {e}");
                    conn.execute(
                        "UPDATE reminders SET status = 'paused',
                            next_notification_time = NULL, next_offset_index = NULL,
                            updated_at = ?2
                         WHERE id = ?1",
                        params![id, format_instant(now)],
                    )?;
                }
            }
        }
        Ok(due)
    }

    async fn next_due_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock();
        let next: Option<String> = conn.query_row(
            "SELECT MIN(next_notification_time) FROM reminders
             WHERE status = 'active' AND next_notification_time IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(next.as_deref().and_then(crate::schedule::parse_anchor))
    }

    async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Reminder>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_str = format_instant(now);
        // A rival may already have sent this occurrence and moved the row on;
        // only a still-active row whose notification is due can be claimed.
        let claimable: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM reminders
                 WHERE id = ?1 AND status = 'active'
                   AND next_notification_time IS NOT NULL
                   AND next_notification_time <= ?2",
                params![id, now_str],
                |row| row.get(0),
            )
            .optional()?;
        if claimable.is_none() {
            // Dropping the transaction rolls it back.
            return Ok(None);
        }

        tx.execute(
            "UPDATE reminders SET status = 'processing', claimed_at = ?2, updated_at = ?2
             WHERE id = ?1",
            params![id, now_str],
        )?;
        let reminder = tx.query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
            [id],
            row_to_reminder,
        )?;
        tx.commit()?;
        Ok(Some(reminder))
    }

    async fn release(&self, id: &str, next: &NextState, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        let now_str = format_instant(now);
        let n = match next {
            NextState::Scheduled {
                at,
                offset_index,
                start_time,
            } => conn.execute(
                "UPDATE reminders SET status = 'active',
                    next_notification_time = ?2, next_offset_index = ?3,
                    start_time = COALESCE(?4, start_time),
                    claimed_at = NULL, updated_at = ?5
                 WHERE id = ?1 AND status = 'processing'",
                params![
                    id,
                    format_instant(*at),
                    *offset_index as i64,
                    start_time,
                    now_str
                ],
            )?,
            NextState::Paused => conn.execute(
                "UPDATE reminders SET status = 'paused',
                    next_notification_time = NULL, next_offset_index = NULL,
                    claimed_at = NULL, updated_at = ?2
                 WHERE id = ?1 AND status = 'processing'",
                params![id, now_str],
            )?,
        };
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn reclaim_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE reminders SET status = ?1, claimed_at = NULL, updated_at = ?3
             WHERE status = 'processing'
               AND (claimed_at IS NULL OR claimed_at < ?2)",
            params![
                ReminderStatus::Active.to_string(),
                format_instant(claimed_before),
                format_instant(now)
            ],
        )?;
        Ok(n)
    }

    async fn record_missed(&self, m: &MissedNotification) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!("INSERT INTO missed_notifications ({MISSED_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6)"),
            params![
                m.id,
                m.server_id,
                m.message,
                format_instant(m.missed_at),
                m.channel_name,
                m.acknowledged
            ],
        )?;
        Ok(())
    }

    async fn trim_missed(&self, server_id: &str, keep: usize) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM missed_notifications
             WHERE server_id = ?1
               AND id NOT IN (
                   SELECT id FROM missed_notifications
                   WHERE server_id = ?1
                   ORDER BY missed_at DESC, id DESC
                   LIMIT ?2
               )",
            params![server_id, keep as i64],
        )?;
        Ok(n)
    }

    async fn trim_missed_global(&self, keep: usize) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM missed_notifications
             WHERE id NOT IN (
                 SELECT id FROM missed_notifications
                 ORDER BY missed_at DESC, id DESC
                 LIMIT ?1
             )",
            params![keep as i64],
        )?;
        Ok(n)
    }

    async fn list_missed(&self, server_id: &str) -> Result<Vec<MissedNotification>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MISSED_COLUMNS} FROM missed_notifications
             WHERE server_id = ?1 ORDER BY missed_at DESC, id DESC"
        ))?;
        let missed = stmt
            .query_map([server_id], row_to_missed)?
            .filter_map(|r| match r {
                Ok(missed) => Some(missed),
                Err(e) => {
                    warn!(%server_id, "skipping unreadable missed-notification row: {e}");
                    None
                }
            })
            .collect();
        Ok(missed)
    }

    async fn acknowledge_missed(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE missed_notifications SET acknowledged = 1 WHERE id = ?1",
            [id],
        )?;
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id: id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Recurrence;
    use chrono::Duration;

    pub(crate) fn ts(s: &str) -> DateTime<Utc> {
        crate::schedule::parse_anchor(s).unwrap()
    }

    pub(crate) fn memory_store() -> SqliteReminderStore {
        SqliteReminderStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    pub(crate) fn sample(id: &str, next: Option<&str>) -> Reminder {
        let created = ts("2025-01-01T00:00:00Z");
        Reminder {
            id: id.to_string(),
            server_id: "guild-1".to_string(),
            message: format!("reminder {id}"),
            channel_id: "1001".to_string(),
            channel_name: "raids".to_string(),
            start_time: "2025-01-01T09:00:00Z".to_string(),
            recurrence: Recurrence::Daily,
            notification_offsets: vec![0],
            next_notification_time: next.map(ts),
            next_offset_index: next.map(|_| 0),
            status: if next.is_some() {
                ReminderStatus::Active
            } else {
                ReminderStatus::Paused
            },
            selected_emojis: vec!["\u{2705}".to_string()],
            hide_next_time: false,
            claimed_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn missed(id: &str, server: &str, at: &str) -> MissedNotification {
        MissedNotification {
            id: id.to_string(),
            server_id: server.to_string(),
            message: "late".to_string(),
            missed_at: ts(at),
            channel_name: "raids".to_string(),
            acknowledged: false,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip_fields() {
        let store = memory_store();
        let mut r = sample("a", Some("2025-01-02T09:00:00Z"));
        r.recurrence = Recurrence::Interval { hours: 3 };
        r.notification_offsets = vec![60, 10, 0];
        r.next_offset_index = Some(2);
        r.hide_next_time = true;
        store.insert(&r).await.unwrap();

        let back = store.get("a").await.unwrap().unwrap();
        assert_eq!(back.recurrence, Recurrence::Interval { hours: 3 });
        assert_eq!(back.notification_offsets, vec![60, 10, 0]);
        assert_eq!(back.next_notification_time, r.next_notification_time);
        assert_eq!(back.next_offset_index, Some(2));
        assert!(back.hide_next_time);
        assert_eq!(back.selected_emojis, r.selected_emojis);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_returns_only_active_past_reminders_in_order() {
        let store = memory_store();
        store.insert(&sample("late", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        store.insert(&sample("early", Some("2025-01-01T07:00:00Z"))).await.unwrap();
        store.insert(&sample("future", Some("2025-01-01T10:00:00Z"))).await.unwrap();
        store.insert(&sample("paused", None)).await.unwrap();

        let due = store.due(ts("2025-01-01T09:00:00Z")).await.unwrap();
        let ids: Vec<_> = due.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        assert_eq!(
            store.next_due_time().await.unwrap(),
            Some(ts("2025-01-01T07:00:00Z"))
        );
    }

    #[tokio::test]
    async fn due_pauses_corrupt_rows() {
        let store = memory_store();
        store.insert(&sample("bad", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        store
            .lock()
            .execute("UPDATE reminders SET recurrence = '{oops' WHERE id = 'bad'", [])
            .unwrap();

        assert!(store.due(ts("2025-01-01T09:00:00Z")).await.unwrap().is_empty());
        let status: String = store
            .lock()
            .query_row("SELECT status FROM reminders WHERE id = 'bad'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "paused");
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = memory_store();
        store.insert(&sample("a", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        let now = ts("2025-01-01T09:00:00Z");

        let (first, second) = tokio::join!(store.claim("a", now), store.claim("a", now));
        let winners = [first.unwrap(), second.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);

        let claimed = store.get("a").await.unwrap().unwrap();
        assert_eq!(claimed.status, ReminderStatus::Processing);
        assert_eq!(claimed.claimed_at, Some(now));
        assert!(store.due(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claims_are_exclusive_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.db");
        let a = SqliteReminderStore::new(Connection::open(&path).unwrap()).unwrap();
        let b = SqliteReminderStore::new(Connection::open(&path).unwrap()).unwrap();
        a.insert(&sample("r", Some("2025-01-01T08:00:00Z"))).await.unwrap();

        let now = ts("2025-01-01T09:00:00Z");
        assert!(a.claim("r", now).await.unwrap().is_some());
        assert!(b.claim("r", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_paused_and_missing() {
        let store = memory_store();
        store.insert(&sample("p", None)).await.unwrap();
        let now = ts("2025-01-01T09:00:00Z");
        assert!(store.claim("p", now).await.unwrap().is_none());
        assert!(store.claim("nope", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_refuses_occurrence_already_moved_on() {
        let store = memory_store();
        store.insert(&sample("a", Some("2025-01-01T09:00:00Z"))).await.unwrap();
        let now = ts("2025-01-01T09:01:00Z");

        store.claim("a", now).await.unwrap().unwrap();
        let tomorrow = NextState::Scheduled {
            at: ts("2025-01-02T09:00:00Z"),
            offset_index: 0,
            start_time: None,
        };
        store.release("a", &tomorrow, now).await.unwrap();

        // Active again, but not due until tomorrow.
        assert!(store.claim("a", now).await.unwrap().is_none());
        let back = store.get("a").await.unwrap().unwrap();
        assert_eq!(back.status, ReminderStatus::Active);
        assert!(back.claimed_at.is_none());
        assert!(store
            .claim("a", ts("2025-01-02T09:00:00Z"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn release_writes_next_state() {
        let store = memory_store();
        let mut r = sample("i", Some("2025-01-01T08:00:00Z"));
        r.recurrence = Recurrence::Interval { hours: 2 };
        store.insert(&r).await.unwrap();
        let now = ts("2025-01-01T08:00:30Z");
        store.claim("i", now).await.unwrap().unwrap();

        let next = NextState::Scheduled {
            at: ts("2025-01-01T10:00:00Z"),
            offset_index: 0,
            start_time: Some("2025-01-01T08:00:00.000Z".to_string()),
        };
        store.release("i", &next, now).await.unwrap();

        let back = store.get("i").await.unwrap().unwrap();
        assert_eq!(back.status, ReminderStatus::Active);
        assert_eq!(back.next_notification_time, Some(ts("2025-01-01T10:00:00Z")));
        assert_eq!(back.start_time, "2025-01-01T08:00:00.000Z");
        assert!(back.claimed_at.is_none());

        // Releasing an unclaimed reminder is refused.
        assert!(store.release("i", &NextState::Paused, now).await.is_err());
    }

    #[tokio::test]
    async fn release_to_paused_clears_schedule() {
        let store = memory_store();
        store.insert(&sample("o", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        let now = ts("2025-01-01T08:01:00Z");
        store.claim("o", now).await.unwrap().unwrap();
        store.release("o", &NextState::Paused, now).await.unwrap();

        let back = store.get("o").await.unwrap().unwrap();
        assert_eq!(back.status, ReminderStatus::Paused);
        assert!(back.next_notification_time.is_none());
        assert!(back.next_offset_index.is_none());
    }

    #[tokio::test]
    async fn update_refuses_claimed_reminder() {
        let store = memory_store();
        let r = sample("u", Some("2025-01-01T08:00:00Z"));
        store.insert(&r).await.unwrap();
        store.claim("u", ts("2025-01-01T08:00:00Z")).await.unwrap();

        let err = store.update(&r).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidReminder(_)));
        let err = store.update(&sample("ghost", None)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ReminderNotFound { .. }));
    }

    #[tokio::test]
    async fn stale_claims_are_reclaimed() {
        let store = memory_store();
        store.insert(&sample("s", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        store.insert(&sample("f", Some("2025-01-01T08:00:00Z"))).await.unwrap();
        let claimed = ts("2025-01-01T08:00:00Z");
        store.claim("s", claimed).await.unwrap();
        store.claim("f", claimed + Duration::minutes(20)).await.unwrap();

        let n = store
            .reclaim_stale(claimed + Duration::minutes(10), claimed + Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.get("s").await.unwrap().unwrap().status,
            ReminderStatus::Active
        );
        assert_eq!(
            store.get("f").await.unwrap().unwrap().status,
            ReminderStatus::Processing
        );
    }

    #[tokio::test]
    async fn trimming_keeps_newest_records() {
        let store = memory_store();
        for i in 0..5 {
            let at = format!("2025-01-01T0{i}:00:00Z");
            store
                .record_missed(&missed(&format!("m{i}"), "guild-1", &at))
                .await
                .unwrap();
        }
        store
            .record_missed(&missed("other", "guild-2", "2025-01-02T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(store.trim_missed("guild-1", 2).await.unwrap(), 3);
        let kept: Vec<_> = store
            .list_missed("guild-1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(kept, vec!["m4", "m3"]);
        assert_eq!(store.list_missed("guild-2").await.unwrap().len(), 1);

        assert_eq!(store.trim_missed_global(1).await.unwrap(), 2);
        assert!(store.list_missed("guild-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_missed_rows_are_skipped() {
        let store = memory_store();
        store
            .record_missed(&missed("ok", "guild-1", "2025-01-01T08:00:00Z"))
            .await
            .unwrap();
        store
            .record_missed(&missed("bad", "guild-1", "2025-01-01T09:00:00Z"))
            .await
            .unwrap();
        store
            .lock()
            .execute(
                "UPDATE missed_notifications SET missed_at = 'garbage' WHERE id = 'bad'",
                [],
            )
            .unwrap();

        let listed = store.list_missed("guild-1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[tokio::test]
    async fn acknowledge_marks_record() {
        let store = memory_store();
        store
            .record_missed(&missed("m", "guild-1", "2025-01-01T00:00:00Z"))
            .await
            .unwrap();
        store.acknowledge_missed("m").await.unwrap();
        assert!(store.list_missed("guild-1").await.unwrap()[0].acknowledged);
        assert!(store.acknowledge_missed("nope").await.is_err());
    }
}
