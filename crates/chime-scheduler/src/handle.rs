use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    clock::WallClock,
    error::{Result, SchedulerError},
    schedule::{compute_initial, next_cycle_time, parse_anchor, Occurrence},
    store::ReminderStore,
    types::{
        normalize_offsets, MissedNotification, Recurrence, Reminder, ReminderDraft,
        ReminderStatus,
    },
};

/// Longest accepted interval: ten years of hours.
pub const MAX_INTERVAL_HOURS: u32 = 24 * 366 * 10;

/// Reminder management for request handlers (create/edit/pause/...).
///
/// Shares the processor's store but never claims; every write that touches
/// the schedule goes through [`compute_initial`].
pub struct ReminderHandle {
    store: Arc<dyn ReminderStore>,
    wall: Arc<dyn WallClock>,
}

impl ReminderHandle {
    pub fn new(store: Arc<dyn ReminderStore>, wall: Arc<dyn WallClock>) -> Self {
        Self { store, wall }
    }

    pub async fn create(&self, draft: ReminderDraft) -> Result<Reminder> {
        validate(&draft)?;
        let now = self.wall.now();
        let mut reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            server_id: draft.server_id,
            message: draft.message,
            channel_id: draft.channel_id,
            channel_name: draft.channel_name,
            start_time: draft.start_time,
            recurrence: draft.recurrence,
            notification_offsets: normalize_offsets(&draft.notification_offsets),
            next_notification_time: None,
            next_offset_index: None,
            status: ReminderStatus::Paused,
            selected_emojis: draft.selected_emojis,
            hide_next_time: draft.hide_next_time,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        schedule_from(&mut reminder, now);
        self.store.insert(&reminder).await?;
        info!(
            reminder_id = %reminder.id,
            server_id = %reminder.server_id,
            status = %reminder.status,
            "reminder created"
        );
        Ok(reminder)
    }

    /// Replace a reminder's definition and recompute its schedule.
    pub async fn edit(&self, id: &str, draft: ReminderDraft) -> Result<Reminder> {
        validate(&draft)?;
        let mut reminder = self.require(id).await?;
        if reminder.server_id != draft.server_id {
            return Err(SchedulerError::InvalidReminder(
                "reminder belongs to a different server".to_string(),
            ));
        }
        let now = self.wall.now();
        reminder.message = draft.message;
        reminder.channel_id = draft.channel_id;
        reminder.channel_name = draft.channel_name;
        reminder.start_time = draft.start_time;
        reminder.recurrence = draft.recurrence;
        reminder.notification_offsets = normalize_offsets(&draft.notification_offsets);
        reminder.selected_emojis = draft.selected_emojis;
        reminder.hide_next_time = draft.hide_next_time;
        reminder.updated_at = now;
        let was_paused = reminder.status == ReminderStatus::Paused;
        if was_paused {
            unschedule(&mut reminder);
        } else {
            schedule_from(&mut reminder, now);
        }
        self.store.update(&reminder).await?;
        info!(reminder_id = %id, status = %reminder.status, "reminder edited");
        Ok(reminder)
    }

    pub async fn pause(&self, id: &str) -> Result<Reminder> {
        let mut reminder = self.require(id).await?;
        unschedule(&mut reminder);
        reminder.updated_at = self.wall.now();
        self.store.update(&reminder).await?;
        info!(reminder_id = %id, "reminder paused");
        Ok(reminder)
    }

    /// Reactivate from "now"; a resumed reminder never replays past cycles.
    pub async fn resume(&self, id: &str) -> Result<Reminder> {
        let mut reminder = self.require(id).await?;
        let now = self.wall.now();
        schedule_from(&mut reminder, now);
        reminder.updated_at = now;
        self.store.update(&reminder).await?;
        info!(reminder_id = %id, status = %reminder.status, "reminder resumed");
        Ok(reminder)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        info!(reminder_id = %id, "reminder deleted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        self.store.get(id).await
    }

    pub async fn list(&self, server_id: &str) -> Result<Vec<Reminder>> {
        self.store.list_for_server(server_id).await
    }

    pub async fn missed(&self, server_id: &str) -> Result<Vec<MissedNotification>> {
        self.store.list_missed(server_id).await
    }

    pub async fn acknowledge(&self, missed_id: &str) -> Result<()> {
        self.store.acknowledge_missed(missed_id).await
    }

    async fn require(&self, id: &str) -> Result<Reminder> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::ReminderNotFound { id: id.to_string() })
    }
}

fn validate(draft: &ReminderDraft) -> Result<()> {
    if draft.message.trim().is_empty() {
        return Err(SchedulerError::InvalidReminder("message is empty".to_string()));
    }
    if draft.channel_id.trim().is_empty() {
        return Err(SchedulerError::InvalidReminder("channel is required".to_string()));
    }
    if parse_anchor(&draft.start_time).is_none() {
        return Err(SchedulerError::InvalidReminder(format!(
            "start time {:?} is not an RFC 3339 timestamp",
            draft.start_time
        )));
    }
    if let Recurrence::Interval { hours } = draft.recurrence {
        if hours > MAX_INTERVAL_HOURS {
            return Err(SchedulerError::InvalidReminder(format!(
                "interval of {hours} hours exceeds the {MAX_INTERVAL_HOURS}-hour maximum"
            )));
        }
    }
    Ok(())
}

/// Populate the schedule from `now`.
///
/// When the upcoming cycle exists but all of its pre-alerts are already past,
/// the cycle's last pre-alert is stored as-is so the processor handles it on
/// its next poll instead of the cycle being skipped here.
fn schedule_from(reminder: &mut Reminder, now: DateTime<Utc>) {
    let planned = compute_initial(reminder, now).or_else(|| elapsed_cycle(reminder, now));
    match planned {
        Some(occ) => {
            reminder.next_notification_time = Some(occ.at);
            reminder.next_offset_index = Some(occ.offset_index);
            reminder.status = ReminderStatus::Active;
        }
        None => unschedule(reminder),
    }
}

fn elapsed_cycle(reminder: &Reminder, now: DateTime<Utc>) -> Option<Occurrence> {
    let anchor = parse_anchor(&reminder.start_time)?;
    let cycle = next_cycle_time(&reminder.recurrence, anchor, now)?;
    let last = reminder.notification_offsets.len().checked_sub(1)?;
    let minutes = reminder.notification_offsets[last];
    Some(Occurrence {
        at: cycle - chrono::Duration::minutes(i64::from(minutes)),
        offset_index: last,
    })
}

fn unschedule(reminder: &mut Reminder) {
    reminder.status = ReminderStatus::Paused;
    reminder.next_notification_time = None;
    reminder.next_offset_index = None;
}
