use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// How often a reminder repeats.
///
/// Daily and weekly rules take their time of day (UTC) from the reminder's
/// `start_time`; interval rules count whole hours from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Fire once at `start_time`.
    None,
    /// Fire every day at the anchor's HH:MM.
    Daily,
    /// Fire at the anchor's HH:MM on each listed weekday.
    Weekly { days: Vec<Weekday> },
    /// Fire every `hours` hours counted from the anchor.
    Interval { hours: u32 },
}

/// Lifecycle state of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Waiting for `next_notification_time`.
    Active,
    /// No further occurrences, or stopped by a user.
    Paused,
    /// Claimed by a processor; transient.
    Processing,
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReminderStatus::Active => "active",
            ReminderStatus::Paused => "paused",
            ReminderStatus::Processing => "processing",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReminderStatus::Active),
            "paused" => Ok(ReminderStatus::Paused),
            "processing" => Ok(ReminderStatus::Processing),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

/// A persisted reminder definition plus its scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    /// UUID v4 string — primary key.
    pub id: String,
    /// Owning server (guild) ID.
    pub server_id: String,
    /// Message template; may contain `{{all}}` and `{{offset}}`.
    pub message: String,
    pub channel_id: String,
    pub channel_name: String,
    /// RFC 3339 anchor. Kept as text so a corrupt value reaches the
    /// calculator, which treats it as "no occurrence".
    pub start_time: String,
    pub recurrence: Recurrence,
    /// Minutes before each cycle time, sorted descending, never empty.
    pub notification_offsets: Vec<u32>,
    /// Next dispatch instant, already offset-adjusted. `None` iff paused.
    pub next_notification_time: Option<DateTime<Utc>>,
    /// Which entry of `notification_offsets` the next dispatch is for.
    pub next_offset_index: Option<usize>,
    pub status: ReminderStatus,
    /// Reactions attached to the sent message (unicode or `<:name:id>`).
    pub selected_emojis: Vec<String>,
    /// Suppress the "next occurrence" footer.
    pub hide_next_time: bool,
    /// When the current claim was taken; only set while `Processing`.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Minutes of the offset the pending notification is for.
    pub fn current_offset(&self) -> Option<u32> {
        self.next_offset_index
            .and_then(|i| self.notification_offsets.get(i).copied())
    }
}

/// Fields supplied by the CRUD layer when creating or editing a reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderDraft {
    pub server_id: String,
    pub message: String,
    pub channel_id: String,
    pub channel_name: String,
    pub start_time: String,
    pub recurrence: Recurrence,
    /// Raw offsets as entered; normalised by [`normalize_offsets`].
    #[serde(default)]
    pub notification_offsets: Vec<i64>,
    #[serde(default)]
    pub selected_emojis: Vec<String>,
    #[serde(default)]
    pub hide_next_time: bool,
}

/// Scheduling state written back when a claim is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextState {
    /// Another notification is due; reminder returns to `Active`.
    Scheduled {
        at: DateTime<Utc>,
        offset_index: usize,
        /// Replacement anchor (interval rules advance it every cycle).
        start_time: Option<String>,
    },
    /// No further occurrences; reminder becomes `Paused`.
    Paused,
}

/// Audit record for a due notification that was too stale to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedNotification {
    pub id: String,
    pub server_id: String,
    pub message: String,
    pub missed_at: DateTime<Utc>,
    pub channel_name: String,
    pub acknowledged: bool,
}

/// Drop negative offsets, sort descending, dedupe, and default to `[0]`.
pub fn normalize_offsets(raw: &[i64]) -> Vec<u32> {
    let mut offsets: Vec<u32> = raw
        .iter()
        .filter_map(|&m| u32::try_from(m).ok())
        .collect();
    offsets.sort_unstable_by(|a, b| b.cmp(a));
    offsets.dedup();
    if offsets.is_empty() {
        offsets.push(0);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_sorted_descending_and_deduped() {
        assert_eq!(normalize_offsets(&[0, 60, 10, 60]), vec![60, 10, 0]);
    }

    #[test]
    fn negative_offsets_are_dropped() {
        assert_eq!(normalize_offsets(&[-5, 15]), vec![15]);
    }

    #[test]
    fn empty_offsets_default_to_on_time() {
        assert_eq!(normalize_offsets(&[]), vec![0]);
        assert_eq!(normalize_offsets(&[-1]), vec![0]);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReminderStatus::Active,
            ReminderStatus::Paused,
            ReminderStatus::Processing,
        ] {
            assert_eq!(status.to_string().parse::<ReminderStatus>(), Ok(status));
        }
        assert!("done".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn recurrence_json_is_tagged() {
        let weekly = Recurrence::Weekly {
            days: vec![Weekday::Mon, Weekday::Fri],
        };
        let json = serde_json::to_string(&weekly).unwrap();
        assert!(json.contains("\"kind\":\"weekly\""));
        let back: Recurrence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, weekly);
    }
}
