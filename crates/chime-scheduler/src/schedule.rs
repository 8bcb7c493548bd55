//! Occurrence calculator — pure recurrence and pre-alert offset math.
//!
//! A *cycle time* is the raw recurrence instant; each entry of a reminder's
//! `notification_offsets` yields one notification `cycle - offset` minutes.
//! Nothing in here performs I/O or reads the clock.

use chrono::{DateTime, Datelike, Duration, SecondsFormat, Timelike, Utc};

use crate::types::{NextState, Recurrence, Reminder};

/// Upper bound on cycles enumerated by [`upcoming_cycles`].
const MAX_UPCOMING: usize = 96;

/// Beyond this year [`format_instant`] switches to a signed, 5+ digit year
/// that neither sorts nor parses like the rest of the stored timestamps.
pub const LAST_STORABLE_YEAR: i32 = 9999;

/// A scheduled notification: the instant and which offset it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub at: DateTime<Utc>,
    pub offset_index: usize,
}

/// Parse an RFC 3339 anchor into UTC. Any failure means "no occurrence".
pub fn parse_anchor(start_time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(start_time)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Canonical text form used for every stored timestamp.
///
/// Fixed millisecond precision with a `Z` suffix keeps lexicographic order
/// equal to chronological order, which the due query relies on.
pub fn format_instant(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decide the first notification at or after `now` for a freshly created or
/// edited reminder.
///
/// Returns `None` when the anchor is invalid, the rule has no further cycle,
/// or every offset of the upcoming cycle has already passed. In the last case
/// the caller must not skip ahead to the following cycle.
pub fn compute_initial(reminder: &Reminder, now: DateTime<Utc>) -> Option<Occurrence> {
    let anchor = parse_anchor(&reminder.start_time)?;
    let cycle = next_cycle_time(&reminder.recurrence, anchor, now)?;
    first_pending_offset(cycle, &reminder.notification_offsets, now)
}

/// Next raw recurrence instant for `recurrence` relative to `now`.
///
/// `Recurrence::None` accepts `anchor == now`; every repeating rule returns an
/// instant strictly after `now`. Cycles past [`LAST_STORABLE_YEAR`] are `None`.
pub fn next_cycle_time(
    recurrence: &Recurrence,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    raw_next_cycle(recurrence, anchor, now).filter(|&cycle| storable(cycle))
}

fn raw_next_cycle(
    recurrence: &Recurrence,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::None => (anchor >= now).then_some(anchor),

        Recurrence::Daily => {
            let candidate = at_anchor_time(anchor.max(now), anchor)?;
            if candidate > now {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(1))
            }
        }

        Recurrence::Interval { hours } => {
            let step_ms = interval_ms(*hours)?;
            if anchor > now {
                return Some(anchor);
            }
            // Jump straight to the first multiple past `now` instead of
            // stepping one interval at a time.
            let elapsed_ms = (now - anchor).num_milliseconds();
            let steps = elapsed_ms / step_ms + 1;
            anchor.checked_add_signed(Duration::milliseconds(steps.checked_mul(step_ms)?))
        }

        Recurrence::Weekly { days } => {
            if days.is_empty() {
                return None;
            }
            let mut candidate = at_anchor_time(anchor.max(now), anchor)?;
            if candidate <= now {
                candidate += Duration::days(1);
            }
            scan_week(candidate, days)
        }
    }
}

/// State to persist once the notification at
/// `(next_notification_time, next_offset_index)` has been dispatched or missed.
pub fn compute_after_dispatch(reminder: &Reminder) -> NextState {
    let (Some(at), Some(index)) = (reminder.next_notification_time, reminder.next_offset_index)
    else {
        return NextState::Paused;
    };
    let offsets = &reminder.notification_offsets;
    let Some(&current) = offsets.get(index) else {
        return NextState::Paused;
    };
    let cycle_base = at + minutes(current);

    // Further pre-alerts remain in this cycle.
    if let Some(&next) = offsets.get(index + 1) {
        return NextState::Scheduled {
            at: cycle_base - minutes(next),
            offset_index: index + 1,
            start_time: None,
        };
    }

    let Some(anchor) = parse_anchor(&reminder.start_time) else {
        return NextState::Paused;
    };
    let Some(next_cycle) = following_cycle(&reminder.recurrence, anchor, cycle_base) else {
        return NextState::Paused;
    };
    let first = offsets.first().copied().unwrap_or(0);

    // Interval anchors move to each completed cycle.
    let start_time = match reminder.recurrence {
        Recurrence::Interval { .. } => Some(format_instant(cycle_base)),
        Recurrence::None | Recurrence::Daily | Recurrence::Weekly { .. } => None,
    };

    NextState::Scheduled {
        at: next_cycle - minutes(first),
        offset_index: 0,
        start_time,
    }
}

/// The cycle after `cycle_base` for a repeating rule.
pub fn following_cycle(
    recurrence: &Recurrence,
    anchor: DateTime<Utc>,
    cycle_base: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    raw_following_cycle(recurrence, anchor, cycle_base).filter(|&cycle| storable(cycle))
}

fn raw_following_cycle(
    recurrence: &Recurrence,
    anchor: DateTime<Utc>,
    cycle_base: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::None => None,
        Recurrence::Daily => at_anchor_time(cycle_base + Duration::days(1), anchor),
        Recurrence::Interval { hours } => {
            let step_ms = interval_ms(*hours)?;
            cycle_base.checked_add_signed(Duration::milliseconds(step_ms))
        }
        Recurrence::Weekly { days } => {
            if days.is_empty() {
                return None;
            }
            let candidate = at_anchor_time(cycle_base + Duration::days(1), anchor)?;
            scan_week(candidate, days)
        }
    }
}

/// Cycle instants in `[now, until]`, capped at a fixed count.
pub fn upcoming_cycles(
    recurrence: &Recurrence,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut cycles = Vec::new();
    let mut next = next_cycle_time(recurrence, anchor, now);
    while let Some(cycle) = next {
        if cycle > until || cycles.len() >= MAX_UPCOMING {
            break;
        }
        cycles.push(cycle);
        next = following_cycle(recurrence, anchor, cycle);
    }
    cycles
}

/// Cycle time a scheduled notification belongs to.
pub fn cycle_of(at: DateTime<Utc>, offsets: &[u32], offset_index: usize) -> DateTime<Utc> {
    at + minutes(offsets.get(offset_index).copied().unwrap_or(0))
}

fn first_pending_offset(
    cycle: DateTime<Utc>,
    offsets: &[u32],
    now: DateTime<Utc>,
) -> Option<Occurrence> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &m)| Occurrence {
            at: cycle - minutes(m),
            offset_index: i,
        })
        .find(|o| o.at > now)
}

/// `day`'s date at the anchor's hour and minute (UTC, seconds zeroed).
fn at_anchor_time(day: DateTime<Utc>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    day.date_naive()
        .and_hms_opt(anchor.hour(), anchor.minute(), 0)
        .map(|naive| naive.and_utc())
}

/// First day in `[start, start + 6 days]` whose weekday is listed.
fn scan_week(start: DateTime<Utc>, days: &[chrono::Weekday]) -> Option<DateTime<Utc>> {
    (0..7)
        .map(|i| start + Duration::days(i))
        .find(|d| days.contains(&d.weekday()))
}

/// Whether `at` keeps the four-digit form of [`format_instant`].
pub fn storable(at: DateTime<Utc>) -> bool {
    (0..=LAST_STORABLE_YEAR).contains(&at.year())
}

fn interval_ms(hours: u32) -> Option<i64> {
    (hours > 0).then(|| i64::from(hours) * 3_600_000)
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(i64::from(m))
}
