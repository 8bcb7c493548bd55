//! Turns a reminder template into the literal text that gets dispatched.
//!
//! | Placeholder  | Replaced with                                             |
//! |--------------|-----------------------------------------------------------|
//! | `{{offset}}` | `now`, `10 minutes before`, `1 hour before`, ...          |
//! | `{{all}}`    | other reminders of the server due inside the digest window |

use chrono::{DateTime, Duration, Utc};

use crate::schedule::{parse_anchor, upcoming_cycles};
use crate::types::{Reminder, ReminderStatus};

pub const OFFSET_PLACEHOLDER: &str = "{{offset}}";
pub const ALL_PLACEHOLDER: &str = "{{all}}";

/// Fullwidth commercial at; renders like `@` but never pings.
const SAFE_AT: &str = "\u{ff20}";

/// Everything [`compose`] needs besides the reminder itself.
pub struct MessageContext<'a> {
    /// Offset (minutes) of the notification being sent.
    pub offset_minutes: u32,
    /// Cycle time of the following notification, for the footer.
    pub next_cycle: Option<DateTime<Utc>>,
    /// Other reminders of the same server, for `{{all}}`.
    pub server_reminders: &'a [Reminder],
    pub now: DateTime<Utc>,
    pub digest_window: Duration,
}

/// Build the final message text for `reminder`.
pub fn compose(reminder: &Reminder, ctx: &MessageContext<'_>) -> String {
    let mut text = sanitize_mentions(&reminder.message);

    if text.contains(OFFSET_PLACEHOLDER) {
        text = text.replace(OFFSET_PLACEHOLDER, &offset_phrase(ctx.offset_minutes));
    }
    if text.contains(ALL_PLACEHOLDER) {
        let digest = digest(reminder, ctx.server_reminders, ctx.now, ctx.digest_window);
        text = text.replace(ALL_PLACEHOLDER, &digest);
    }

    if !reminder.hide_next_time {
        if let Some(next) = ctx.next_cycle {
            text.push_str(&footer(next));
        }
    }
    text
}

/// Defuse `@everyone`, `@here` and user/role mentions.
pub fn sanitize_mentions(text: &str) -> String {
    text.replace("@everyone", &format!("{SAFE_AT}everyone"))
        .replace("@here", &format!("{SAFE_AT}here"))
        .replace("<@", &format!("<{SAFE_AT}"))
}

/// Human phrase for a pre-alert offset.
pub fn offset_phrase(minutes: u32) -> String {
    match minutes {
        0 => "now".to_string(),
        m if m % 60 == 0 => {
            let hours = m / 60;
            format!("{hours} {} before", plural(hours, "hour"))
        }
        m => format!("{m} {} before", plural(m, "minute")),
    }
}

/// One line per event among the server's other reminders with a cycle in
/// `[now, now + window]`, earliest event first.
pub fn digest(
    current: &Reminder,
    server_reminders: &[Reminder],
    now: DateTime<Utc>,
    window: Duration,
) -> String {
    let until = now + window;
    let mut groups: Vec<(String, Vec<DateTime<Utc>>)> = Vec::new();

    for other in server_reminders {
        if other.id == current.id || other.status == ReminderStatus::Paused {
            continue;
        }
        let Some(anchor) = parse_anchor(&other.start_time) else {
            continue;
        };
        let cycles = upcoming_cycles(&other.recurrence, anchor, now, until);
        if cycles.is_empty() {
            continue;
        }
        let event = event_name(&other.message);
        match groups.iter_mut().find(|(name, _)| *name == event) {
            Some((_, times)) => times.extend(cycles),
            None => groups.push((event, cycles)),
        }
    }

    if groups.is_empty() {
        return format!(
            "No other reminders in the next {} hours.",
            window.num_hours()
        );
    }

    for (_, times) in &mut groups {
        times.sort();
        times.dedup();
    }
    groups.sort_by_key(|(_, times)| times[0]);

    groups
        .iter()
        .map(|(event, times)| {
            let when: Vec<String> = times
                .iter()
                .map(|t| format!("<t:{}:t>", t.timestamp()))
                .collect();
            format!("\u{2022} {}: {}", event, when.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Footer naming the next occurrence as Discord timestamps.
pub fn footer(next_cycle: DateTime<Utc>) -> String {
    let unix = next_cycle.timestamp();
    format!("\n\nNext: <t:{unix}:F> (<t:{unix}:R>)")
}

/// Template text without placeholders, used as the grouping key.
fn event_name(message: &str) -> String {
    let name = sanitize_mentions(
        message
            .replace(ALL_PLACEHOLDER, "")
            .replace(OFFSET_PLACEHOLDER, "")
            .trim(),
    );
    let name = name.lines().next().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        "Untitled reminder".to_string()
    } else {
        name
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Recurrence;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_anchor(s).unwrap()
    }

    fn reminder(id: &str, message: &str, start: &str, recurrence: Recurrence) -> Reminder {
        let created = ts("2025-01-01T00:00:00Z");
        Reminder {
            id: id.to_string(),
            server_id: "guild".to_string(),
            message: message.to_string(),
            channel_id: "1".to_string(),
            channel_name: "general".to_string(),
            start_time: start.to_string(),
            recurrence,
            notification_offsets: vec![0],
            next_notification_time: None,
            next_offset_index: None,
            status: ReminderStatus::Active,
            selected_emojis: Vec::new(),
            hide_next_time: false,
            claimed_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn ctx<'a>(others: &'a [Reminder], next: Option<DateTime<Utc>>) -> MessageContext<'a> {
        MessageContext {
            offset_minutes: 10,
            next_cycle: next,
            server_reminders: others,
            now: ts("2025-01-01T08:00:00Z"),
            digest_window: Duration::hours(24),
        }
    }

    #[test]
    fn mass_mentions_are_defused() {
        let out = sanitize_mentions("@everyone @here <@123> <@!456> <@&789>");
        assert!(!out.contains("@everyone"));
        assert!(!out.contains("@here"));
        assert!(!out.contains("<@"));
        assert!(out.contains("\u{ff20}everyone"));
        assert!(out.contains("<\u{ff20}&789>"));
    }

    #[test]
    fn offset_phrases() {
        assert_eq!(offset_phrase(0), "now");
        assert_eq!(offset_phrase(1), "1 minute before");
        assert_eq!(offset_phrase(10), "10 minutes before");
        assert_eq!(offset_phrase(60), "1 hour before");
        assert_eq!(offset_phrase(120), "2 hours before");
        assert_eq!(offset_phrase(90), "90 minutes before");
    }

    #[test]
    fn offset_placeholder_and_footer() {
        let r = reminder("a", "Raid starts {{offset}}", "2025-01-01T09:00:00Z", Recurrence::Daily);
        let next = ts("2025-01-02T09:00:00Z");
        let out = compose(&r, &ctx(&[], Some(next)));
        assert_eq!(
            out,
            format!(
                "Raid starts 10 minutes before\n\nNext: <t:{0}:F> (<t:{0}:R>)",
                next.timestamp()
            )
        );
    }

    #[test]
    fn hidden_footer_is_omitted() {
        let mut r = reminder("a", "Ping", "2025-01-01T09:00:00Z", Recurrence::Daily);
        r.hide_next_time = true;
        let out = compose(&r, &ctx(&[], Some(ts("2025-01-02T09:00:00Z"))));
        assert_eq!(out, "Ping");
    }

    #[test]
    fn digest_groups_by_event_and_skips_self() {
        let me = reminder("me", "Today: {{all}}", "2025-01-01T09:00:00Z", Recurrence::Daily);
        let others = vec![
            me.clone(),
            reminder("b1", "World boss {{offset}}", "2025-01-01T12:00:00Z", Recurrence::Daily),
            reminder(
                "b2",
                "World boss {{offset}}",
                "2025-01-01T20:00:00Z",
                Recurrence::Daily,
            ),
            reminder("g", "Guild war", "2025-01-01T10:00:00Z", Recurrence::None),
            reminder(
                "far",
                "Next week",
                "2025-01-08T10:00:00Z",
                Recurrence::None,
            ),
        ];
        let out = digest(&me, &others, ts("2025-01-01T08:00:00Z"), Duration::hours(24));
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\u{2022} Guild war: "));
        assert!(lines[1].starts_with("\u{2022} World boss: "));
        assert_eq!(lines[1].matches("<t:").count(), 2);
        assert!(!out.contains("Today"));
        assert!(!out.contains("Next week"));
    }

    #[test]
    fn empty_digest_says_so() {
        let me = reminder("me", "{{all}}", "2025-01-01T09:00:00Z", Recurrence::Daily);
        let out = compose(&me, &ctx(&[], None));
        assert_eq!(out, "No other reminders in the next 24 hours.");
    }
}
