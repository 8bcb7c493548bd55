use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chime_core::config::SchedulerConfig;
use chrono::{DateTime, Duration, Timelike, Utc};
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clock::{ClockCorrector, WallClock},
    compose::{compose, MessageContext, ALL_PLACEHOLDER},
    gateway::DispatchGateway,
    schedule::{compute_after_dispatch, cycle_of, parse_anchor},
    store::ReminderStore,
    types::{MissedNotification, NextState, Reminder},
};

/// Counts from one processing pass; logged and asserted on in tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The pass did not run because the previous one was still busy.
    pub skipped: bool,
    pub due: usize,
    /// Claims lost to another process or an earlier step.
    pub lost: usize,
    pub dispatched: usize,
    /// Claimed and on time, but the gateway failed.
    pub failed: usize,
    pub missed: usize,
    /// Reminders that ended the pass paused.
    pub paused: usize,
    pub reclaimed: usize,
}

enum Delivery {
    Sent,
    Failed,
    Missed,
    Corrupt,
}

enum Outcome {
    Lost,
    Error,
    Processed { delivery: Delivery, paused: bool },
}

/// Polls for due reminders and dispatches each occurrence at most once.
///
/// Built once at startup and shared behind an `Arc`. The only mutable state is
/// the single-flight flag and the clock offset.
pub struct ReminderProcessor {
    store: Arc<dyn ReminderStore>,
    gateway: Arc<dyn DispatchGateway>,
    clock: ClockCorrector,
    wall: Arc<dyn WallClock>,
    config: SchedulerConfig,
    checking: AtomicBool,
}

/// Clears the single-flight flag when a pass ends, including by panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReminderProcessor {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        gateway: Arc<dyn DispatchGateway>,
        clock: ClockCorrector,
        wall: Arc<dyn WallClock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            wall,
            config,
            checking: AtomicBool::new(false),
        }
    }

    /// Local time corrected by the last clock sync.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.corrected(self.wall.now())
    }

    /// Main loop. Ticks every `tick_interval` until `shutdown` broadcasts `true`.
    ///
    /// Each tick runs in its own task, so a slow pass overlaps the next tick and
    /// that tick is skipped by the single-flight guard rather than queued.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.config.tick_interval_secs,
            grace_secs = self.config.grace_period_secs,
            "reminder processor started"
        );

        if self.config.align_to_minute {
            let wait = until_next_minute(self.wall.now());
            debug!(wait_ms = wait.as_millis() as u64, "aligning first tick to minute boundary");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder processor shutting down");
                        return;
                    }
                }
            }
        }

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.tick().await;
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder processor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One processing pass over every due reminder.
    pub async fn tick(&self) -> TickReport {
        if self
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("previous tick still running; skipping this one");
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        }
        let _guard = TickGuard(&self.checking);

        let report = self.process_due().await;
        if report.due > 0 || report.reclaimed > 0 {
            info!(
                due = report.due,
                dispatched = report.dispatched,
                missed = report.missed,
                failed = report.failed,
                lost = report.lost,
                paused = report.paused,
                reclaimed = report.reclaimed,
                "tick complete"
            );
        }
        report
    }

    async fn process_due(&self) -> TickReport {
        let mut report = TickReport::default();

        let next_due = match self.store.next_due_time().await {
            Ok(next) => next,
            Err(e) => {
                warn!("next-due lookup failed: {e}");
                None
            }
        };
        self.clock.maybe_sync(self.wall.as_ref(), next_due).await;

        let now = self.now();
        if let Some(stale) = self.config.stale_claim() {
            let cutoff = now - Duration::from_std(stale).unwrap_or(Duration::zero());
            match self.store.reclaim_stale(cutoff, now).await {
                Ok(0) => {}
                Ok(n) => {
                    warn!(count = n, "reclaimed reminders stuck in processing");
                    report.reclaimed = n;
                }
                Err(e) => error!("stale-claim reclaim failed: {e}"),
            }
        }

        let due = match self.store.due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!("due-reminder query failed: {e}");
                return report;
            }
        };
        report.due = due.len();

        let outcomes = join_all(due.iter().map(|r| self.process(&r.id))).await;
        for outcome in outcomes {
            match outcome {
                Outcome::Lost => report.lost += 1,
                Outcome::Error => {}
                Outcome::Processed { delivery, paused } => {
                    match delivery {
                        Delivery::Sent => report.dispatched += 1,
                        Delivery::Failed => report.failed += 1,
                        Delivery::Missed => report.missed += 1,
                        Delivery::Corrupt => {}
                    }
                    if paused {
                        report.paused += 1;
                    }
                }
            }
        }

        if report.missed > 0 {
            if let Err(e) = self.store.trim_missed_global(self.config.missed_global).await {
                warn!("global missed-notification trim failed: {e}");
            }
        }
        report
    }

    /// Claim, dispatch or record as missed, then release with the next state.
    async fn process(&self, id: &str) -> Outcome {
        let reminder = match self.store.claim(id, self.now()).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                debug!(reminder_id = %id, "claim lost; skipping");
                return Outcome::Lost;
            }
            Err(e) => {
                error!(reminder_id = %id, "claim failed: {e}");
                return Outcome::Error;
            }
        };

        let Some(due_at) = schedulable(&reminder) else {
            error!(
                reminder_id = %reminder.id,
                start_time = %reminder.start_time,
                "reminder has corrupt scheduling data; pausing"
            );
            self.release(&reminder, &NextState::Paused).await;
            return Outcome::Processed {
                delivery: Delivery::Corrupt,
                paused: true,
            };
        };

        let now = self.now();
        if due_at > now {
            // Not due after all; put the row back untouched.
            debug!(reminder_id = %reminder.id, due_at = %due_at, "claimed before due; releasing");
            let unchanged = NextState::Scheduled {
                at: due_at,
                offset_index: reminder.next_offset_index.unwrap_or(0),
                start_time: None,
            };
            self.release(&reminder, &unchanged).await;
            return Outcome::Lost;
        }

        let next = compute_after_dispatch(&reminder);
        let missed_by = now - due_at;
        let grace = Duration::from_std(self.config.grace_period()).unwrap_or(Duration::MAX);

        let delivery = if missed_by < grace {
            self.dispatch(&reminder, &next, now).await
        } else {
            self.record_missed(&reminder, due_at, missed_by).await;
            Delivery::Missed
        };

        self.release(&reminder, &next).await;
        Outcome::Processed {
            delivery,
            paused: next == NextState::Paused,
        }
    }

    async fn dispatch(&self, reminder: &Reminder, next: &NextState, now: DateTime<Utc>) -> Delivery {
        let channel = match self.gateway.fetch_channel(&reminder.channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(
                    reminder_id = %reminder.id,
                    channel_id = %reminder.channel_id,
                    error = %e,
                    "dispatch skipped: channel unavailable"
                );
                return Delivery::Failed;
            }
        };

        let server_reminders = if reminder.message.contains(ALL_PLACEHOLDER) {
            self.store
                .list_for_server(&reminder.server_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(server_id = %reminder.server_id, "digest lookup failed: {e}");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let next_cycle = match next {
            NextState::Scheduled {
                at, offset_index, ..
            } => Some(cycle_of(*at, &reminder.notification_offsets, *offset_index)),
            NextState::Paused => None,
        };
        let text = compose(
            reminder,
            &MessageContext {
                offset_minutes: reminder.current_offset().unwrap_or(0),
                next_cycle,
                server_reminders: &server_reminders,
                now,
                digest_window: Duration::from_std(self.config.digest_window())
                    .unwrap_or(Duration::hours(24)),
            },
        );

        let handle = match self.gateway.send_message(&channel, &text).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    reminder_id = %reminder.id,
                    channel = %channel.name,
                    error = %e,
                    "dispatch FAILED; advancing without retry"
                );
                return Delivery::Failed;
            }
        };

        for emoji in &reminder.selected_emojis {
            if let Err(e) = self.gateway.add_reaction(&handle, emoji).await {
                warn!(reminder_id = %reminder.id, %emoji, error = %e, "reaction failed");
            }
        }

        info!(
            reminder_id = %reminder.id,
            server_id = %reminder.server_id,
            channel = %channel.name,
            offset_index = reminder.next_offset_index.unwrap_or(0),
            "reminder dispatched"
        );
        Delivery::Sent
    }

    async fn record_missed(&self, reminder: &Reminder, due_at: DateTime<Utc>, missed_by: Duration) {
        warn!(
            reminder_id = %reminder.id,
            server_id = %reminder.server_id,
            missed_by_secs = missed_by.num_seconds(),
            "notification past grace period; recording as missed"
        );
        let missed = MissedNotification {
            id: Uuid::new_v4().to_string(),
            server_id: reminder.server_id.clone(),
            message: reminder.message.clone(),
            missed_at: due_at,
            channel_name: reminder.channel_name.clone(),
            acknowledged: false,
        };
        if let Err(e) = self.store.record_missed(&missed).await {
            error!(reminder_id = %reminder.id, "failed to record missed notification: {e}");
            return;
        }
        if let Err(e) = self
            .store
            .trim_missed(&reminder.server_id, self.config.missed_per_server)
            .await
        {
            warn!(server_id = %reminder.server_id, "missed-notification trim failed: {e}");
        }
    }

    async fn release(&self, reminder: &Reminder, next: &NextState) {
        if let Err(e) = self.store.release(&reminder.id, next, self.now()).await {
            error!(reminder_id = %reminder.id, "failed to release claim: {e}");
        }
    }
}

/// Due instant of a claimed reminder, or `None` when its scheduling data
/// cannot be trusted.
fn schedulable(reminder: &Reminder) -> Option<DateTime<Utc>> {
    parse_anchor(&reminder.start_time)?;
    reminder.current_offset()?;
    reminder.next_notification_time
}

/// Time left until the next wall-clock minute boundary.
pub fn until_next_minute(now: DateTime<Utc>) -> std::time::Duration {
    let into_minute_ms =
        u64::from(now.second()) * 1_000 + u64::from(now.timestamp_subsec_millis().min(999));
    match into_minute_ms {
        0 => std::time::Duration::ZERO,
        ms => std::time::Duration::from_millis(60_000 - ms),
    }
}
