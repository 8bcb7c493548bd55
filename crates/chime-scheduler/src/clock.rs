//! Clock correction against a trusted external time source.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};

/// Local wall clock. Swapped for a fixed clock in tests.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trusted source of the current time. Failures are never fatal.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn network_time(&self) -> Result<DateTime<Utc>>;
}

/// Reads the `Date` header of an HTTPS endpoint.
///
/// The header has one-second resolution; half of the measured round trip is
/// added to approximate the instant the response was produced.
pub struct HttpDateTimeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDateTimeSource {
    pub fn new(url: impl Into<String>, timeout: StdDuration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::TimeSource(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TimeSource for HttpDateTimeSource {
    async fn network_time(&self) -> Result<DateTime<Utc>> {
        let sent = Utc::now();
        let resp = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| SchedulerError::TimeSource(e.to_string()))?;
        let received = Utc::now();

        let header = resp
            .headers()
            .get(reqwest::header::DATE)
            .ok_or_else(|| SchedulerError::TimeSource("response has no Date header".into()))?
            .to_str()
            .map_err(|e| SchedulerError::TimeSource(e.to_string()))?;
        let server_time = parse_http_date(header)?;

        Ok(server_time + (received - sent) / 2)
    }
}

/// Parse an HTTP `Date` header (RFC 7231 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::TimeSource(format!("bad Date header {value:?}: {e}")))
}

/// Keeps the offset between the local clock and the trusted source.
///
/// Owned by a single [`crate::engine::ReminderProcessor`]; interior
/// mutability only so concurrent per-reminder tasks can read the offset.
pub struct ClockCorrector {
    source: Option<Arc<dyn TimeSource>>,
    offset_ms: AtomicI64,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    resync_interval: Duration,
    near_due: Duration,
}

impl ClockCorrector {
    /// `source = None` disables syncing; the offset then stays at zero.
    pub fn new(
        source: Option<Arc<dyn TimeSource>>,
        resync_interval: StdDuration,
        near_due: StdDuration,
    ) -> Self {
        Self {
            source,
            offset_ms: AtomicI64::new(0),
            last_sync: Mutex::new(None),
            resync_interval: Duration::from_std(resync_interval).unwrap_or(Duration::MAX),
            near_due: Duration::from_std(near_due).unwrap_or(Duration::zero()),
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// `local_now` shifted by the cached offset.
    pub fn corrected(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        local_now + Duration::milliseconds(self.offset_ms())
    }

    /// Whether a sync is warranted: never synced, the last sync is stale, or
    /// the next due reminder is close enough that precision matters.
    pub fn needs_sync(&self, local_now: DateTime<Utc>, next_due: Option<DateTime<Utc>>) -> bool {
        let stale = match self.last_sync() {
            None => true,
            Some(last) => local_now - last > self.resync_interval,
        };
        let due_soon = next_due.is_some_and(|due| due - self.corrected(local_now) <= self.near_due);
        stale || due_soon
    }

    /// Refresh the offset if [`Self::needs_sync`] says so.
    ///
    /// On failure the offset resets to zero and the caller carries on with
    /// uncorrected local time.
    pub async fn maybe_sync(&self, wall: &dyn WallClock, next_due: Option<DateTime<Utc>>) {
        let Some(source) = &self.source else {
            return;
        };
        if !self.needs_sync(wall.now(), next_due) {
            return;
        }

        match source.network_time().await {
            Ok(network) => {
                let local = wall.now();
                let offset = (network - local).num_milliseconds();
                self.offset_ms.store(offset, Ordering::Relaxed);
                *self.last_sync.lock().unwrap_or_else(|p| p.into_inner()) = Some(local);
                if offset.abs() >= 1_000 {
                    info!(offset_ms = offset, "clock synced; local clock drift detected");
                } else {
                    debug!(offset_ms = offset, "clock synced");
                }
            }
            Err(e) => {
                self.offset_ms.store(0, Ordering::Relaxed);
                warn!(error = %e, "clock sync failed; using uncorrected local time");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    pub(crate) struct FixedClock(pub Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub(crate) fn at(now: DateTime<Utc>) -> Self {
            Self(Mutex::new(now))
        }

        pub(crate) fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl WallClock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Reports local time shifted by a fixed amount, or fails.
    pub(crate) struct ScriptedSource {
        pub skew: Option<Duration>,
        pub base: DateTime<Utc>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl TimeSource for ScriptedSource {
        async fn network_time(&self) -> Result<DateTime<Utc>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.skew {
                Some(skew) => Ok(self.base + skew),
                None => Err(SchedulerError::TimeSource("unreachable".to_string())),
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn corrector(source: Arc<ScriptedSource>) -> ClockCorrector {
        ClockCorrector::new(
            Some(source),
            StdDuration::from_secs(6 * 3600),
            StdDuration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn first_sync_records_offset() {
        let source = Arc::new(ScriptedSource {
            skew: Some(Duration::seconds(3)),
            base: t0(),
            calls: AtomicUsize::new(0),
        });
        let clock = corrector(source.clone());
        let wall = FixedClock::at(t0());

        clock.maybe_sync(&wall, None).await;
        assert_eq!(clock.offset_ms(), 3_000);
        assert_eq!(clock.corrected(t0()), t0() + Duration::seconds(3));
        assert_eq!(clock.last_sync(), Some(t0()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resyncs_only_when_stale_or_near_due() {
        let source = Arc::new(ScriptedSource {
            skew: Some(Duration::zero()),
            base: t0(),
            calls: AtomicUsize::new(0),
        });
        let clock = corrector(source.clone());
        let wall = FixedClock::at(t0());
        clock.maybe_sync(&wall, None).await;

        // An hour later with nothing due soon: no sync.
        wall.set(t0() + Duration::hours(1));
        clock
            .maybe_sync(&wall, Some(t0() + Duration::hours(2)))
            .await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // A reminder due in four minutes forces a sync.
        clock
            .maybe_sync(&wall, Some(t0() + Duration::minutes(64)))
            .await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Seven hours after the last sync the long interval triggers.
        wall.set(t0() + Duration::hours(8));
        clock.maybe_sync(&wall, None).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_sync_resets_offset() {
        let good = Arc::new(ScriptedSource {
            skew: Some(Duration::seconds(-2)),
            base: t0(),
            calls: AtomicUsize::new(0),
        });
        let clock = corrector(good);
        let wall = FixedClock::at(t0());
        clock.maybe_sync(&wall, None).await;
        assert_eq!(clock.offset_ms(), -2_000);

        let failing = ClockCorrector {
            source: Some(Arc::new(ScriptedSource {
                skew: None,
                base: t0(),
                calls: AtomicUsize::new(0),
            })),
            ..clock
        };
        failing.maybe_sync(&wall, Some(t0())).await;
        assert_eq!(failing.offset_ms(), 0);
        assert_eq!(failing.corrected(t0()), t0());
    }

    #[tokio::test]
    async fn disabled_source_never_syncs() {
        let clock = ClockCorrector::new(None, StdDuration::from_secs(1), StdDuration::from_secs(1));
        clock.maybe_sync(&FixedClock::at(t0()), Some(t0())).await;
        assert_eq!(clock.offset_ms(), 0);
        assert!(clock.last_sync().is_none());
    }

    #[test]
    fn parses_http_date_header() {
        let dt = parse_http_date("Wed, 01 Jan 2025 12:00:00 GMT").unwrap();
        assert_eq!(dt, t0());
        assert!(parse_http_date("yesterday").is_err());
    }
}
