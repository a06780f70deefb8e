//! Time Sources
//!
//! Every gate reads time through a [`Clock`]. Refill, cooldown and
//! rolling-window math uses the monotonic [`Clock::now`]; wall time is read
//! only to roll daily counters over at UTC midnight.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One hour, the span of the rolling action window
pub const HOUR: Duration = Duration::from_secs(3600);

/// Injectable time source
pub trait Clock: Send + Sync + Debug {
    /// Monotonic "now"
    fn now(&self) -> Instant;

    /// Wall-clock "now" in UTC
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Process clock backed by the tokio timer
///
/// Reading through `tokio::time::Instant` lets paused test runtimes
/// advance this clock together with `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Start at the current instant and wall time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Start at a chosen wall time
    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both monotonic and wall time forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = ChronoDuration::from_std(self.offset()).unwrap_or(ChronoDuration::MAX);
        self.wall_origin + offset
    }
}

/// Time elapsed from `earlier` to `now`, zero if `earlier` is in the future
pub fn elapsed_since(earlier: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(earlier)
}

/// Duration as fractional seconds
pub fn secs_f64(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Whole seconds, rounded up, for human-readable messages
pub fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Time left until the next 00:00:00 UTC
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let next_day = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let midnight = next_day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (midnight - now).to_std().unwrap_or(Duration::ZERO)
}
