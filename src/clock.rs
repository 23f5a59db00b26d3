//! Time source for the engine.

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use std::sync::Mutex;

/// Supplies "now" to every age and staleness decision.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic runs.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Fixed offset used when rendering times for humans.
///
/// Out-of-range offsets fall back to UTC.
pub fn report_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or(Utc.fix())
}

/// Format a timestamp in the report zone, e.g. `2024-05-01 17:30:00 +07:00`.
pub fn format_report_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    offset
        .from_utc_datetime(&at.naive_utc())
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}
