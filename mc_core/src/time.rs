// ABOUTME: Wall-clock sources and timestamp labels.
// ABOUTME: Labels name segment files and tag heartbeat log lines.
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// strftime pattern for `YYYY-MM-DD_HH_MM_SS` labels
pub const LABEL_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> SystemTime;

    /// Current time rendered as a timestamp label
    fn label(&self) -> String {
        timestamp_label(self.now())
    }
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock that only moves when told to
///
/// # Examples
///
/// ```
/// use mc_core::{Clock, ManualClock};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let clock = ManualClock::new(UNIX_EPOCH);
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Render a time as a local `YYYY-MM-DD_HH_MM_SS` label
pub fn timestamp_label(time: SystemTime) -> String {
    format_label(DateTime::<Local>::from(time))
}

/// Render a zoned datetime as a `YYYY-MM-DD_HH_MM_SS` label
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use mc_core::time::format_label;
///
/// let dt = Utc.with_ymd_and_hms(2021, 1, 1, 9, 5, 3).unwrap();
/// assert_eq!(format_label(dt), "2021-01-01_09_05_03");
/// ```
pub fn format_label<Tz>(dt: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dt.format(LABEL_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_format_label_pads_fields() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 7, 1, 2, 3).unwrap();
        assert_eq!(format_label(dt), "2024-03-07_01_02_03");
    }

    #[test]
    fn test_timestamp_label_shape() {
        let label = timestamp_label(UNIX_EPOCH + Duration::from_secs(1_609_459_200));
        assert_eq!(label.len(), "YYYY-MM-DD_HH_MM_SS".len());
        assert_eq!(label.matches('_').count(), 3);
        assert_eq!(label.matches('-').count(), 2);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let now = SystemClock.now();
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap();
        assert!(since_epoch.as_secs() > 1_577_836_800); // 2020-01-01
    }

    #[test]
    fn test_manual_clock_advance() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now(), start + Duration::from_secs(61));
        assert_eq!(clock.label(), timestamp_label(start + Duration::from_secs(61)));
    }
}
