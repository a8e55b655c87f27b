//! Local version stamps.

use chrono::Utc;

use crate::models::LocalStamp;

/// Source of device time in milliseconds since the epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Stamp for a new local mutation.
///
/// The result is strictly greater than every stamp in `previous`, so a
/// mutation is always distinguishable from the baseline even when the device
/// clock stalls or moves backwards.
pub fn next_local_stamp<I>(clock: &impl Clock, previous: I) -> LocalStamp
where
    I: IntoIterator<Item = Option<LocalStamp>>,
{
    let floor = previous
        .into_iter()
        .flatten()
        .map(|stamp| stamp.millis() + 1)
        .max();

    LocalStamp(match floor {
        Some(floor) => clock.now_ms().max(floor),
        None => clock.now_ms(),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    #[test]
    fn test_next_stamp_uses_clock() {
        let clock = ManualClock::at(1_700_000_000_000);
        let stamp = next_local_stamp(&clock, [None]);
        assert_eq!(stamp, LocalStamp(1_700_000_000_000));
    }

    #[test]
    fn test_next_stamp_same_millisecond_still_advances() {
        let clock = ManualClock::at(1_700_000_000_000);
        let first = next_local_stamp(&clock, [None]);
        let second = next_local_stamp(&clock, [Some(first)]);
        assert_eq!(second, LocalStamp(1_700_000_000_001));
    }

    #[test]
    fn test_next_stamp_clock_went_backwards() {
        let clock = ManualClock::at(1_700_000_000_000);
        clock.set(1_600_000_000_000);
        let stamp = next_local_stamp(
            &clock,
            [Some(LocalStamp(1_700_000_000_000)), Some(LocalStamp(1_650_000_000_000))],
        );
        assert_eq!(stamp, LocalStamp(1_700_000_000_001));
    }

    #[test]
    fn test_next_stamp_clock_ahead() {
        let clock = ManualClock::at(1_700_000_000_000);
        clock.advance(5_000);
        let stamp = next_local_stamp(&clock, [Some(LocalStamp(1_700_000_000_000))]);
        assert_eq!(stamp, LocalStamp(1_700_000_005_000));
    }

    #[test]
    fn test_system_clock_is_recent() {
        assert!(SystemClock.now_ms() > 1_700_000_000_000);
    }
}
