//! Wall-clock state derived from the cloud time feed.
//!
//! The station has no battery-backed clock. Wall time is adopted from the
//! epoch values the feed delivers and free-runs on the monotonic millisecond
//! counter in between. Every `sync_interval_ms` the clock tries to re-adopt a
//! fresh value; when none arrived it keeps running and reports
//! [`TimeStatus::NeedsSync`] until one does.

use chrono::DateTime;

pub const SECS_PER_HOUR: i64 = 3600;

/// Trust level of the local clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeStatus {
    /// No epoch has ever been received.
    NotSet,
    /// The last re-sync found no fresh epoch; time is free-running.
    NeedsSync,
    /// Synchronized within the last sync interval.
    Set,
}

/// What happened to the clock during one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    None,
    /// First synchronization; carries the adopted local epoch.
    Set(i64),
    /// Periodic re-synchronization; carries the adopted local epoch.
    Resynced(i64),
    /// A re-sync was due but no fresh epoch was available.
    SyncMissed,
}

#[derive(Clone, Copy, Debug)]
struct Observation {
    at_ms: u32,
    local_epoch: i64,
}

#[derive(Clone, Debug)]
pub struct ClockState {
    tz_offset_secs: i64,
    sync_interval_ms: u32,
    status: TimeStatus,
    /// Local epoch adopted at `last_sync_ms`.
    last_sync_epoch: i64,
    last_sync_ms: u32,
    latest: Option<Observation>,
}

impl ClockState {
    pub fn new(tz_offset_secs: i64, sync_interval_ms: u32) -> Self {
        Self {
            tz_offset_secs,
            sync_interval_ms,
            status: TimeStatus::NotSet,
            last_sync_epoch: 0,
            last_sync_ms: 0,
            latest: None,
        }
    }

    pub fn status(&self) -> TimeStatus {
        self.status
    }

    /// True once any valid epoch has been adopted. Never reverts.
    pub fn synced(&self) -> bool {
        self.status != TimeStatus::NotSet
    }

    pub fn last_sync_epoch(&self) -> i64 {
        self.last_sync_epoch
    }

    /// Feeds one value from the time source into the state machine.
    ///
    /// `external_epoch_or_zero` is UTC epoch seconds; zero or negative values
    /// mean "nothing new" and never unsync the clock.
    pub fn observe(&mut self, now_ms: u32, external_epoch_or_zero: i64) -> ClockEvent {
        let fresh = external_epoch_or_zero > 0;
        if fresh {
            self.latest = Some(Observation {
                at_ms: now_ms,
                local_epoch: external_epoch_or_zero.saturating_add(self.tz_offset_secs),
            });
        }

        match self.status {
            TimeStatus::NotSet if fresh => {
                self.adopt(now_ms);
                ClockEvent::Set(self.last_sync_epoch)
            }
            TimeStatus::NotSet => ClockEvent::None,
            TimeStatus::NeedsSync if fresh => {
                self.adopt(now_ms);
                ClockEvent::Resynced(self.last_sync_epoch)
            }
            TimeStatus::NeedsSync | TimeStatus::Set => {
                if now_ms.wrapping_sub(self.last_sync_ms) < self.sync_interval_ms {
                    return ClockEvent::None;
                }
                if self.latest_is_fresh(now_ms) {
                    self.adopt(now_ms);
                    ClockEvent::Resynced(self.last_sync_epoch)
                } else {
                    self.rebase(now_ms);
                    self.status = TimeStatus::NeedsSync;
                    ClockEvent::SyncMissed
                }
            }
        }
    }

    /// Current local epoch, free-running from the last adoption.
    pub fn now_epoch(&self, now_ms: u32) -> Option<i64> {
        if !self.synced() {
            return None;
        }
        let elapsed_secs = now_ms.wrapping_sub(self.last_sync_ms) / 1000;
        Some(self.last_sync_epoch + i64::from(elapsed_secs))
    }

    fn latest_is_fresh(&self, now_ms: u32) -> bool {
        self.latest
            .is_some_and(|seen| now_ms.wrapping_sub(seen.at_ms) < self.sync_interval_ms)
    }

    fn adopt(&mut self, now_ms: u32) {
        if let Some(seen) = self.latest {
            let age_secs = now_ms.wrapping_sub(seen.at_ms) / 1000;
            self.last_sync_epoch = seen.local_epoch + i64::from(age_secs);
            self.last_sync_ms = now_ms;
            self.status = TimeStatus::Set;
        }
    }

    /// Moves the reference point forward in whole seconds so free-running time
    /// stays exact across counter wraps.
    fn rebase(&mut self, now_ms: u32) {
        let elapsed_secs = now_ms.wrapping_sub(self.last_sync_ms) / 1000;
        self.last_sync_epoch += i64::from(elapsed_secs);
        self.last_sync_ms = self.last_sync_ms.wrapping_add(elapsed_secs * 1000);
    }
}

/// Parses a time feed payload the way `atoi` would: leading whitespace, an
/// optional sign, then digits up to the first non-digit. Anything without
/// digits, or overflowing, is zero.
pub fn parse_epoch(payload: &[u8]) -> i64 {
    let text = payload.trim_ascii_start();
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    for digit in digits.iter().take_while(|b| b.is_ascii_digit()) {
        match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(digit - b'0')))
        {
            Some(next) => value = next,
            None => return 0,
        }
    }

    if negative {
        -value
    } else {
        value
    }
}

/// `H:MM:SS D M YYYY` for log lines.
pub fn clock_text(epoch: i64) -> String {
    match DateTime::from_timestamp(epoch, 0) {
        Some(time) => time.format("%-H:%M:%S %-d %-m %Y").to_string(),
        None => format!("<invalid epoch {epoch}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH: i64 = 1_700_000_000;

    #[test]
    fn stays_unset_until_a_value_arrives() {
        let mut clock = ClockState::new(0, 60_000);

        assert_eq!(clock.observe(0, 0), ClockEvent::None);
        assert_eq!(clock.observe(100, -5), ClockEvent::None);
        assert!(!clock.synced());
        assert_eq!(clock.now_epoch(100), None);
    }

    #[test]
    fn adopts_first_value_with_timezone_shift() {
        let mut clock = ClockState::new(2 * SECS_PER_HOUR, 60_000);

        assert_eq!(clock.observe(500, EPOCH), ClockEvent::Set(EPOCH + 7200));
        assert_eq!(clock.status(), TimeStatus::Set);
        assert_eq!(clock.last_sync_epoch(), EPOCH + 7200);
    }

    #[test]
    fn free_runs_between_syncs() {
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(1_000, EPOCH);

        assert_eq!(clock.now_epoch(1_999), Some(EPOCH));
        assert_eq!(clock.now_epoch(31_000), Some(EPOCH + 30));
    }

    #[test]
    fn ignores_new_values_until_resync_is_due() {
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(0, EPOCH);

        assert_eq!(clock.observe(10_000, EPOCH + 500), ClockEvent::None);
        assert_eq!(clock.last_sync_epoch(), EPOCH);
    }

    #[test]
    fn resync_uses_latest_value_aged_to_now() {
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(0, EPOCH);
        clock.observe(58_000, EPOCH + 59);

        assert_eq!(clock.observe(60_500, 0), ClockEvent::Resynced(EPOCH + 61));
        assert_eq!(clock.status(), TimeStatus::Set);
    }

    #[test]
    fn missed_resync_keeps_time_running() {
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(0, EPOCH);

        assert_eq!(clock.observe(60_000, 0), ClockEvent::SyncMissed);
        assert_eq!(clock.status(), TimeStatus::NeedsSync);
        assert!(clock.synced());
        assert_eq!(clock.now_epoch(61_500), Some(EPOCH + 61));

        assert_eq!(clock.observe(62_000, EPOCH + 100), ClockEvent::Resynced(EPOCH + 100));
        assert_eq!(clock.status(), TimeStatus::Set);
    }

    #[test]
    fn zero_input_never_unsyncs() {
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(0, EPOCH);

        for now in (1_000..600_000).step_by(7_000) {
            clock.observe(now, 0);
            assert!(clock.synced());
        }
    }

    #[test]
    fn free_running_survives_counter_wrap() {
        let start = u32::MAX - 4_999;
        let mut clock = ClockState::new(0, 60_000);
        clock.observe(start, EPOCH);

        assert_eq!(clock.now_epoch(5_000), Some(EPOCH + 10));
    }

    #[test]
    fn parses_like_atoi() {
        assert_eq!(parse_epoch(b"1700000000"), EPOCH);
        assert_eq!(parse_epoch(b"  1700000000\r\n"), EPOCH);
        assert_eq!(parse_epoch(b"1700000000.25"), EPOCH);
        assert_eq!(parse_epoch(b"-12"), -12);
        assert_eq!(parse_epoch(b"+7"), 7);
        assert_eq!(parse_epoch(b""), 0);
        assert_eq!(parse_epoch(b"abc"), 0);
        assert_eq!(parse_epoch(b"99999999999999999999999"), 0);
    }

    #[test]
    fn formats_clock_text() {
        assert_eq!(clock_text(EPOCH), "22:13:20 14 11 2023");
        assert_eq!(clock_text(0), "0:00:00 1 1 1970");
    }
}
