//! Periodic task gate: decides once per loop tick whether telemetry goes out.
//!
//! Timestamps come from a wrapping 32-bit millisecond counter, so every
//! elapsed-time comparison uses `wrapping_sub`. The interval is a minimum
//! spacing between publishes; how long the rest of the loop blocks only ever
//! delays a publish, never brings one forward.

use crate::clock::{ClockEvent, ClockState};
use crate::config::StationConfig;

/// Gating state for periodic telemetry.
#[derive(Clone, Debug)]
pub struct PublishSchedule {
    interval_ms: u32,
    /// `None` until the first publish, which makes the first eligible tick fire.
    last_publish_ms: Option<u32>,
}

impl PublishSchedule {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_publish_ms: None,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn last_publish_ms(&self) -> Option<u32> {
        self.last_publish_ms
    }

    pub fn elapsed(&self, now_ms: u32) -> Option<u32> {
        self.last_publish_ms.map(|last| now_ms.wrapping_sub(last))
    }

    pub fn is_due(&self, now_ms: u32) -> bool {
        self.elapsed(now_ms)
            .map_or(true, |elapsed| elapsed >= self.interval_ms)
    }

    pub fn mark(&mut self, now_ms: u32) {
        self.last_publish_ms = Some(now_ms);
    }
}

/// Outcome of one gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub clock: ClockEvent,
    /// The clock has never been set; telemetry work is skipped this tick.
    pub awaiting_time: bool,
    pub publish: bool,
}

#[derive(Clone, Debug)]
pub struct PeriodicGate {
    clock: ClockState,
    schedule: PublishSchedule,
}

impl PeriodicGate {
    pub fn new(clock: ClockState, schedule: PublishSchedule) -> Self {
        Self { clock, schedule }
    }

    pub fn from_config(config: &StationConfig) -> Self {
        Self::new(
            ClockState::new(config.tz_offset_secs(), config.sync_interval_ms()),
            PublishSchedule::new(config.interval_ms()),
        )
    }

    pub fn clock(&self) -> &ClockState {
        &self.clock
    }

    pub fn schedule(&self) -> &PublishSchedule {
        &self.schedule
    }

    pub fn on_tick(&mut self, now_ms: u32, external_epoch_or_zero: i64) -> Tick {
        let clock = self.clock.observe(now_ms, external_epoch_or_zero);

        if !self.clock.synced() {
            return Tick {
                clock,
                awaiting_time: true,
                publish: false,
            };
        }

        let publish = self.schedule.is_due(now_ms);
        if publish {
            self.schedule.mark(now_ms);
        }

        Tick {
            clock,
            awaiting_time: false,
            publish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH: i64 = 1_700_000_000;

    fn gate(interval_ms: u32) -> PeriodicGate {
        PeriodicGate::new(
            ClockState::new(0, 60_000),
            PublishSchedule::new(interval_ms),
        )
    }

    #[test]
    fn never_publishes_before_sync() {
        let mut gate = gate(1_000);

        for now in (0..1_000_000).step_by(3_333) {
            let tick = gate.on_tick(now, 0);
            assert!(tick.awaiting_time);
            assert!(!tick.publish);
        }
        assert_eq!(gate.schedule().last_publish_ms(), None);
    }

    #[test]
    fn publishes_on_the_tick_the_clock_is_set() {
        let mut gate = gate(60_000);
        gate.on_tick(0, 0);
        gate.on_tick(45_000, 0);

        let tick = gate.on_tick(45_100, EPOCH);

        assert_eq!(tick.clock, ClockEvent::Set(EPOCH));
        assert!(tick.publish);
        assert_eq!(gate.schedule().last_publish_ms(), Some(45_100));
    }

    #[test]
    fn keeps_minimum_spacing() {
        let mut gate = gate(10_000);
        gate.on_tick(0, EPOCH);

        let mut published = vec![0_u32];
        // Irregular spacing, like a loop whose render time varies.
        let mut now = 0_u32;
        for step in [1_300, 2_700, 900, 4_100, 1_600, 3_800, 2_200, 5_000, 1_100, 6_400] {
            for _ in 0..4 {
                now += step;
                if gate.on_tick(now, 0).publish {
                    published.push(now);
                }
            }
        }

        assert!(published.len() > 3);
        for pair in published.windows(2) {
            assert!(pair[1].wrapping_sub(pair[0]) >= 10_000, "{pair:?}");
        }
    }

    #[test]
    fn elapsed_is_small_right_after_counter_wrap() {
        let mut gate = gate(60_000);
        let before_wrap = u32::MAX - 20_000;
        assert!(gate.on_tick(before_wrap, EPOCH).publish);

        let just_after_wrap = 15_000;
        assert_eq!(gate.schedule().elapsed(just_after_wrap), Some(35_001));
        assert!(!gate.on_tick(just_after_wrap, 0).publish);

        let later = 40_000;
        assert!(gate.on_tick(later, 0).publish);
        assert_eq!(gate.schedule().last_publish_ms(), Some(later));
    }

    #[test]
    fn zero_epoch_after_sync_does_not_block_publishing() {
        let mut gate = gate(5_000);
        assert!(gate.on_tick(0, EPOCH).publish);

        for round in 1..=20_u32 {
            let tick = gate.on_tick(round * 5_000, 0);
            assert!(!tick.awaiting_time);
            assert!(tick.publish);
            assert!(gate.clock().synced());
        }
    }

    #[test]
    fn end_to_end_scenario() {
        let mut gate = gate(60_000);

        let tick = gate.on_tick(0, 0);
        assert!(!tick.publish);
        assert!(!gate.clock().synced());

        let tick = gate.on_tick(500, 1_700_000_000);
        assert!(gate.clock().synced());
        assert!(tick.publish);
        assert_eq!(gate.schedule().last_publish_ms(), Some(500));

        let tick = gate.on_tick(30_000, 0);
        assert!(!tick.publish);
        assert_eq!(gate.schedule().elapsed(30_000), Some(29_500));

        let tick = gate.on_tick(61_000, 0);
        assert!(tick.publish);
        assert_eq!(gate.schedule().last_publish_ms(), Some(61_000));
    }

    #[test]
    fn built_from_config() {
        let config = StationConfig {
            monitor_secs: 30,
            tz_hour_shift: -5,
            ..StationConfig::default()
        };
        let mut gate = PeriodicGate::from_config(&config);

        assert_eq!(gate.schedule().interval_ms(), 30_000);
        assert_eq!(gate.on_tick(0, EPOCH).clock, ClockEvent::Set(EPOCH - 5 * 3600));
    }
}
