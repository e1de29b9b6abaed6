//! Stand-in collaborators for running the station off-target.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use super::{FeedValue, Monotonic, TelemetrySink, TemperatureSensor};
use crate::display::segments::DIGIT_COUNT;
use crate::display::SegmentDriver;

/// Slowly drifting synthetic temperature around `base_celsius`.
pub struct DummySensor {
    base_celsius: f32,
    conversions: u32,
}

impl DummySensor {
    pub fn new(base_celsius: f32) -> Self {
        Self {
            base_celsius,
            conversions: 0,
        }
    }
}

impl TemperatureSensor for DummySensor {
    fn request_reading(&mut self) {
        self.conversions = self.conversions.wrapping_add(1);
    }

    fn read_celsius(&mut self, index: usize) -> f32 {
        let phase = self.conversions as f32 / 20.0 + index as f32;
        self.base_celsius + 1.5 * phase.sin()
    }
}

/// Prints published values.
#[derive(Default)]
pub struct LogTelemetry {
    published: u32,
}

impl TelemetrySink for LogTelemetry {
    fn publish(&mut self, feed: &str, value: FeedValue) {
        self.published += 1;
        info!("[{}] {} <- {}", self.published, feed, value.to_payload());
    }
}

/// Keeps the last frame and brightness, logging every change.
#[derive(Default)]
pub struct ConsoleSegments {
    cells: [u8; DIGIT_COUNT],
    level: u8,
    on: bool,
}

impl ConsoleSegments {
    pub fn cells(&self) -> [u8; DIGIT_COUNT] {
        self.cells
    }

    pub fn brightness(&self) -> (u8, bool) {
        (self.level, self.on)
    }
}

impl SegmentDriver for ConsoleSegments {
    fn set_brightness(&mut self, level: u8, on: bool) {
        self.level = level;
        self.on = on;
    }

    fn set_digits(&mut self, segments: &[u8], position: u8) {
        let start = usize::from(position).min(DIGIT_COUNT);
        for (cell, segments) in self.cells[start..].iter_mut().zip(segments) {
            *cell = *segments;
        }
        debug!(
            "display {:02x?} brightness {}{}",
            self.cells,
            self.level,
            if self.on { "" } else { " (off)" }
        );
    }
}

/// Blocking delay on the current thread.
#[derive(Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Milliseconds since construction plus `offset_ms`, truncated to 32 bits
/// like a board's uptime counter. A large offset reaches the wrap quickly.
pub struct SystemMonotonic {
    start: Instant,
    offset_ms: u32,
}

impl SystemMonotonic {
    pub fn new(offset_ms: u32) -> Self {
        Self {
            start: Instant::now(),
            offset_ms,
        }
    }
}

impl Monotonic for SystemMonotonic {
    fn now_ms(&self) -> u32 {
        (self.start.elapsed().as_millis() as u32).wrapping_add(self.offset_ms)
    }
}

#[test]
fn test_dummy_sensor_drifts_around_base() {
    let mut sensor = DummySensor::new(20.0);

    for _ in 0..100 {
        sensor.request_reading();
        let celsius = sensor.read_celsius(0);
        assert!((18.5..=21.5).contains(&celsius));
    }
}

#[test]
fn test_console_segments_writes_at_position() {
    let mut segments = ConsoleSegments::default();

    segments.set_digits(&[1, 2, 3, 4], 0);
    segments.set_digits(&[9], 3);
    segments.set_brightness(3, false);

    assert_eq!(segments.cells(), [1, 2, 3, 9]);
    assert_eq!(segments.brightness(), (3, false));
}
