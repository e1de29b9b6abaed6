//! Platform-agnostic core of the temperature station.
//!
//! Everything in here runs on the host as well as on the board: the publish
//! gate and clock state machine, the collaborator traits the firmware
//! implements, the fade renderer and the loop driver tying them together.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod display;
pub mod gate;
pub mod station;
pub mod update;

pub use clock::{clock_text, parse_epoch, ClockEvent, ClockState, TimeStatus};
pub use config::{feed_topic, ConfigError, StationConfig};
pub use connectivity::{wait_for_connection, ConnectionState, Connectivity};
pub use display::{FadeDisplay, SegmentDriver, TemperatureDisplay};
pub use gate::{PeriodicGate, PublishSchedule, Tick};
pub use station::{
    Collaborators, FeedValue, Iteration, Monotonic, Station, TelemetrySink, TemperatureReading,
    TemperatureSensor,
};
pub use update::{NoUpdates, UpdateChannel, UpdateError, UpdateKind, UpdateLog, UpdateObserver};

use std::sync::{Arc, Mutex, PoisonError};

/// Slot holding the most recent value handed over from another thread. For
/// example from the cloud client's event thread (time feed messages) to the
/// station loop, which takes it once per tick.
#[derive(Debug)]
pub struct LatestSlot<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    /// Stores `value`, replacing anything not yet taken.
    pub fn set(&self, value: T) {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *data = Some(value);
    }

    /// Takes the stored value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        data.take()
    }
}

#[cfg(test)]
mod tests {
    use super::LatestSlot;

    #[test]
    fn slot_keeps_only_the_latest_value() {
        let slot = LatestSlot::new();
        let writer = slot.clone();

        writer.set(1_700_000_000_i64);
        writer.set(1_700_000_001);

        assert_eq!(slot.take(), Some(1_700_000_001));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn slot_is_shared_across_threads() {
        let slot = LatestSlot::new();
        let writer = slot.clone();

        std::thread::spawn(move || writer.set(42_i64))
            .join()
            .unwrap();

        assert_eq!(slot.take(), Some(42));
    }
}
