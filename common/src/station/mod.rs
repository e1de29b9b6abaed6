mod driver;

#[cfg(feature = "simulation")]
pub mod dummy;

pub use driver::{Collaborators, Iteration, Station};

/// Value returned by Dallas-style sensors when the device does not answer.
pub const DISCONNECTED_CELSIUS: f32 = -127.0;

/// Latest sensor sample; overwritten every iteration.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TemperatureReading {
    pub celsius: f32,
}

impl TemperatureReading {
    pub fn is_disconnected(&self) -> bool {
        self.celsius <= DISCONNECTED_CELSIUS
    }
}

/// Value published to a feed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeedValue {
    Float(f32),
    Int(i32),
}

impl FeedValue {
    /// Text payload as the feed service expects it.
    pub fn to_payload(&self) -> String {
        match self {
            FeedValue::Float(value) => format!("{value:.2}"),
            FeedValue::Int(value) => value.to_string(),
        }
    }
}

/// Fire-and-forget publisher of feed values.
pub trait TelemetrySink {
    fn publish(&mut self, feed: &str, value: FeedValue);
}

/// Temperature sensor on a shared bus.
pub trait TemperatureSensor {
    /// Starts a conversion on every sensor of the bus.
    fn request_reading(&mut self);

    /// Result of the last conversion for sensor `index`, or
    /// [`DISCONNECTED_CELSIUS`].
    fn read_celsius(&mut self, index: usize) -> f32;
}

/// Millisecond counter since boot. Wraps at `u32::MAX`.
pub trait Monotonic {
    fn now_ms(&self) -> u32;
}

#[test]
fn test_feed_payloads() {
    assert_eq!(FeedValue::Float(23.456).to_payload(), "23.46");
    assert_eq!(FeedValue::Int(-67).to_payload(), "-67");
}

#[test]
fn test_disconnected_reading() {
    assert!(TemperatureReading { celsius: DISCONNECTED_CELSIUS }.is_disconnected());
    assert!(!TemperatureReading { celsius: -40.0 }.is_disconnected());
}
