mod fade;
pub mod segments;

pub use fade::{fade_steps, FadeDisplay, FadeStep, MAX_BRIGHTNESS};

/// Raw access to a 4-digit 7-segment module.
pub trait SegmentDriver {
    /// `level` is 0..=7; `on == false` blanks the display.
    fn set_brightness(&mut self, level: u8, on: bool);

    /// Writes `segments` starting at digit `position` (0 is leftmost).
    fn set_digits(&mut self, segments: &[u8], position: u8);
}

/// Shows temperature readings. Rendering may block while it animates.
pub trait TemperatureDisplay {
    /// Full brightness, all zeros.
    fn init(&mut self);

    fn render(&mut self, celsius: f32);
}
