use embedded_hal::delay::DelayNs;
use log::debug;

use super::segments::{startup_frame, temperature_frame};
use super::{SegmentDriver, TemperatureDisplay};

pub const MAX_BRIGHTNESS: u8 = 7;

/// One frame of the fade: brightness to apply and how long to hold it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FadeStep {
    pub level: u8,
    pub on: bool,
    pub hold_ms: u32,
}

/// Ramp 7 down to 1, one dark frame held twice as long, then 0 back up to 6.
pub fn fade_steps(step_delay_ms: u32) -> impl Iterator<Item = FadeStep> {
    let lit = move |level| FadeStep {
        level,
        on: true,
        hold_ms: step_delay_ms,
    };
    let dark = FadeStep {
        level: 0,
        on: false,
        hold_ms: step_delay_ms.saturating_mul(2),
    };

    (1..=MAX_BRIGHTNESS)
        .rev()
        .map(lit)
        .chain(core::iter::once(dark))
        .chain((0..MAX_BRIGHTNESS).map(lit))
}

/// Renders each reading with a blocking brightness fade.
pub struct FadeDisplay<S, D> {
    driver: S,
    delay: D,
    step_delay_ms: u32,
}

impl<S: SegmentDriver, D: DelayNs> FadeDisplay<S, D> {
    pub fn new(driver: S, delay: D, step_delay_ms: u32) -> Self {
        Self {
            driver,
            delay,
            step_delay_ms,
        }
    }

    pub fn driver(&self) -> &S {
        &self.driver
    }
}

impl<S: SegmentDriver, D: DelayNs> TemperatureDisplay for FadeDisplay<S, D> {
    fn init(&mut self) {
        self.driver.set_brightness(MAX_BRIGHTNESS, true);
        self.driver.set_digits(&startup_frame(), 0);
    }

    fn render(&mut self, celsius: f32) {
        let frame = temperature_frame(celsius);
        debug!("Fading in {:.1} as {:02x?}", celsius, frame);

        for step in fade_steps(self.step_delay_ms) {
            self.driver.set_brightness(step.level, step.on);
            self.driver.set_digits(&frame, 0);
            self.delay.delay_ms(step.hold_ms);
        }
    }
}
