use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use esp_idf_svc::sys::EspError;
use log::warn;
use tempfeed_common::display::segments::DIGIT_COUNT;
use tempfeed_common::SegmentDriver;

type Pin = PinDriver<'static, AnyIOPin, InputOutput>;

/// TM1637 4-digit module on two bit-banged open drain GPIOs.
pub struct TM1637 {
    clk: Pin,
    dio: Pin,
    brightness: u8,
}

#[derive(Debug)]
pub enum TM1637Error {
    NoAck,
    Pin(EspError),
}

impl From<EspError> for TM1637Error {
    fn from(e: EspError) -> Self {
        TM1637Error::Pin(e)
    }
}

impl TM1637 {
    const CMD_DATA_AUTO_INCREMENT: u8 = 0x40;
    const CMD_ADDRESS: u8 = 0xC0;
    const CMD_DISPLAY: u8 = 0x80;
    const DISPLAY_ON: u8 = 0x08;

    const BIT_DELAY_US: u32 = 100;

    pub fn new(clk: AnyIOPin, dio: AnyIOPin) -> anyhow::Result<Self> {
        let mut clk = PinDriver::input_output_od(clk)?;
        clk.set_pull(Pull::Up)?;
        clk.set_high()?;

        let mut dio = PinDriver::input_output_od(dio)?;
        dio.set_pull(Pull::Up)?;
        dio.set_high()?;

        Ok(Self {
            clk,
            dio,
            brightness: Self::DISPLAY_ON | 0x07,
        })
    }

    fn bit_delay() {
        Ets::delay_us(Self::BIT_DELAY_US);
    }

    fn start(&mut self) -> Result<(), TM1637Error> {
        self.dio.set_low()?;
        Self::bit_delay();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TM1637Error> {
        self.dio.set_low()?;
        Self::bit_delay();
        self.clk.set_high()?;
        Self::bit_delay();
        self.dio.set_high()?;
        Self::bit_delay();
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TM1637Error> {
        // LSB first, data changes while the clock is low
        for i in 0..8 {
            self.clk.set_low()?;
            Self::bit_delay();
            if byte & (1 << i) != 0 {
                self.dio.set_high()?;
            } else {
                self.dio.set_low()?;
            }
            Self::bit_delay();
            self.clk.set_high()?;
            Self::bit_delay();
        }

        // ninth clock: the chip pulls DIO low to acknowledge
        self.clk.set_low()?;
        self.dio.set_high()?;
        Self::bit_delay();
        self.clk.set_high()?;
        Self::bit_delay();
        let ack = self.dio.is_low();
        if ack {
            self.dio.set_low()?;
        }
        Self::bit_delay();
        self.clk.set_low()?;
        Self::bit_delay();

        if ack {
            Ok(())
        } else {
            Err(TM1637Error::NoAck)
        }
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), TM1637Error> {
        self.start()?;
        let result = bytes.iter().try_for_each(|&b| self.write_byte(b));
        self.stop()?;
        result
    }

    pub fn write(&mut self, segments: &[u8], position: u8) -> Result<(), TM1637Error> {
        self.command(&[Self::CMD_DATA_AUTO_INCREMENT])?;

        let position = position.min(DIGIT_COUNT as u8 - 1);
        let room = DIGIT_COUNT - position as usize;
        let mut frame = Vec::with_capacity(room + 1);
        frame.push(Self::CMD_ADDRESS | position);
        frame.extend(segments.iter().take(room));
        self.command(&frame)?;

        self.command(&[Self::CMD_DISPLAY | self.brightness])
    }
}

impl SegmentDriver for TM1637 {
    fn set_brightness(&mut self, level: u8, on: bool) {
        self.brightness = (level & 0x07) | if on { Self::DISPLAY_ON } else { 0 };
    }

    fn set_digits(&mut self, segments: &[u8], position: u8) {
        if let Err(e) = self.write(segments, position) {
            warn!("TM1637 write failed: {:?}", e);
        }
    }
}
