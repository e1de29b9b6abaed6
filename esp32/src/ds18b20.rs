use anyhow::anyhow;
use ds18b20::{Ds18b20, Resolution};
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use log::{info, warn};
use one_wire_bus::OneWire;
use tempfeed_common::station::DISCONNECTED_CELSIUS;
use tempfeed_common::TemperatureSensor;

/// DS18B20 sensors on one 1-Wire bus. Conversions are started on every
/// device at once; `index` picks a sensor in bus search order.
pub struct DS18B20 {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    sensors: Vec<Ds18b20>,
    delay: Ets,
    converting: bool,
}

impl DS18B20 {
    pub fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        let one_wire =
            OneWire::new(pin).map_err(|e| anyhow!("failed to initialize one-wire bus: {:?}", e))?;

        let mut bus = Self {
            one_wire,
            sensors: Vec::new(),
            delay: Ets,
            converting: false,
        };
        bus.scan();
        Ok(bus)
    }

    fn scan(&mut self) {
        let mut found = Vec::new();
        for address in self.one_wire.devices(false, &mut self.delay) {
            match address {
                Ok(address) if address.family_code() == ds18b20::FAMILY_CODE => {
                    match Ds18b20::new::<core::convert::Infallible>(address) {
                        Ok(sensor) => found.push(sensor),
                        Err(e) => warn!("Invalid DS18B20 address {:?}: {:?}", address, e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("One-wire search failed: {:?}", e);
                    break;
                }
            }
        }
        info!("{} DS18B20 sensor(s) on the bus", found.len());
        self.sensors = found;
    }
}

impl TemperatureSensor for DS18B20 {
    fn request_reading(&mut self) {
        if self.sensors.is_empty() {
            self.scan();
        }

        match ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay) {
            Ok(()) => {
                Resolution::Bits12.delay_for_measurement_time(&mut self.delay);
                self.converting = true;
            }
            Err(e) => {
                warn!("DS18B20 conversion request failed: {:?}", e);
                self.converting = false;
            }
        }
    }

    fn read_celsius(&mut self, index: usize) -> f32 {
        if !std::mem::take(&mut self.converting) {
            return DISCONNECTED_CELSIUS;
        }
        let Some(sensor) = self.sensors.get(index) else {
            return DISCONNECTED_CELSIUS;
        };

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => data.temperature,
            Err(e) => {
                warn!("DS18B20 {} read failed: {:?}", index, e);
                // rescan on the next request
                self.sensors.clear();
                DISCONNECTED_CELSIUS
            }
        }
    }
}
