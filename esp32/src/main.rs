use std::sync::mpsc;

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::IOPin;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use log::info;
use tempfeed_common::{feed_topic, Collaborators, FadeDisplay, Monotonic, Station, StationConfig};

mod cloud;
mod ds18b20;
mod http;
mod ota;
mod tm1637;
mod wifi;

use cloud::{CloudLink, CloudSettings};
use ds18b20::DS18B20;
use ota::OtaChannel;
use tm1637::TM1637;

const IO_USERNAME: &str = env!("IO_USERNAME");
const IO_KEY: &str = env!("IO_KEY");

/// Feed carrying firmware image URLs.
const UPDATE_FEED: &str = "ota-url";

/// Milliseconds since boot from the high resolution timer.
struct Uptime;

impl Monotonic for Uptime {
    fn now_ms(&self) -> u32 {
        let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        (micros / 1000) as u32
    }
}

/// Station settings baked in at build time through `TEMPFEED_CONFIG_JSON`.
fn load_config() -> anyhow::Result<StationConfig> {
    match option_env!("TEMPFEED_CONFIG_JSON") {
        Some(json) => Ok(StationConfig::from_json(json)?),
        None => Ok(StationConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    EspLogger::initialize_default();

    let config = load_config()?;
    info!("Starting {} with {:?}", config.thing_name, config);

    let peripherals = Peripherals::take()?;
    let sensor = DS18B20::new(peripherals.pins.gpio4.downgrade())?;
    let segments = TM1637::new(
        peripherals.pins.gpio18.downgrade(),
        peripherals.pins.gpio19.downgrade(),
    )?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let (update_tx, update_rx) = mpsc::channel();
    let link = CloudLink::new(
        wifi,
        CloudSettings {
            user: IO_USERNAME.to_string(),
            key: IO_KEY.to_string(),
            client_id: config.thing_name.clone(),
            time_topic: config.time_topic.clone(),
            update_topic: feed_topic(IO_USERNAME, UPDATE_FEED),
        },
        update_tx,
    );
    let telemetry = link.publisher();

    let io = Collaborators {
        monotonic: Box::new(Uptime),
        connectivity: Box::new(link),
        updates: Box::new(OtaChannel::new(update_rx)),
        sensor: Box::new(sensor),
        display: Box::new(FadeDisplay::new(
            segments,
            FreeRtos,
            config.brightness_delay_ms,
        )),
        telemetry: Box::new(telemetry),
    };

    let mut station = Station::new(config, io);
    station.setup(&mut FreeRtos);

    loop {
        station.iterate();
    }
}
