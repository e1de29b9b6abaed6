mod cloud;

use std::time::Duration;

use anyhow::Context;
use tempfeed_common::station::dummy::{
    ConsoleSegments, DummySensor, LogTelemetry, StdDelay, SystemMonotonic,
};
use tempfeed_common::{Collaborators, FadeDisplay, NoUpdates, Station, StationConfig};

use cloud::SimulatedCloud;

/// Our App struct that holds the station and the delay it blocks on while
/// connecting.
///
/// Everything the board would provide is simulated: the cloud link and its
/// time feed, the sensor, the display and the telemetry sink.
struct App {
    station: Station,
    delay: StdDelay,
}

impl App {
    /// Time before the simulated feed sends its first epoch, so the station
    /// spends a few iterations waiting for time like a freshly booted board.
    const FEED_DELAY: Duration = Duration::from_secs(3);

    /// Create a new App struct from `config`.
    fn new(config: StationConfig, counter_offset_ms: u32) -> Self {
        let io = Collaborators {
            monotonic: Box::new(SystemMonotonic::new(counter_offset_ms)),
            connectivity: Box::new(SimulatedCloud::new(3, Self::FEED_DELAY)),
            updates: Box::new(NoUpdates),
            sensor: Box::new(DummySensor::new(21.0)),
            display: Box::new(FadeDisplay::new(
                ConsoleSegments::default(),
                StdDelay,
                config.brightness_delay_ms,
            )),
            telemetry: Box::new(LogTelemetry::default()),
        };

        Self {
            station: Station::new(config, io),
            delay: StdDelay,
        }
    }

    /// Run the App: connect, then loop forever.
    fn run(&mut self) -> ! {
        self.station.setup(&mut self.delay);

        loop {
            let outcome = self.station.iterate();
            log::debug!("iteration: {:?}", outcome);
        }
    }
}

/// Reads the JSON file named by `TEMPFEED_CONFIG`, or falls back to defaults.
fn load_config() -> anyhow::Result<StationConfig> {
    let Ok(path) = std::env::var("TEMPFEED_CONFIG") else {
        return Ok(StationConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    StationConfig::from_json(&json).with_context(|| format!("parsing {path}"))
}

/// Start the simulated counter this many milliseconds into its range, e.g.
/// `4294900000` to cross the wrap about a minute in.
fn counter_offset() -> anyhow::Result<u32> {
    match std::env::var("TEMPFEED_COUNTER_OFFSET_MS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("TEMPFEED_COUNTER_OFFSET_MS={value}")),
        Err(_) => Ok(0),
    }
}

/// A minimal main function that initializes the App and runs it.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!("Starting {} with {:?}", config.thing_name, config);

    let mut app = App::new(config, counter_offset()?);

    app.run()
}
