use embedded_hal::delay::DelayNs;
use log::{info, warn};

use super::{FeedValue, Monotonic, TelemetrySink, TemperatureReading, TemperatureSensor};
use crate::clock::{clock_text, ClockEvent};
use crate::config::StationConfig;
use crate::connectivity::{wait_for_connection, Connectivity};
use crate::display::TemperatureDisplay;
use crate::gate::PeriodicGate;
use crate::update::{UpdateChannel, UpdateLog};
use crate::LatestSlot;

/// The board-specific pieces the station drives.
pub struct Collaborators {
    pub monotonic: Box<dyn Monotonic>,
    pub connectivity: Box<dyn Connectivity>,
    pub updates: Box<dyn UpdateChannel>,
    pub sensor: Box<dyn TemperatureSensor>,
    pub display: Box<dyn TemperatureDisplay>,
    pub telemetry: Box<dyn TelemetrySink>,
}

/// What one loop iteration ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iteration {
    /// The clock was never set; telemetry was skipped.
    AwaitingTime,
    /// Nothing due this time.
    Idle,
    Published,
}

/// Owns all loop state. `setup` once, then `iterate` forever.
pub struct Station {
    config: StationConfig,
    gate: PeriodicGate,
    time_slot: LatestSlot<i64>,
    reading: TemperatureReading,
    io: Collaborators,
    update_log: UpdateLog,
}

impl Station {
    pub fn new(config: StationConfig, io: Collaborators) -> Self {
        Self {
            gate: PeriodicGate::from_config(&config),
            config,
            time_slot: LatestSlot::new(),
            reading: TemperatureReading::default(),
            io,
            update_log: UpdateLog,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn gate(&self) -> &PeriodicGate {
        &self.gate
    }

    pub fn reading(&self) -> TemperatureReading {
        self.reading
    }

    /// Slot the time feed writes into. Handed to the connectivity layer during
    /// `setup`.
    pub fn time_slot(&self) -> LatestSlot<i64> {
        self.time_slot.clone()
    }

    pub fn setup<D: DelayNs + ?Sized>(&mut self, delay: &mut D) {
        self.io.display.init();

        info!("Connecting to the feed service");
        self.io.connectivity.attach_time_feed(self.time_slot.clone());
        self.io.connectivity.connect();
        wait_for_connection(
            self.io.connectivity.as_mut(),
            delay,
            self.config.connect_poll_ms,
        );

        self.io.updates.begin(&self.config.thing_name);
    }

    pub fn iterate(&mut self) -> Iteration {
        // Both run unconditionally, before anything else can return early.
        self.io.updates.handle(&mut self.update_log);
        self.io.connectivity.run();

        self.io.sensor.request_reading();
        self.reading = TemperatureReading {
            celsius: self.io.sensor.read_celsius(self.config.sensor_index),
        };
        if self.reading.is_disconnected() {
            warn!("Temperature sensor {} not responding", self.config.sensor_index);
        }
        info!("Temperature in C is: {:.2}", self.reading.celsius);

        self.io.display.render(self.reading.celsius);

        // Sampled after the blocking work so the interval is measured
        // between actual publishes.
        let now_ms = self.io.monotonic.now_ms();
        let epoch = self.time_slot.take().unwrap_or(0);
        let tick = self.gate.on_tick(now_ms, epoch);
        match tick.clock {
            ClockEvent::Set(local) => info!("Time set, time is now <- {}", clock_text(local)),
            ClockEvent::SyncMissed => warn!("Time feed silent, clock free-running"),
            ClockEvent::Resynced(_) | ClockEvent::None => {}
        }

        if tick.awaiting_time {
            return Iteration::AwaitingTime;
        }
        if !tick.publish {
            return Iteration::Idle;
        }

        self.io
            .telemetry
            .publish(&self.config.temperature_feed, FeedValue::Float(self.reading.celsius));

        let rssi = self.io.connectivity.rssi();
        info!("sending rssi value -> {}", rssi);
        self.io
            .telemetry
            .publish(&self.config.rssi_feed, FeedValue::Int(rssi));

        if let Some(epoch) = self.gate.clock().now_epoch(now_ms) {
            info!("Time is: {}", clock_text(epoch));
        }

        Iteration::Published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectionState;
    use crate::update::{UpdateError, UpdateKind, UpdateObserver};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const EPOCH: i64 = 1_700_000_000;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        UpdatesBegin(String),
        UpdatesHandle,
        Connect,
        AttachTimeFeed,
        Run,
        RequestReading,
        ReadCelsius(usize),
        Init,
        Render(f32),
        Publish(String, FeedValue),
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    struct ScriptedClock(Rc<Cell<u32>>);

    impl Monotonic for ScriptedClock {
        fn now_ms(&self) -> u32 {
            self.0.get()
        }
    }

    struct FakeLink {
        log: Log,
        slot: Rc<RefCell<Option<LatestSlot<i64>>>>,
        ready_after_runs: usize,
        runs: usize,
        now: Rc<Cell<u32>>,
        /// Milliseconds the next `run` blocks for, like a WiFi rejoin.
        stall_ms: Rc<Cell<u32>>,
    }

    impl Connectivity for FakeLink {
        fn connect(&mut self) {
            self.log.borrow_mut().push(Call::Connect);
        }

        fn attach_time_feed(&mut self, slot: LatestSlot<i64>) {
            self.log.borrow_mut().push(Call::AttachTimeFeed);
            *self.slot.borrow_mut() = Some(slot);
        }

        fn run(&mut self) {
            self.runs += 1;
            self.log.borrow_mut().push(Call::Run);
            self.now
                .set(self.now.get().wrapping_add(self.stall_ms.take()));
        }

        fn status(&self) -> ConnectionState {
            if self.runs >= self.ready_after_runs {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }

        fn rssi(&self) -> i32 {
            -67
        }
    }

    struct FakeUpdates {
        log: Log,
        fail_once: bool,
    }

    impl UpdateChannel for FakeUpdates {
        fn begin(&mut self, hostname: &str) {
            self.log
                .borrow_mut()
                .push(Call::UpdatesBegin(hostname.to_string()));
        }

        fn handle(&mut self, observer: &mut dyn UpdateObserver) {
            self.log.borrow_mut().push(Call::UpdatesHandle);
            if std::mem::take(&mut self.fail_once) {
                observer.on_start(UpdateKind::Sketch);
                observer.on_progress(10, 100);
                observer.on_error(UpdateError::Receive);
            }
        }
    }

    struct FakeSensor {
        log: Log,
        celsius: f32,
    }

    impl TemperatureSensor for FakeSensor {
        fn request_reading(&mut self) {
            self.log.borrow_mut().push(Call::RequestReading);
        }

        fn read_celsius(&mut self, index: usize) -> f32 {
            self.log.borrow_mut().push(Call::ReadCelsius(index));
            self.celsius
        }
    }

    /// Renders instantly.
    struct FakeDisplay(Log);

    impl TemperatureDisplay for FakeDisplay {
        fn init(&mut self) {
            self.0.borrow_mut().push(Call::Init);
        }

        fn render(&mut self, celsius: f32) {
            self.0.borrow_mut().push(Call::Render(celsius));
        }
    }

    struct FakeTelemetry(Log);

    impl TelemetrySink for FakeTelemetry {
        fn publish(&mut self, feed: &str, value: FeedValue) {
            self.0
                .borrow_mut()
                .push(Call::Publish(feed.to_string(), value));
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct Rig {
        station: Station,
        log: Log,
        now: Rc<Cell<u32>>,
        stall_ms: Rc<Cell<u32>>,
        feed: Rc<RefCell<Option<LatestSlot<i64>>>>,
    }

    impl Rig {
        fn new(config: StationConfig, fail_update_once: bool) -> Self {
            let log = Log::default();
            let now = Rc::new(Cell::new(0));
            let stall_ms = Rc::new(Cell::new(0));
            let feed = Rc::new(RefCell::new(None));

            let io = Collaborators {
                monotonic: Box::new(ScriptedClock(now.clone())),
                connectivity: Box::new(FakeLink {
                    log: log.clone(),
                    slot: feed.clone(),
                    ready_after_runs: 2,
                    runs: 0,
                    now: now.clone(),
                    stall_ms: stall_ms.clone(),
                }),
                updates: Box::new(FakeUpdates {
                    log: log.clone(),
                    fail_once: fail_update_once,
                }),
                sensor: Box::new(FakeSensor {
                    log: log.clone(),
                    celsius: 21.5,
                }),
                display: Box::new(FakeDisplay(log.clone())),
                telemetry: Box::new(FakeTelemetry(log.clone())),
            };

            let mut station = Station::new(config, io);
            station.setup(&mut NoDelay);
            log.borrow_mut().clear();

            Self {
                station,
                log,
                now,
                stall_ms,
                feed,
            }
        }

        fn deliver(&self, epoch: i64) {
            if let Some(slot) = self.feed.borrow().as_ref() {
                slot.set(epoch);
            }
        }

        fn iterate_at(&mut self, now_ms: u32) -> Iteration {
            self.now.set(now_ms);
            self.station.iterate()
        }

        fn publishes(&self) -> Vec<(String, FeedValue)> {
            self.log
                .borrow()
                .iter()
                .filter_map(|call| match call {
                    Call::Publish(feed, value) => Some((feed.clone(), *value)),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn setup_connects_and_starts_updates() {
        let log = Log::default();
        let feed = Rc::new(RefCell::new(None));
        let now = Rc::new(Cell::new(0));
        let io = Collaborators {
            monotonic: Box::new(ScriptedClock(now.clone())),
            connectivity: Box::new(FakeLink {
                log: log.clone(),
                slot: feed.clone(),
                ready_after_runs: 3,
                runs: 0,
                now,
                stall_ms: Rc::new(Cell::new(0)),
            }),
            updates: Box::new(FakeUpdates {
                log: log.clone(),
                fail_once: false,
            }),
            sensor: Box::new(FakeSensor {
                log: log.clone(),
                celsius: 0.0,
            }),
            display: Box::new(FakeDisplay(log.clone())),
            telemetry: Box::new(FakeTelemetry(log.clone())),
        };
        let config = StationConfig {
            thing_name: "porch".into(),
            ..StationConfig::default()
        };

        let mut station = Station::new(config, io);
        station.setup(&mut NoDelay);

        assert_eq!(
            *log.borrow(),
            [
                Call::Init,
                Call::AttachTimeFeed,
                Call::Connect,
                Call::Run,
                Call::Run,
                Call::Run,
                Call::UpdatesBegin("porch".into()),
            ]
        );
        assert!(feed.borrow().is_some());
    }

    #[test]
    fn polls_collaborators_before_anything_else_even_while_unsynced() {
        let mut rig = Rig::new(StationConfig::default(), false);

        assert_eq!(rig.iterate_at(0), Iteration::AwaitingTime);

        assert_eq!(
            *rig.log.borrow(),
            [
                Call::UpdatesHandle,
                Call::Run,
                Call::RequestReading,
                Call::ReadCelsius(0),
                Call::Render(21.5),
            ]
        );
        assert_eq!(rig.station.reading().celsius, 21.5);
    }

    #[test]
    fn publishes_temperature_and_rssi_once_time_arrives() {
        let mut rig = Rig::new(StationConfig::default(), false);

        assert_eq!(rig.iterate_at(0), Iteration::AwaitingTime);
        rig.deliver(EPOCH);
        assert_eq!(rig.iterate_at(500), Iteration::Published);
        assert_eq!(rig.iterate_at(30_000), Iteration::Idle);
        assert_eq!(rig.iterate_at(61_000), Iteration::Published);

        assert_eq!(
            rig.publishes(),
            [
                ("tempC".to_string(), FeedValue::Float(21.5)),
                ("rssi_temp".to_string(), FeedValue::Int(-67)),
                ("tempC".to_string(), FeedValue::Float(21.5)),
                ("rssi_temp".to_string(), FeedValue::Int(-67)),
            ]
        );
        assert_eq!(rig.station.gate().schedule().last_publish_ms(), Some(61_000));
    }

    #[test]
    fn blocking_before_the_gate_does_not_shorten_the_interval() {
        let mut rig = Rig::new(StationConfig::default(), false);
        rig.deliver(EPOCH);

        // A rejoin stalls the first iteration for 8 s before the gate runs.
        rig.stall_ms.set(8_000);
        assert_eq!(rig.iterate_at(1_000), Iteration::Published);
        assert_eq!(rig.station.gate().schedule().last_publish_ms(), Some(9_000));

        assert_eq!(rig.iterate_at(61_000), Iteration::Idle);
        assert_eq!(rig.iterate_at(69_000), Iteration::Published);
        assert_eq!(rig.station.gate().schedule().last_publish_ms(), Some(69_000));
    }

    #[test]
    fn time_value_is_consumed_once() {
        let mut rig = Rig::new(StationConfig::default(), false);
        rig.deliver(EPOCH);
        rig.iterate_at(100);

        assert_eq!(rig.station.time_slot().take(), None);
        assert!(rig.station.gate().clock().synced());
    }

    #[test]
    fn update_failure_does_not_stop_the_loop() {
        let mut rig = Rig::new(StationConfig::default(), true);
        rig.deliver(EPOCH);

        assert_eq!(rig.iterate_at(100), Iteration::Published);
        assert_eq!(rig.iterate_at(200), Iteration::Idle);
    }

    #[test]
    fn uses_configured_feeds_and_sensor() {
        let config = StationConfig {
            sensor_index: 2,
            temperature_feed: "attic-temp".into(),
            rssi_feed: "attic-rssi".into(),
            ..StationConfig::default()
        };
        let mut rig = Rig::new(config, false);
        rig.deliver(EPOCH);
        rig.iterate_at(10);

        assert!(rig.log.borrow().contains(&Call::ReadCelsius(2)));
        let feeds: Vec<_> = rig.publishes().into_iter().map(|(feed, _)| feed).collect();
        assert_eq!(feeds, ["attic-temp", "attic-rssi"]);
    }
}
