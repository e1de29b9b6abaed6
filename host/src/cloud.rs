use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use tempfeed_common::{parse_epoch, ConnectionState, Connectivity, LatestSlot};

/// Pretend cloud link: comes up after a few housekeeping calls and, once
/// connected, pushes the wall-clock time into the attached slot every second,
/// the way the feed service publishes its time topic.
pub struct SimulatedCloud {
    runs_until_connected: u32,
    state: ConnectionState,
    time_slot: Option<LatestSlot<i64>>,
    feed_delay: Duration,
    feed_running: Arc<AtomicBool>,
}

impl SimulatedCloud {
    pub fn new(runs_until_connected: u32, feed_delay: Duration) -> Self {
        Self {
            runs_until_connected,
            state: ConnectionState::Idle,
            time_slot: None,
            feed_delay,
            feed_running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn start_time_feed(&self) {
        let Some(slot) = self.time_slot.clone() else {
            warn!("Connected without a time feed attached");
            return;
        };
        if self.feed_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let delay = self.feed_delay;
        let spawned = thread::Builder::new()
            .name("time-feed".into())
            .spawn(move || {
                thread::sleep(delay);
                loop {
                    // Goes through the same text parsing a real message would.
                    let payload = chrono::Utc::now().timestamp().to_string();
                    slot.set(parse_epoch(payload.as_bytes()));
                    thread::sleep(Duration::from_secs(1));
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start the simulated time feed: {}", e);
            self.feed_running.store(false, Ordering::SeqCst);
        }
    }
}

impl Connectivity for SimulatedCloud {
    fn connect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    fn attach_time_feed(&mut self, slot: LatestSlot<i64>) {
        self.time_slot = Some(slot);
    }

    fn run(&mut self) {
        if self.state.is_connected() || self.state == ConnectionState::Idle {
            return;
        }
        self.runs_until_connected = self.runs_until_connected.saturating_sub(1);
        self.state = if self.runs_until_connected == 0 {
            info!("Simulated cloud link up");
            self.start_time_feed();
            ConnectionState::Connected
        } else {
            ConnectionState::NetConnected
        };
    }

    fn status(&self) -> ConnectionState {
        self.state
    }

    fn rssi(&self) -> i32 {
        -58
    }
}
