//! MQTT link to the feed service.
//!
//! The ESP-IDF client runs its own task; events are drained on a separate
//! thread that only flips flags and fills the time slot. Subscriptions and
//! reconnects happen from `run`, on the station loop.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use embedded_svc::mqtt::client::{EventPayload, QoS};
use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration};
use log::{error, info, warn};
use portable_atomic::{AtomicBool, Ordering};
use tempfeed_common::{
    feed_topic, parse_epoch, ConnectionState, Connectivity, FeedValue, LatestSlot, TelemetrySink,
};

use crate::wifi::{self, Wifi};

const BROKER_URL: &str = "mqtts://io.adafruit.com:8883";

/// Spacing between WiFi re-association attempts while the link is down.
const REJOIN_BACKOFF: Duration = Duration::from_secs(10);

pub struct CloudSettings {
    pub user: String,
    pub key: String,
    pub client_id: String,
    pub time_topic: String,
    /// Messages on this topic carry firmware image URLs.
    pub update_topic: String,
}

#[derive(Default)]
struct LinkFlags {
    mqtt_up: AtomicBool,
    subscribe_pending: AtomicBool,
}

type SharedClient = Arc<Mutex<Option<EspMqttClient<'static>>>>;

pub struct CloudLink {
    wifi: Wifi,
    settings: Arc<CloudSettings>,
    client: SharedClient,
    flags: Arc<LinkFlags>,
    time_slot: LatestSlot<i64>,
    update_requests: Sender<String>,
    wifi_up: bool,
    join_failed: bool,
    last_join: Option<Instant>,
}

impl CloudLink {
    pub fn new(wifi: Wifi, settings: CloudSettings, update_requests: Sender<String>) -> Self {
        Self {
            wifi,
            settings: Arc::new(settings),
            client: Arc::new(Mutex::new(None)),
            flags: Arc::new(LinkFlags::default()),
            time_slot: LatestSlot::new(),
            update_requests,
            wifi_up: false,
            join_failed: false,
            last_join: None,
        }
    }

    /// Telemetry handle sharing this link's MQTT client.
    pub fn publisher(&self) -> FeedPublisher {
        FeedPublisher {
            user: self.settings.user.clone(),
            client: self.client.clone(),
        }
    }

    fn join_wifi(&mut self) {
        self.last_join = Some(Instant::now());
        match wifi::join(&mut self.wifi) {
            Ok(()) => {
                self.wifi_up = true;
                self.join_failed = false;
            }
            Err(e) => {
                warn!("Wifi join failed: {:?}", e);
                self.wifi_up = false;
                self.join_failed = true;
            }
        }
    }

    fn start_mqtt(&mut self) -> anyhow::Result<()> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if client.is_some() {
            return Ok(());
        }

        let conf = MqttClientConfiguration {
            client_id: Some(self.settings.client_id.as_str()),
            username: Some(self.settings.user.as_str()),
            password: Some(self.settings.key.as_str()),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let (mqtt, connection) = EspMqttClient::new(BROKER_URL, &conf)?;

        let flags = self.flags.clone();
        let settings = self.settings.clone();
        let time_slot = self.time_slot.clone();
        let update_requests = self.update_requests.clone();
        std::thread::Builder::new()
            .stack_size(6 * 1024)
            .spawn(move || drain_events(connection, flags, settings, time_slot, update_requests))?;

        *client = Some(mqtt);
        info!("MQTT client started for {}", BROKER_URL);
        Ok(())
    }

    fn subscribe(&mut self) {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(client) = client.as_mut() else {
            return;
        };
        for topic in [&self.settings.time_topic, &self.settings.update_topic] {
            if let Err(e) = client.subscribe(topic, QoS::AtMostOnce) {
                warn!("Subscribing to {} failed: {:?}", topic, e);
                self.flags.subscribe_pending.store(true, Ordering::SeqCst);
                return;
            }
            info!("Subscribed to {}", topic);
        }
    }
}

impl Connectivity for CloudLink {
    fn connect(&mut self) {
        if let Err(e) = wifi::start(&mut self.wifi) {
            error!("Wifi start failed: {:?}", e);
            self.join_failed = true;
            return;
        }
        self.join_wifi();
        if self.wifi_up {
            if let Err(e) = self.start_mqtt() {
                error!("MQTT client failed to start: {:?}", e);
            }
        }
    }

    fn attach_time_feed(&mut self, slot: LatestSlot<i64>) {
        self.time_slot = slot;
    }

    fn run(&mut self) {
        self.wifi_up = self.wifi.is_connected().unwrap_or(false);

        if !self.wifi_up {
            let backoff_over = self
                .last_join
                .map_or(true, |at| at.elapsed() >= REJOIN_BACKOFF);
            if backoff_over {
                self.join_wifi();
            }
            return;
        }

        if let Err(e) = self.start_mqtt() {
            warn!("MQTT client failed to start: {:?}", e);
            return;
        }

        if self.flags.subscribe_pending.swap(false, Ordering::SeqCst) {
            self.subscribe();
        }
    }

    fn status(&self) -> ConnectionState {
        if !self.wifi_up {
            return if self.join_failed {
                ConnectionState::NetConnectFailed
            } else {
                ConnectionState::NetDisconnected
            };
        }
        if self.flags.mqtt_up.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::NetConnected
        }
    }

    fn rssi(&self) -> i32 {
        wifi::rssi()
    }
}

fn drain_events(
    mut connection: EspMqttConnection,
    flags: Arc<LinkFlags>,
    settings: Arc<CloudSettings>,
    time_slot: LatestSlot<i64>,
    update_requests: Sender<String>,
) {
    while let Ok(event) = connection.next() {
        match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT connected");
                flags.mqtt_up.store(true, Ordering::SeqCst);
                flags.subscribe_pending.store(true, Ordering::SeqCst);
            }
            EventPayload::Disconnected => {
                warn!("MQTT disconnected");
                flags.mqtt_up.store(false, Ordering::SeqCst);
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => {
                if topic == settings.time_topic {
                    time_slot.set(parse_epoch(data));
                } else if topic == settings.update_topic {
                    match std::str::from_utf8(data) {
                        Ok(url) => {
                            if update_requests.send(url.trim().to_string()).is_err() {
                                warn!("Update request dropped, channel closed");
                            }
                        }
                        Err(e) => warn!("Update request is not UTF-8: {}", e),
                    }
                }
            }
            EventPayload::Error(e) => warn!("MQTT error: {:?}", e),
            _ => {}
        }
    }
    info!("MQTT connection closed");
}

/// Publishes feed values with the link's MQTT client.
pub struct FeedPublisher {
    user: String,
    client: SharedClient,
}

impl TelemetrySink for FeedPublisher {
    fn publish(&mut self, feed: &str, value: FeedValue) {
        let topic = feed_topic(&self.user, feed);
        let payload = value.to_payload();

        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(client) = client.as_mut() else {
            warn!("Dropping {} <- {}: not connected", topic, payload);
            return;
        };
        match client.enqueue(&topic, QoS::AtMostOnce, false, payload.as_bytes()) {
            Ok(_) => info!("{} <- {}", topic, payload),
            Err(e) => warn!("Publishing to {} failed: {:?}", topic, e),
        }
    }
}
