use serde::{Deserialize, Serialize};

use crate::clock::SECS_PER_HOUR;

/// Longest accepted interval. Anything at or beyond half the counter range
/// would make a wrapped elapsed time ambiguous.
pub const MAX_INTERVAL_SECS: u32 = (i32::MAX as u32) / 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid station configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{0}` must be between 1 and {} seconds", MAX_INTERVAL_SECS)]
    Interval(&'static str),
}

/// Station settings. Every field has a default so a config file only needs
/// the values that differ.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    /// OTA hostname and MQTT client id.
    pub thing_name: String,
    /// Minimum spacing between telemetry publishes.
    pub monitor_secs: u32,
    /// Hours added to the UTC epoch the time feed delivers.
    pub tz_hour_shift: i32,
    pub sync_interval_secs: u32,
    /// Delay between fade steps; one fade takes sixteen of these.
    pub brightness_delay_ms: u32,
    pub sensor_index: usize,
    pub temperature_feed: String,
    pub rssi_feed: String,
    pub time_topic: String,
    pub connect_poll_ms: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            thing_name: "tempfeed".into(),
            monitor_secs: 60,
            tz_hour_shift: 0,
            sync_interval_secs: 60,
            brightness_delay_ms: 80,
            sensor_index: 0,
            temperature_feed: "tempC".into(),
            rssi_feed: "rssi_temp".into(),
            time_topic: "time/seconds".into(),
            connect_poll_ms: 500,
        }
    }
}

impl StationConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config = serde_json::from_str::<Self>(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |secs: u32| (1..=MAX_INTERVAL_SECS).contains(&secs);
        if !in_range(self.monitor_secs) {
            return Err(ConfigError::Interval("monitor_secs"));
        }
        if !in_range(self.sync_interval_secs) {
            return Err(ConfigError::Interval("sync_interval_secs"));
        }
        Ok(())
    }

    pub fn interval_ms(&self) -> u32 {
        self.monitor_secs.saturating_mul(1000)
    }

    pub fn sync_interval_ms(&self) -> u32 {
        self.sync_interval_secs.saturating_mul(1000)
    }

    pub fn tz_offset_secs(&self) -> i64 {
        i64::from(self.tz_hour_shift) * SECS_PER_HOUR
    }
}

/// MQTT topic of a feed owned by `user`.
pub fn feed_topic(user: &str, key: &str) -> String {
    format!("{user}/feeds/{key}")
}

#[test]
fn test_partial_config_keeps_defaults() {
    let config = StationConfig::from_json(r#"{ "monitor_secs": 15, "tz_hour_shift": 2 }"#).unwrap();

    assert_eq!(config.interval_ms(), 15_000);
    assert_eq!(config.tz_offset_secs(), 7200);
    assert_eq!(config.sync_interval_ms(), 60_000);
    assert_eq!(config.temperature_feed, "tempC");
}

#[test]
fn test_rejects_zero_interval() {
    let err = StationConfig::from_json(r#"{ "monitor_secs": 0 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Interval("monitor_secs")));

    let err = StationConfig::from_json(r#"{ "sync_interval_secs": 4000000 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Interval("sync_interval_secs")));
}

#[test]
fn test_rejects_malformed_json() {
    assert!(matches!(
        StationConfig::from_json("{ monitor_secs: }"),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_feed_topic() {
    assert_eq!(feed_topic("alice", "tempC"), "alice/feeds/tempC");
}
