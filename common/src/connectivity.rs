use embedded_hal::delay::DelayNs;
use log::info;

use crate::LatestSlot;

/// Connection status of the cloud client. Ordered so that anything below
/// [`ConnectionState::Connected`] means "not usable yet".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Idle,
    NetDisconnected,
    Disconnected,
    NetConnectFailed,
    ConnectFailed,
    FingerprintInvalid,
    AuthFailed,
    SsidInvalid,
    NetConnected,
    Connected,
    ConnectedInsecure,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self >= ConnectionState::Connected
    }

    pub fn text(self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle. Waiting for connect to be called...",
            ConnectionState::NetDisconnected => "Network disconnected.",
            ConnectionState::Disconnected => "Disconnected from the feed service.",
            ConnectionState::NetConnectFailed => "Network connection failed.",
            ConnectionState::ConnectFailed => "Feed service connection failed.",
            ConnectionState::FingerprintInvalid => "Feed service TLS fingerprint verification failed.",
            ConnectionState::AuthFailed => "Feed service authentication failed.",
            ConnectionState::SsidInvalid => "Network SSID is invalid.",
            ConnectionState::NetConnected => "Network connected.",
            ConnectionState::Connected => "Feed service connected.",
            ConnectionState::ConnectedInsecure => "Feed service connected without TLS.",
        }
    }
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.text())
    }
}

/// Handle to the network link and the cloud feed client on top of it.
pub trait Connectivity {
    /// Starts connecting. Progress is observed through [`Connectivity::status`].
    fn connect(&mut self);

    /// Routes time feed values into `slot` from now on.
    fn attach_time_feed(&mut self, slot: LatestSlot<i64>);

    /// Housekeeping. Must be called on every loop iteration.
    fn run(&mut self);

    fn status(&self) -> ConnectionState;

    fn status_text(&self) -> &str {
        self.status().text()
    }

    /// Received signal strength of the network link, in dBm.
    fn rssi(&self) -> i32;
}

/// Polls until the client reports connected, printing a dot per poll.
pub fn wait_for_connection<C, D>(link: &mut C, delay: &mut D, poll_ms: u32) -> ConnectionState
where
    C: Connectivity + ?Sized,
    D: DelayNs + ?Sized,
{
    let mut polls = 0_u32;
    while !link.status().is_connected() {
        info!(".");
        delay.delay_ms(poll_ms);
        link.run();
        polls += 1;
    }
    info!("{} (after {} polls)", link.status_text(), polls);
    link.status()
}
