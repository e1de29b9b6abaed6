use anyhow::anyhow;
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use log::info;

const SSID: &str = env!("WIFI_SSID");
const PASSWORD: &str = env!("WIFI_PASS");

pub type Wifi = esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>;

/// Configures the station interface and starts the radio. Does not associate.
pub fn start(wifi: &mut Wifi) -> anyhow::Result<()> {
    let wifi_configuration: Configuration = Configuration::Client(ClientConfiguration {
        ssid: SSID
            .try_into()
            .map_err(|_| anyhow!("WIFI_SSID is longer than 32 bytes"))?,
        bssid: None,
        auth_method: AuthMethod::WPA2Personal,
        password: PASSWORD
            .try_into()
            .map_err(|_| anyhow!("WIFI_PASS is longer than 64 bytes"))?,
        channel: None,
        ..Default::default()
    });

    wifi.set_configuration(&wifi_configuration)?;

    wifi.start()?;
    info!("Wifi started");

    Ok(())
}

/// Associates and waits for DHCP.
pub fn join(wifi: &mut Wifi) -> anyhow::Result<()> {
    wifi.connect()?;
    info!("Wifi connected to {}", SSID);

    wifi.wait_netif_up()?;
    info!("Wifi netif up");

    Ok(())
}

/// Received signal strength of the current access point, 0 when not associated.
pub fn rssi() -> i32 {
    let mut record = esp_idf_svc::sys::wifi_ap_record_t::default();
    match esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut record) }) {
        Ok(()) => i32::from(record.rssi),
        Err(_) => 0,
    }
}
