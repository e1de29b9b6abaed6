//! Firmware updates pulled over HTTPS.
//!
//! Image URLs arrive on the cloud link's update topic; the station loop
//! picks them up in `handle` and flashes the inactive slot.

use std::sync::mpsc::Receiver;

use embedded_svc::http::{Headers, Method, Status};
use embedded_svc::io::Read;
use esp_idf_svc::ota::EspOta;
use log::{info, warn};
use tempfeed_common::{UpdateChannel, UpdateError, UpdateKind, UpdateObserver};

use crate::http;

const CHUNK_SIZE: usize = 4096;

pub struct OtaChannel {
    requests: Receiver<String>,
    hostname: String,
}

impl OtaChannel {
    pub fn new(requests: Receiver<String>) -> Self {
        Self {
            requests,
            hostname: String::new(),
        }
    }

    fn apply(&self, url: &str, observer: &mut dyn UpdateObserver) -> Result<(), UpdateError> {
        let mut client = http::new_client().map_err(|e| {
            warn!("HTTP client: {:?}", e);
            UpdateError::Connect
        })?;
        let request = client.request(Method::Get, url, &[]).map_err(|e| {
            warn!("Requesting {}: {:?}", url, e);
            UpdateError::Connect
        })?;
        let mut response = request.submit().map_err(|e| {
            warn!("Submitting {}: {:?}", url, e);
            UpdateError::Connect
        })?;

        match response.status() {
            200..=299 => {}
            401 | 403 => return Err(UpdateError::Auth),
            status => {
                warn!("{} answered HTTP {}", url, status);
                return Err(UpdateError::Connect);
            }
        }

        let total = response
            .header("Content-Length")
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);

        let mut ota = EspOta::new().map_err(|e| {
            warn!("OTA unavailable: {:?}", e);
            UpdateError::Begin
        })?;
        let mut update = ota.initiate_update().map_err(|e| {
            warn!("OTA begin: {:?}", e);
            UpdateError::Begin
        })?;

        let mut chunk = [0u8; CHUNK_SIZE];
        let mut done: u32 = 0;
        loop {
            let read = response.read(&mut chunk).map_err(|e| {
                warn!("OTA download: {:?}", e);
                UpdateError::Receive
            })?;
            if read == 0 {
                break;
            }
            update.write(&chunk[..read]).map_err(|e| {
                warn!("OTA write: {:?}", e);
                UpdateError::Receive
            })?;
            done = done.saturating_add(read as u32);
            observer.on_progress(done, total.max(done));
        }

        if done == 0 {
            return Err(UpdateError::Receive);
        }
        update.complete().map_err(|e| {
            warn!("OTA finalize: {:?}", e);
            UpdateError::End
        })
    }
}

impl UpdateChannel for OtaChannel {
    fn begin(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
        match EspOta::new().and_then(|mut ota| ota.mark_running_slot_valid()) {
            Ok(()) => info!("OTA ready for {}", self.hostname),
            Err(e) => warn!("Failed to mark running OTA slot valid: {:?}", e),
        }
    }

    fn handle(&mut self, observer: &mut dyn UpdateObserver) {
        let Ok(url) = self.requests.try_recv() else {
            return;
        };

        info!("Update for {} from {}", self.hostname, url);
        observer.on_start(UpdateKind::Sketch);
        match self.apply(&url, observer) {
            Ok(()) => {
                observer.on_end();
                esp_idf_svc::hal::reset::restart();
            }
            Err(e) => observer.on_error(e),
        }
    }
}
