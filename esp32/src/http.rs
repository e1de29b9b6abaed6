use embedded_svc::http::client::Client as HttpClient;
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

/// HTTP(S) client trusting the bundled CA certificates.
pub fn new_client() -> anyhow::Result<HttpClient<EspHttpConnection>> {
    let connection = EspHttpConnection::new(&Configuration {
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        buffer_size: Some(4096),
        ..Default::default()
    })?;
    Ok(HttpClient::wrap(connection))
}
