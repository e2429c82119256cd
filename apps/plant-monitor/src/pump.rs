use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("invalid pump id {0}")]
    InvalidId(i64),
    #[error("pump device address is not configured")]
    NotConfigured,
    #[error("invalid pump device url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to contact pump device: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct PumpCommand {
    id: u32,
    on: bool,
}

/// Result of a forwarded command. Any HTTP response from the device counts as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpAck {
    pub id: u32,
    pub on: bool,
    pub device_status: u16,
}

/// Forwards pump on/off commands to the irrigation device. Never retries.
#[derive(Clone)]
pub struct PumpClient {
    client: Client,
    device_url: Option<Url>,
    pump_count: u32,
    timeout: Duration,
}

impl PumpClient {
    pub fn new(device_url: Option<Url>, pump_count: u32, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            device_url,
            pump_count,
            timeout,
        }
    }

    pub fn validate_id(&self, id: i64) -> Result<u32, PumpError> {
        u32::try_from(id)
            .ok()
            .filter(|id| *id < self.pump_count)
            .ok_or(PumpError::InvalidId(id))
    }

    pub async fn set_pump(&self, id: i64, on: bool) -> Result<PumpAck, PumpError> {
        let id = self.validate_id(id)?;
        let base = self.device_url.as_ref().ok_or(PumpError::NotConfigured)?;
        let url = base.join("set_pump")?;

        let response = self
            .client
            .post(url)
            .json(&PumpCommand { id, on })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(pump = id, on, error = %err, "pump command failed");
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(pump = id, on, status = %status, "pump device returned non-success");
        }
        Ok(PumpAck {
            id,
            on,
            device_status: status.as_u16(),
        })
    }
}

/// Turns `NODEMCU_IP`-style values (`192.168.1.40`, `host:8080`) or full URLs into a base URL.
pub fn parse_device_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
