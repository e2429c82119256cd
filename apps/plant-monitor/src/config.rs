use crate::channels::{ChannelSet, DEFAULT_CHANNELS};
use crate::history::DEFAULT_LOGGED_WINDOW;
use crate::pump::parse_device_url;
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_bind: String,
    pub static_root: Option<PathBuf>,

    pub channels: ChannelSet,
    pub hourly_log_path: PathBuf,
    pub daily_log_path: PathBuf,
    pub history_window: usize,

    pub device_url: Option<Url>,
    pub device_timeout: Duration,
    pub pump_count: u32,

    pub offline_threshold: Duration,
    pub status_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let http_bind = env_string("PLANT_MONITOR_HTTP_BIND", Some("0.0.0.0:5000".to_string()))?;
        let static_root = env_optional("PLANT_MONITOR_STATIC_ROOT").map(PathBuf::from);

        let channels = ChannelSet::parse(&env_string(
            "PLANT_MONITOR_CHANNELS",
            Some(DEFAULT_CHANNELS.to_string()),
        )?)
        .context("invalid PLANT_MONITOR_CHANNELS")?;

        let log_dir = PathBuf::from(env_string("PLANT_MONITOR_LOG_DIR", Some("logs".to_string()))?);
        let hourly_log_path = env_optional("PLANT_MONITOR_HOURLY_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| log_dir.join("hourly_log.csv"));
        let daily_log_path = env_optional("PLANT_MONITOR_DAILY_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| log_dir.join("daily_log.csv"));
        let history_window = env_u64(
            "PLANT_MONITOR_HISTORY_WINDOW",
            Some(DEFAULT_LOGGED_WINDOW as u64),
        )? as usize;

        // Older deployments only set NODEMCU_IP.
        let device_url = match env_optional("PLANT_MONITOR_DEVICE_URL")
            .or_else(|| env_optional("NODEMCU_IP"))
        {
            Some(raw) => Some(parse_device_url(&raw).context("invalid pump device address")?),
            None => None,
        };
        let device_timeout =
            Duration::from_millis(env_u64("PLANT_MONITOR_DEVICE_TIMEOUT_MS", Some(2000))?);
        let pump_count = u32::try_from(env_u64("PLANT_MONITOR_PUMP_COUNT", Some(4))?)
            .context("invalid PLANT_MONITOR_PUMP_COUNT")?;

        let offline_threshold =
            Duration::from_millis(env_u64("PLANT_MONITOR_OFFLINE_THRESHOLD_MS", Some(1500))?);
        let status_poll_interval =
            Duration::from_millis(env_u64("PLANT_MONITOR_STATUS_POLL_INTERVAL_MS", Some(500))?);
        if status_poll_interval.is_zero() {
            return Err(anyhow!("PLANT_MONITOR_STATUS_POLL_INTERVAL_MS must be positive"));
        }

        Ok(Self {
            http_bind,
            static_root,
            channels,
            hourly_log_path,
            daily_log_path,
            history_window,
            device_url,
            device_timeout,
            pump_count,
            offline_threshold,
            status_poll_interval,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
