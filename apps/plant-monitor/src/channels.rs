use anyhow::{anyhow, Result};
use serde_json::Value as JsonValue;

/// Reading value meaning "no valid reading". Excluded from every average.
pub const SENTINEL: i64 = -1;

pub const DEFAULT_CHANNELS: &str = "moist1=plant1,moist2=plant2,moist3=plant3,moist4=plant4,\
temperature=temperature,humidity=humidity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Field name the device posts the reading under.
    pub key: String,
    /// Column name used in the aggregate logs and history responses.
    pub column: String,
}

/// Fixed, positionally addressed set of channels. Never changes after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(anyhow!("channel set must contain at least one channel"));
        }
        for (idx, channel) in channels.iter().enumerate() {
            if channels[..idx].iter().any(|other| other.key == channel.key) {
                return Err(anyhow!("duplicate channel key {}", channel.key));
            }
            if channels[..idx].iter().any(|other| other.column == channel.column) {
                return Err(anyhow!("duplicate channel column {}", channel.column));
            }
        }
        Ok(Self { channels })
    }

    /// Parses `key=column` pairs separated by commas. A bare `key` uses itself as the column.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut channels = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, column) = match part.split_once('=') {
                Some((key, column)) => (key.trim(), column.trim()),
                None => (part, part),
            };
            if key.is_empty() || column.is_empty() {
                return Err(anyhow!("invalid channel definition {part:?}"));
            }
            channels.push(Channel {
                key: key.to_string(),
                column: column.to_string(),
            });
        }
        Self::new(channels)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.column.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.key.as_str())
    }

    /// Decodes a device payload into a sample. Anything that is not a JSON object counts as an
    /// empty payload, and any channel without a usable integer reading becomes the sentinel.
    pub fn decode_sample(&self, payload: &JsonValue) -> Sample {
        let object = payload.as_object();
        let readings = self
            .channels
            .iter()
            .map(|channel| {
                object
                    .and_then(|map| map.get(&channel.key))
                    .and_then(reading_from_json)
                    .unwrap_or(SENTINEL)
            })
            .collect();
        Sample { readings }
    }
}

fn reading_from_json(value: &JsonValue) -> Option<i64> {
    if let Some(v) = value.as_i64() {
        return Some(v);
    }
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

/// One arrival event: a reading per channel, in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    readings: Vec<i64>,
}

impl Sample {
    pub fn new(readings: Vec<i64>) -> Self {
        Self { readings }
    }

    /// Reading for `channel`, or the sentinel when the sample carries no value for it.
    pub fn reading(&self, channel: usize) -> i64 {
        self.readings.get(channel).copied().unwrap_or(SENTINEL)
    }
}
