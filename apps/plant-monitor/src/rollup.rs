mod engine;
mod window;

#[cfg(test)]
mod tests;

pub use engine::IngestOutcome;

use crate::aggregate_log::{AggregateLog, AggregateLogError};
use crate::channels::{ChannelSet, Sample};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) use engine::RollupEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Second,
    Minute,
    Hour,
    Day,
}

impl Resolution {
    pub fn capacity(self) -> usize {
        match self {
            Resolution::Second => 60,
            Resolution::Minute => 60,
            Resolution::Hour => 24,
            Resolution::Day => 60,
        }
    }

    /// Resolution named by the `type` parameter of a history request. Only the exact plural
    /// names are accepted.
    pub fn from_history_type(raw: &str) -> Option<Self> {
        match raw {
            "seconds" => Some(Resolution::Second),
            "minutes" => Some(Resolution::Minute),
            "hours" => Some(Resolution::Hour),
            "days" => Some(Resolution::Day),
            _ => None,
        }
    }
}

/// First column of an hourly log row.
pub fn hour_label(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:00").to_string()
}

/// First column of a daily log row.
pub fn day_label(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub resolution: Resolution,
    pub label: String,
    pub values: Vec<i64>,
}

/// Shared handle over the rollup engine and the hourly/daily logs it feeds.
///
/// One lock guards every window and marker. Ingest holds it across the log appends so rows land
/// on disk in the same order the cascades happened, and readers never see a half-applied cascade.
#[derive(Clone)]
pub struct RollupService {
    engine: Arc<Mutex<RollupEngine>>,
    channels: Arc<ChannelSet>,
    hourly_log: AggregateLog,
    daily_log: AggregateLog,
}

impl RollupService {
    pub fn new(channels: ChannelSet, hourly_log: AggregateLog, daily_log: AggregateLog) -> Self {
        Self {
            engine: Arc::new(Mutex::new(RollupEngine::new(channels.len()))),
            channels: Arc::new(channels),
            hourly_log,
            daily_log,
        }
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn log(&self, resolution: Resolution) -> Option<&AggregateLog> {
        match resolution {
            Resolution::Hour => Some(&self.hourly_log),
            Resolution::Day => Some(&self.daily_log),
            Resolution::Second | Resolution::Minute => None,
        }
    }

    pub async fn ingest(&self, sample: &Sample) -> Result<IngestOutcome, AggregateLogError> {
        self.ingest_at(sample, Local::now().naive_local()).await
    }

    /// Applies one sample at `now`. If a log append fails the in-memory windows keep the update.
    pub async fn ingest_at(
        &self,
        sample: &Sample,
        now: NaiveDateTime,
    ) -> Result<IngestOutcome, AggregateLogError> {
        let mut engine = self.engine.lock().await;
        let outcome = engine.ingest(sample, now);
        if outcome.gap_ticks > 0 {
            tracing::debug!(ticks = outcome.gap_ticks, "filled missing seconds");
        }
        if outcome.minute_rolled {
            tracing::debug!(at = %now, "minute rollup");
        }
        for row in &outcome.rows {
            let Some(log) = self.log(row.resolution) else {
                continue;
            };
            if let Err(err) = log.append(&row.label, &row.values) {
                tracing::warn!(error = %err, label = %row.label, "failed to persist aggregate row");
                return Err(err);
            }
            tracing::info!(
                resolution = ?row.resolution,
                label = %row.label,
                values = ?row.values,
                "aggregate row written"
            );
        }
        drop(engine);
        Ok(outcome)
    }

    /// Every channel's window at `resolution`, oldest first.
    pub async fn snapshot(&self, resolution: Resolution) -> Vec<Vec<i64>> {
        self.engine.lock().await.snapshot(resolution)
    }

    /// Most recent reading per channel, sentinel when nothing has arrived yet.
    pub async fn latest(&self) -> Vec<i64> {
        self.engine.lock().await.latest()
    }

    /// Resets the log for `resolution` to its header. Runs under the engine lock so it cannot
    /// interleave with a cascade append.
    pub async fn clear_log(&self, resolution: Resolution) -> Result<(), AggregateLogError> {
        let _engine = self.engine.lock().await;
        match self.log(resolution) {
            Some(log) => log.clear(),
            None => Ok(()),
        }
    }

    /// Contents of the log for `resolution`, or only its header plus the last `last` rows. `None`
    /// when the log has never been written. Read under the engine lock so a download never sees a
    /// partially appended row.
    pub async fn export_log(
        &self,
        resolution: Resolution,
        last: Option<usize>,
    ) -> Result<Option<Vec<u8>>, AggregateLogError> {
        let _engine = self.engine.lock().await;
        let Some(log) = self.log(resolution) else {
            return Ok(None);
        };
        if !log.exists() {
            return Ok(None);
        }
        match last {
            Some(n) => log.export_last_n(n).map(Some),
            None => log.read_raw().map(Some),
        }
    }

    pub(crate) async fn lock_engine(&self) -> tokio::sync::MutexGuard<'_, RollupEngine> {
        self.engine.lock().await
    }
}
