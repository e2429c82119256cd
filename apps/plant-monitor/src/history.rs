use crate::channels::SENTINEL;
use crate::rollup::{day_label, hour_label, Resolution, RollupService};
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_LOGGED_WINDOW: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TimeAxis {
    /// Positions within an in-memory window.
    Offsets(Vec<usize>),
    /// Period labels matching the aggregate log's first column.
    Labels(Vec<String>),
}

/// Dense, fixed-length history: one value per axis point for every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySeries {
    pub time: TimeAxis,
    /// Indexed by channel, then by axis point.
    pub values: Vec<Vec<i64>>,
}

impl HistorySeries {
    /// Reverses every channel's values so the newest entry comes first. The axis is reversed too
    /// when it carries labels; offsets keep counting from zero.
    pub fn most_recent_first(mut self) -> Self {
        for series in &mut self.values {
            series.reverse();
        }
        if let TimeAxis::Labels(labels) = &mut self.time {
            labels.reverse();
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("{0:?} history is kept in memory only")]
    NotLogged(Resolution),
    #[error("{0:?} history is only available from the aggregate logs")]
    NotInMemory(Resolution),
}

impl RollupService {
    /// In-memory history for the second or minute resolution, oldest first, always exactly the
    /// window's capacity long. Missing leading entries are the sentinel.
    pub async fn query_recent(&self, resolution: Resolution) -> Result<HistorySeries, HistoryError> {
        if !matches!(resolution, Resolution::Second | Resolution::Minute) {
            return Err(HistoryError::NotInMemory(resolution));
        }
        let capacity = resolution.capacity();
        let values = self
            .snapshot(resolution)
            .await
            .into_iter()
            .map(|window| pad_front(window, capacity))
            .collect();
        Ok(HistorySeries {
            time: TimeAxis::Offsets((0..capacity).collect()),
            values,
        })
    }

    /// Logged history for the hour or day resolution: `window_size` consecutive periods ending at
    /// the period containing `now`, oldest first. Periods without a row are all-sentinel.
    pub async fn query_logged(
        &self,
        resolution: Resolution,
        window_size: usize,
        now: NaiveDateTime,
    ) -> Result<HistorySeries, HistoryError> {
        let Some(log) = self.log(resolution) else {
            return Err(HistoryError::NotLogged(resolution));
        };
        let labels = period_labels(resolution, window_size, now)?;

        let engine = self.lock_engine().await;
        let rows = match log.read_indexed() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "aggregate log unreadable; returning empty history");
                HashMap::new()
            }
        };
        let channels = engine.channels();
        drop(engine);

        Ok(HistorySeries {
            values: densify(&labels, &rows, channels),
            time: TimeAxis::Labels(labels),
        })
    }
}

fn pad_front(window: Vec<i64>, capacity: usize) -> Vec<i64> {
    if window.len() >= capacity {
        return window;
    }
    let mut padded = vec![SENTINEL; capacity - window.len()];
    padded.extend(window);
    padded
}

/// Labels of the `window_size` periods ending at the one containing `now`, oldest first. Only
/// the logged resolutions have labels.
pub fn period_labels(
    resolution: Resolution,
    window_size: usize,
    now: NaiveDateTime,
) -> Result<Vec<String>, HistoryError> {
    let (anchor, step, label): (_, _, fn(NaiveDateTime) -> String) = match resolution {
        Resolution::Hour => (
            now.date().and_hms_opt(now.hour(), 0, 0).unwrap_or(now),
            ChronoDuration::hours(1),
            hour_label,
        ),
        Resolution::Day => (
            now.date().and_time(NaiveTime::MIN),
            ChronoDuration::days(1),
            day_label,
        ),
        Resolution::Second | Resolution::Minute => return Err(HistoryError::NotLogged(resolution)),
    };
    Ok((0..window_size)
        .rev()
        .filter_map(|back| {
            let offset = step.checked_mul(i32::try_from(back).ok()?)?;
            anchor.checked_sub_signed(offset)
        })
        .map(label)
        .collect())
}

/// One value per label for every channel; labels absent from `rows` become the sentinel.
pub fn densify(labels: &[String], rows: &HashMap<String, Vec<i64>>, channels: usize) -> Vec<Vec<i64>> {
    (0..channels)
        .map(|channel| {
            labels
                .iter()
                .map(|label| {
                    rows.get(label)
                        .and_then(|values| values.get(channel).copied())
                        .unwrap_or(SENTINEL)
                })
                .collect()
        })
        .collect()
}
