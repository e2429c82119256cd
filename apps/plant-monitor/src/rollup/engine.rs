use super::window::RollingWindow;
use super::{day_label, hour_label, AggregateRow, Resolution};
use crate::channels::{Sample, SENTINEL};
use chrono::{Datelike, NaiveDateTime, Timelike};

/// What a single `ingest` call changed beyond the second window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub gap_ticks: usize,
    pub minute_rolled: bool,
    /// Hourly row first, then the daily row, in the order they must be persisted.
    pub rows: Vec<AggregateRow>,
}

/// All rolling windows plus the boundary markers that decide when a coarser resolution rolls.
#[derive(Debug)]
pub(crate) struct RollupEngine {
    channels: usize,
    seconds: Vec<RollingWindow>,
    minutes: Vec<RollingWindow>,
    hours: Vec<RollingWindow>,
    days: Vec<RollingWindow>,
    last_second: Option<NaiveDateTime>,
    last_minute: Option<NaiveDateTime>,
    last_hour: Option<NaiveDateTime>,
    last_day: Option<NaiveDateTime>,
}

impl RollupEngine {
    pub(crate) fn new(channels: usize) -> Self {
        let windows = |resolution: Resolution| {
            (0..channels)
                .map(|_| RollingWindow::new(resolution.capacity()))
                .collect::<Vec<_>>()
        };
        Self {
            channels,
            seconds: windows(Resolution::Second),
            minutes: windows(Resolution::Minute),
            hours: windows(Resolution::Hour),
            days: windows(Resolution::Day),
            last_second: None,
            last_minute: None,
            last_hour: None,
            last_day: None,
        }
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    pub(crate) fn ingest(&mut self, sample: &Sample, now: NaiveDateTime) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        if let Some(last) = self.last_second {
            let missing = (now - last).num_seconds().saturating_sub(1).max(0) as usize;
            // Anything past one full window would be evicted again immediately.
            let ticks = missing.min(Resolution::Second.capacity());
            for _ in 0..ticks {
                for window in &mut self.seconds {
                    window.push(SENTINEL);
                }
            }
            outcome.gap_ticks = missing;
        }

        for (idx, window) in self.seconds.iter_mut().enumerate() {
            window.push(sample.reading(idx));
        }
        self.last_second = Some(now);

        if let Some(last_minute) = self.last_minute {
            if now.minute() != last_minute.minute() {
                self.roll_minute(now, &mut outcome);
            }
        }

        if self.last_minute.is_none() {
            self.last_minute = Some(now);
        }
        if self.last_hour.is_none() {
            self.last_hour = Some(now);
        }
        if self.last_day.is_none() {
            self.last_day = Some(now);
        }

        outcome
    }

    fn roll_minute(&mut self, now: NaiveDateTime, outcome: &mut IngestOutcome) {
        cascade(&self.seconds, &mut self.minutes);
        self.last_minute = Some(now);
        outcome.minute_rolled = true;

        let Some(last_hour) = self.last_hour else {
            return;
        };
        if now.hour() == last_hour.hour() {
            return;
        }
        let hourly = cascade(&self.minutes, &mut self.hours);
        outcome.rows.push(AggregateRow {
            resolution: Resolution::Hour,
            label: hour_label(now),
            values: hourly,
        });
        self.last_hour = Some(now);

        let Some(last_day) = self.last_day else {
            return;
        };
        if now.day() == last_day.day() {
            return;
        }
        let daily = cascade(&self.hours, &mut self.days);
        outcome.rows.push(AggregateRow {
            resolution: Resolution::Day,
            label: day_label(now),
            values: daily,
        });
        self.last_day = Some(now);
    }

    /// Every channel's window at `resolution`, oldest first.
    pub(crate) fn snapshot(&self, resolution: Resolution) -> Vec<Vec<i64>> {
        self.windows(resolution)
            .iter()
            .map(RollingWindow::to_vec)
            .collect()
    }

    /// Most recent second-resolution reading per channel.
    pub(crate) fn latest(&self) -> Vec<i64> {
        self.seconds
            .iter()
            .map(|w| w.last().unwrap_or(SENTINEL))
            .collect()
    }

    fn windows(&self, resolution: Resolution) -> &[RollingWindow] {
        match resolution {
            Resolution::Second => &self.seconds,
            Resolution::Minute => &self.minutes,
            Resolution::Hour => &self.hours,
            Resolution::Day => &self.days,
        }
    }
}

fn cascade(source: &[RollingWindow], target: &mut [RollingWindow]) -> Vec<i64> {
    source
        .iter()
        .zip(target.iter_mut())
        .map(|(from, to)| {
            let avg = from.average();
            to.push(avg);
            avg
        })
        .collect()
}
