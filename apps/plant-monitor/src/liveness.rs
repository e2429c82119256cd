use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Online,
    Offline,
}

#[derive(Debug)]
struct LivenessState {
    last_post: Option<Instant>,
    status: LinkStatus,
}

/// Tracks whether the sensor device is still posting. Independent of the rollup lock so status
/// polling never waits behind ingestion.
#[derive(Clone)]
pub struct LivenessMonitor {
    state: Arc<Mutex<LivenessState>>,
    offline_threshold: Duration,
}

impl LivenessMonitor {
    pub fn new(offline_threshold: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LivenessState {
                last_post: None,
                status: LinkStatus::Offline,
            })),
            offline_threshold,
        }
    }

    pub async fn status(&self) -> LinkStatus {
        self.state.lock().await.status
    }

    pub async fn record_sample(&self) -> bool {
        self.record_sample_at(Instant::now()).await
    }

    /// Notes a sample arrival. Returns true only on the offline -> online edge.
    pub async fn record_sample_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        state.last_post = Some(now);
        if state.status == LinkStatus::Offline {
            state.status = LinkStatus::Online;
            tracing::info!("sensor device online");
            return true;
        }
        false
    }

    /// Returns true only on the online -> offline edge.
    pub async fn poll_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        if state.status == LinkStatus::Offline {
            return false;
        }
        let Some(last_post) = state.last_post else {
            return false;
        };
        if now.saturating_duration_since(last_post) > self.offline_threshold {
            state.status = LinkStatus::Offline;
            tracing::info!(
                silent_ms = now.saturating_duration_since(last_post).as_millis() as u64,
                "sensor device offline"
            );
            return true;
        }
        false
    }
}

/// Polls `monitor` every `interval` until `stop` flips to true or its sender goes away.
pub async fn run(monitor: LivenessMonitor, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.poll_at(Instant::now()).await;
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    tracing::debug!("liveness monitor stopped");
                    break;
                }
            }
        }
    }
}
