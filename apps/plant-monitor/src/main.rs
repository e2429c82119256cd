mod aggregate_log;
mod channels;
mod config;
mod error;
mod history;
mod http;
mod liveness;
mod pump;
mod rollup;
mod static_assets;

use crate::aggregate_log::AggregateLog;
use crate::config::Config;
use crate::liveness::LivenessMonitor;
use crate::pump::PumpClient;
use crate::rollup::RollupService;
use anyhow::Result;
use tokio::sync::watch;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,plant_monitor=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let hourly_log = AggregateLog::new(&config.hourly_log_path, "datetime", &config.channels);
    let daily_log = AggregateLog::new(&config.daily_log_path, "date", &config.channels);
    let rollup = RollupService::new(config.channels.clone(), hourly_log, daily_log);
    let liveness = LivenessMonitor::new(config.offline_threshold);
    let pumps = PumpClient::new(config.device_url.clone(), config.pump_count, config.device_timeout);
    if config.device_url.is_none() {
        tracing::warn!("no pump device address configured; /set_pump will report an error");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let liveness_handle = tokio::spawn(liveness::run(
        liveness.clone(),
        config.status_poll_interval,
        stop_rx,
    ));

    let app = http::router(http::HttpState {
        rollup,
        liveness,
        pumps,
        history_window: config.history_window,
    })
    .merge(static_assets::service(config.static_root.clone())?);

    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(
        bind = %config.http_bind,
        channels = config.channels.len(),
        hourly_log = %config.hourly_log_path.display(),
        daily_log = %config.daily_log_path.display(),
        "plant-monitor HTTP listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    stop_tx.send(true).ok();
    liveness_handle.await.ok();
    Ok(())
}
