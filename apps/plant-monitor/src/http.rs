use crate::error::{AppError, AppResult};
use crate::history::HistorySeries;
use crate::liveness::{LinkStatus, LivenessMonitor};
use crate::pump::PumpClient;
use crate::rollup::{Resolution, RollupService};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

#[derive(Clone)]
pub struct HttpState {
    pub rollup: RollupService,
    pub liveness: LivenessMonitor,
    pub pumps: PumpClient,
    pub history_window: usize,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct PumpResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: LinkStatus,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(rename = "type")]
    kind: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClearLogParams {
    log: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    last: Option<usize>,
}

async fn healthz() -> &'static str {
    "ok"
}

/// Device posts land here. The body is decoded leniently: anything unreadable is an empty sample.
async fn post_moisture(State(state): State<HttpState>, body: Bytes) -> AppResult<Json<AckResponse>> {
    let payload: JsonValue = serde_json::from_slice(&body).unwrap_or(JsonValue::Null);
    let sample = state.rollup.channels().decode_sample(&payload);

    state.liveness.record_sample().await;
    state.rollup.ingest(&sample).await?;
    Ok(Json(AckResponse { status: "ok" }))
}

async fn get_moisture(State(state): State<HttpState>) -> Json<Map<String, JsonValue>> {
    let latest = state.rollup.latest().await;
    let readings = state
        .rollup
        .channels()
        .keys()
        .zip(latest)
        .map(|(key, value)| (key.to_string(), JsonValue::from(value)))
        .collect();
    Json(readings)
}

async fn get_history(
    State(state): State<HttpState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Map<String, JsonValue>>> {
    let kind = params.kind.as_deref().unwrap_or("seconds");
    let Some(resolution) = Resolution::from_history_type(kind) else {
        return Err(AppError::json(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Invalid type" }),
        ));
    };

    let (series, newest_first_default) = match resolution {
        Resolution::Second | Resolution::Minute => (state.rollup.query_recent(resolution).await, true),
        Resolution::Hour | Resolution::Day => (
            state
                .rollup
                .query_logged(resolution, state.history_window, Local::now().naive_local())
                .await,
            false,
        ),
    };
    let series = series.map_err(|err| AppError::bad_request(err.to_string()))?;

    let newest_first = match params.order.as_deref().map(str::trim) {
        None | Some("") => newest_first_default,
        Some("desc") => true,
        Some("asc") => false,
        Some(_) => {
            return Err(AppError::json(
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid order" }),
            ))
        }
    };
    let series = if newest_first {
        series.most_recent_first()
    } else {
        series
    };

    Ok(Json(history_body(&state.rollup, series)))
}

fn history_body(rollup: &RollupService, series: HistorySeries) -> Map<String, JsonValue> {
    let mut body = Map::new();
    body.insert("time".to_string(), json!(series.time));
    for (column, values) in rollup.channels().columns().zip(series.values) {
        body.insert(column.to_string(), JsonValue::from(values));
    }
    body
}

async fn get_status(State(state): State<HttpState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.liveness.status().await,
    })
}

async fn post_set_pump(State(state): State<HttpState>, body: Bytes) -> AppResult<Json<PumpResponse>> {
    let payload: JsonValue = serde_json::from_slice(&body).unwrap_or(JsonValue::Null);
    let (Some(id), Some(on)) = (payload.get("id"), payload.get("on")) else {
        return Err(AppError::bad_request("Invalid JSON"));
    };
    let Some(on) = on.as_bool() else {
        return Err(AppError::bad_request("Invalid JSON"));
    };
    let Some(id) = id.as_i64() else {
        return Err(AppError::bad_request("Invalid pump ID"));
    };

    let ack = state.pumps.set_pump(id, on).await?;
    tracing::info!(pump = ack.id, on = ack.on, device_status = ack.device_status, "pump command forwarded");
    Ok(Json(PumpResponse {
        status: "ok",
        message: format!(
            "Pump {} {} - device responded with {}",
            ack.id,
            if ack.on { "ON" } else { "OFF" },
            ack.device_status
        ),
    }))
}

async fn download_log(
    state: &HttpState,
    resolution: Resolution,
    params: DownloadParams,
) -> AppResult<Response> {
    let Some(log) = state.rollup.log(resolution) else {
        return Err(AppError::not_found("No log file found"));
    };
    let filename = log
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log.csv".to_string());
    let Some(body) = state.rollup.export_log(resolution, params.last).await? else {
        return Err(AppError::not_found("No log file found"));
    };

    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn get_hourly_log(
    State(state): State<HttpState>,
    Query(params): Query<DownloadParams>,
) -> AppResult<Response> {
    download_log(&state, Resolution::Hour, params).await
}

async fn get_daily_log(
    State(state): State<HttpState>,
    Query(params): Query<DownloadParams>,
) -> AppResult<Response> {
    download_log(&state, Resolution::Day, params).await
}

async fn clear_log(
    State(state): State<HttpState>,
    Query(params): Query<ClearLogParams>,
) -> AppResult<&'static str> {
    let resolution = match params.log.as_deref().map(str::trim) {
        None | Some("") | Some("hourly") => Resolution::Hour,
        Some("daily") => Resolution::Day,
        Some(_) => return Err(AppError::bad_request("Invalid log")),
    };
    state.rollup.clear_log(resolution).await?;
    Ok("Log cleared.")
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/moisture", get(get_moisture).post(post_moisture))
        .route("/history", get(get_history))
        .route("/status", get(get_status))
        .route("/set_pump", post(post_set_pump))
        .route("/hourly_log.csv", get(get_hourly_log))
        .route("/daily_log.csv", get(get_daily_log))
        .route("/clear_log", get(clear_log))
        .with_state(state)
}
