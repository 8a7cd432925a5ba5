// HTTP request handlers
use crate::domain::error::TelemetryError;
use crate::domain::telemetry::{
    AvailabilityReport, ConnectionStatus, RecommendedRange, TelemetryResponse,
};
use crate::presentation::app_state::AppState;
use crate::presentation::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

fn parse_range(query: &RangeQuery) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let parse = |label: &str, value: &str| {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ApiError(TelemetryError::InvalidRange(format!("invalid {label}: {e}"))))
    };
    Ok((parse("start", &query.start)?, parse("end", &query.end)?))
}

/// Connection health, lazily re-probed when stale
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    Json(state.store.connection_status().await)
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.telemetry_service.list_device_ids().await?))
}

pub async fn list_fields(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.telemetry_service.list_fields(&id).await?))
}

pub async fn list_fuel_channels(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.telemetry_service.list_fuel_channels(&id).await?))
}

pub async fn check_availability(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AvailabilityReport>> {
    let (start, end) = parse_range(&query)?;
    Ok(Json(
        state
            .telemetry_service
            .check_availability(&id, start, end)
            .await?,
    ))
}

pub async fn recommended_range(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Option<RecommendedRange>>> {
    Ok(Json(state.telemetry_service.recommended_range(&id).await?))
}

pub async fn get_telemetry(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<TelemetryResponse>> {
    let (start, end) = parse_range(&query)?;
    Ok(Json(
        state.telemetry_service.get_telemetry(&id, start, end).await?,
    ))
}
