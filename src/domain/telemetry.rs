// Telemetry response models
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// A geographic fix produced only when latitude and longitude rows share a
/// timestamp and both pass range validity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub time_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub epoch_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelChannel {
    pub channel: u8,
    pub unit: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl FuelChannel {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            unit: "percent".to_string(),
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Summary attached to every telemetry response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInfo {
    pub total_points: usize,
    pub time_range: Option<TimeRange>,
    pub available_sensors: Vec<String>,
    pub aggregation_applied: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryResponse {
    pub speed: Vec<TimeSeriesPoint>,
    pub voltage: Vec<TimeSeriesPoint>,
    pub fuel_channels: BTreeMap<u8, FuelChannel>,
    pub track: Vec<TrackPoint>,
    pub data_info: DataInfo,
}

impl TelemetryResponse {
    /// The explicit empty shape returned when the availability probe finds
    /// nothing for a device/window: all series empty, zero total points.
    pub fn empty(available_sensors: Vec<String>, aggregation_applied: bool) -> Self {
        Self {
            speed: Vec::new(),
            voltage: Vec::new(),
            fuel_channels: BTreeMap::new(),
            track: Vec::new(),
            data_info: DataInfo {
                total_points: 0,
                time_range: None,
                available_sensors,
                aggregation_applied,
                truncated: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub has_data: bool,
    pub data_range: Option<TimeRange>,
    pub available_fields: Vec<String>,
    pub estimated_points: u64,
}

impl AvailabilityReport {
    pub fn no_data() -> Self {
        Self {
            has_data: false,
            data_range: None,
            available_fields: Vec::new(),
            estimated_points: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sample_count: usize,
}

/// Advisory connection state surfaced on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_tested_at: Option<DateTime<Utc>>,
}
