// Sample row model and field classification
use chrono::{DateTime, Utc};

pub const FIELD_SPEED: &str = "speed";
pub const FIELD_LATITUDE: &str = "latitude";
pub const FIELD_LONGITUDE: &str = "longitude";
pub const FIELD_VOLTAGE: &str = "main_power_voltage";

/// Base fields requested by every main telemetry query, before any
/// discovered fuel channels are added.
pub const BASE_FIELDS: [&str; 4] = [FIELD_SPEED, FIELD_LATITUDE, FIELD_LONGITUDE, FIELD_VOLTAGE];

pub const FUEL_FIELD_PREFIX: &str = "fuel_level_";

/// One column-tagged row as returned by the store.
///
/// Discovery queries push their result into `value` only (distinct tag or
/// field values); telemetry rows carry time, field and value; availability
/// probes carry time only.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub time: Option<DateTime<Utc>>,
    pub field: String,
    pub value: String,
}

impl SampleRow {
    pub fn new(time: Option<DateTime<Utc>>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            time,
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A batch of rows materialized from one query, with a marker for whether
/// the store client stopped buffering at its row cap.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub rows: Vec<SampleRow>,
    pub truncated: bool,
}

impl RowBatch {
    pub fn from_rows(rows: Vec<SampleRow>) -> Self {
        Self {
            rows,
            truncated: false,
        }
    }
}

/// Closed set of channels this service understands. Classification happens
/// once, right after parsing, so the transformation downstream is matched
/// exhaustively instead of being keyed by raw field strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleField {
    Speed,
    Voltage,
    Latitude,
    Longitude,
    Fuel(u8),
}

impl SampleField {
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            FIELD_SPEED => Some(Self::Speed),
            FIELD_VOLTAGE => Some(Self::Voltage),
            FIELD_LATITUDE => Some(Self::Latitude),
            FIELD_LONGITUDE => Some(Self::Longitude),
            other => fuel_channel_suffix(other).map(Self::Fuel),
        }
    }
}

/// Extract the numeric suffix from a fuel channel field name.
/// Only `fuel_level_1` through `fuel_level_4` qualify.
pub fn fuel_channel_suffix(name: &str) -> Option<u8> {
    let suffix = name.strip_prefix(FUEL_FIELD_PREFIX)?;
    match suffix {
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        _ => None,
    }
}
