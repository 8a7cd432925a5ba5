// Result transformer: flat field-tagged rows into typed, unit-corrected
// series and a geographic track.
use crate::domain::sample::{SampleField, SampleRow};
use crate::domain::telemetry::{FuelChannel, TimeSeriesPoint, TrackPoint};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct TransformedTelemetry {
    pub speed: Vec<TimeSeriesPoint>,
    pub voltage: Vec<TimeSeriesPoint>,
    pub fuel_channels: BTreeMap<u8, FuelChannel>,
    pub track: Vec<TrackPoint>,
    /// Rows excluded for non-numeric values, unknown fields or invalid
    /// coordinates. Never surfaced to the caller.
    pub dropped_rows: usize,
}

impl TransformedTelemetry {
    pub fn total_points(&self) -> usize {
        self.speed.len()
            + self.voltage.len()
            + self.fuel_channels.values().map(|c| c.points.len()).sum::<usize>()
            + self.track.len()
    }

    /// Earliest and latest retained timestamp across all series and the track.
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        let times = self
            .speed
            .iter()
            .chain(self.voltage.iter())
            .chain(self.fuel_channels.values().flat_map(|c| c.points.iter()))
            .map(|p| p.time_ms)
            .chain(self.track.iter().map(|p| p.time_ms));

        let mut bounds: Option<(i64, i64)> = None;
        for t in times {
            bounds = Some(match bounds {
                None => (t, t),
                Some((min, max)) => (min.min(t), max.max(t)),
            });
        }
        bounds
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TrackCandidate {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Consume the main telemetry row stream. Rows arrive time-sorted from the
/// store; series keep arrival order, track candidates are merged by
/// timestamp and re-sorted defensively at the end.
pub fn transform_rows(rows: &[SampleRow]) -> TransformedTelemetry {
    let mut out = TransformedTelemetry::default();
    let mut track_buffer: BTreeMap<i64, TrackCandidate> = BTreeMap::new();

    for row in rows {
        let Some(time) = row.time else {
            out.dropped_rows += 1;
            continue;
        };
        let Ok(raw) = row.value.trim().parse::<f64>() else {
            out.dropped_rows += 1;
            continue;
        };
        let Some(kind) = SampleField::classify(&row.field) else {
            out.dropped_rows += 1;
            continue;
        };
        let time_ms = time.timestamp_millis();

        match kind {
            SampleField::Speed => {
                // Sensor noise can report negative speed; clamp instead of drop.
                out.speed.push(TimeSeriesPoint::new(time_ms, round2(raw.max(0.0))));
            }
            SampleField::Voltage => {
                // Raw voltage is integer millivolts.
                out.voltage.push(TimeSeriesPoint::new(time_ms, round2(raw / 1000.0)));
            }
            SampleField::Latitude => {
                if valid_latitude(raw) {
                    track_buffer.entry(time_ms).or_default().latitude = Some(raw);
                } else {
                    out.dropped_rows += 1;
                }
            }
            SampleField::Longitude => {
                if valid_longitude(raw) {
                    track_buffer.entry(time_ms).or_default().longitude = Some(raw);
                } else {
                    out.dropped_rows += 1;
                }
            }
            SampleField::Fuel(channel) => {
                out.fuel_channels
                    .entry(channel)
                    .or_insert_with(|| FuelChannel::new(channel))
                    .points
                    .push(TimeSeriesPoint::new(time_ms, round2(raw)));
            }
        }
    }

    let mut track: Vec<TrackPoint> = track_buffer
        .into_iter()
        .filter_map(|(time_ms, candidate)| match (candidate.latitude, candidate.longitude) {
            (Some(lat), Some(lon)) if valid_latitude(lat) && valid_longitude(lon) => Some(TrackPoint {
                time_ms,
                latitude: lat,
                longitude: lon,
                epoch_seconds: time_ms / 1000,
            }),
            _ => None,
        })
        .collect();
    track.sort_by_key(|p| p.time_ms);
    out.track = track;

    out
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Zero is a sentinel for "no fix" and rejected along with out-of-range values.
fn valid_latitude(value: f64) -> bool {
    value != 0.0 && (-90.0..=90.0).contains(&value)
}

fn valid_longitude(value: f64) -> bool {
    value != 0.0 && (-180.0..=180.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn row(secs: i64, field: &str, value: &str) -> SampleRow {
        SampleRow::new(Some(at(secs)), field, value)
    }

    #[test]
    fn voltage_is_converted_from_millivolts() {
        let out = transform_rows(&[row(0, "main_power_voltage", "12345")]);
        assert_eq!(out.voltage, vec![TimeSeriesPoint::new(0, 12.35)]);
    }

    #[test]
    fn negative_speed_is_clamped_not_dropped() {
        let out = transform_rows(&[row(0, "speed", "-3.2")]);
        assert_eq!(out.speed, vec![TimeSeriesPoint::new(0, 0.0)]);
        assert_eq!(out.dropped_rows, 0);
    }

    #[test]
    fn zero_latitude_drops_the_whole_track_point() {
        let out = transform_rows(&[row(10, "latitude", "0"), row(10, "longitude", "55.0")]);
        assert!(out.track.is_empty());
    }

    #[test]
    fn coordinates_sharing_a_timestamp_become_one_track_point() {
        let out = transform_rows(&[
            row(10, "latitude", "52.5"),
            row(10, "longitude", "13.4"),
            row(20, "latitude", "52.6"),
        ]);

        assert_eq!(out.track.len(), 1);
        assert_eq!(out.track[0].latitude, 52.5);
        assert_eq!(out.track[0].longitude, 13.4);
        assert_eq!(out.track[0].epoch_seconds, 10);
    }

    #[test]
    fn track_is_sorted_regardless_of_arrival_order() {
        let out = transform_rows(&[
            row(30, "latitude", "52.7"),
            row(10, "latitude", "52.5"),
            row(30, "longitude", "13.7"),
            row(10, "longitude", "13.5"),
        ]);

        let times: Vec<i64> = out.track.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![10_000, 30_000]);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let out = transform_rows(&[
            row(10, "latitude", "91.0"),
            row(10, "longitude", "13.4"),
            row(20, "latitude", "52.5"),
            row(20, "longitude", "-181.0"),
        ]);
        assert!(out.track.is_empty());
        assert_eq!(out.dropped_rows, 2);
    }

    #[test]
    fn non_numeric_values_are_counted_and_skipped() {
        let out = transform_rows(&[row(0, "speed", "n/a"), row(1, "speed", "14.239")]);
        assert_eq!(out.dropped_rows, 1);
        assert_eq!(out.speed, vec![TimeSeriesPoint::new(1000, 14.24)]);
    }

    #[test]
    fn fuel_rows_are_keyed_by_channel_suffix() {
        let out = transform_rows(&[
            row(0, "fuel_level_2", "81.333"),
            row(5, "fuel_level_2", "81.1"),
            row(0, "fuel_level_4", "40.0"),
        ]);

        assert_eq!(out.fuel_channels.len(), 2);
        assert_eq!(out.fuel_channels[&2].points.len(), 2);
        assert_eq!(out.fuel_channels[&2].points[0].value, 81.33);
        assert_eq!(out.fuel_channels[&2].unit, "percent");
        assert_eq!(out.total_points(), 3);
    }

    #[test]
    fn time_bounds_span_all_series_and_track() {
        let out = transform_rows(&[
            row(5, "speed", "10"),
            row(50, "fuel_level_1", "75"),
            row(2, "latitude", "52.5"),
            row(2, "longitude", "13.4"),
        ]);
        assert_eq!(out.time_bounds(), Some((2000, 50_000)));
    }
}
