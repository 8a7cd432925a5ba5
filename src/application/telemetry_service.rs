// Telemetry service: request guardrails and orchestration of discovery,
// availability probing, the main query and the transformer.
use crate::application::discovery::DiscoveryService;
use crate::application::store::TelemetryStore;
use crate::application::transform::transform_rows;
use crate::domain::error::{TelemetryError, TelemetryResult};
use crate::domain::sample::SampleRow;
use crate::domain::telemetry::{
    AvailabilityReport, DataInfo, RecommendedRange, TelemetryResponse, TimeRange,
};
use crate::infrastructure::flux::{AggregateWindow, FluxQueryBuilder};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const MAX_RANGE_DAYS: i64 = 60;

/// Fallback width for the recommended-range heuristic when neither recency
/// window holds data.
const FALLBACK_SAMPLE_COUNT: usize = 1000;

#[derive(Clone)]
pub struct TelemetryService {
    store: Arc<dyn TelemetryStore>,
    discovery: DiscoveryService,
    queries: FluxQueryBuilder,
}

impl TelemetryService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        discovery: DiscoveryService,
        queries: FluxQueryBuilder,
    ) -> Self {
        Self {
            store,
            discovery,
            queries,
        }
    }

    pub async fn list_device_ids(&self) -> TelemetryResult<Vec<String>> {
        let ids = self.discovery.device_ids().await?;
        if ids.is_empty() {
            return Err(TelemetryError::ResourceNotFound(
                "no device identifiers found".to_string(),
            ));
        }
        Ok(ids)
    }

    pub async fn list_fields(&self, device_id: &str) -> TelemetryResult<Vec<String>> {
        self.discovery.fields(device_id).await
    }

    pub async fn list_fuel_channels(&self, device_id: &str) -> TelemetryResult<Vec<String>> {
        self.discovery.fuel_channels(device_id).await
    }

    pub async fn check_availability(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TelemetryResult<AvailabilityReport> {
        // Only the ordering check here: the 60-day cap guards the full
        // telemetry query, while the probe is bounded on its own.
        if start >= end {
            return Err(TelemetryError::InvalidRange(
                "start must be before end".to_string(),
            ));
        }

        if !self.device_exists(device_id).await? {
            return Ok(AvailabilityReport::no_data());
        }

        let probe = self
            .store
            .run_query(&self.queries.availability_probe(device_id, start, end))
            .await?;
        let mut times = probe_times(&probe.rows);
        times.sort_unstable();

        let (Some(first), Some(last)) = (times.first().copied(), times.last().copied()) else {
            return Ok(AvailabilityReport::no_data());
        };

        let fields = self.discovery.fields(device_id).await?;
        Ok(AvailabilityReport {
            has_data: true,
            data_range: Some(TimeRange { start: first, end: last }),
            available_fields: fields,
            estimated_points: estimate_points(&times, start, end),
        })
    }

    async fn device_exists(&self, device_id: &str) -> TelemetryResult<bool> {
        let batch = self
            .store
            .run_query(&self.queries.device_exists(device_id))
            .await?;
        Ok(!batch.rows.is_empty())
    }

    pub async fn recommended_range(&self, device_id: &str) -> TelemetryResult<Option<RecommendedRange>> {
        let batch = self
            .store
            .run_query(&self.queries.recent_timestamps(device_id))
            .await?;
        let mut times = probe_times(&batch.rows);
        times.sort_unstable();
        Ok(recommend_from_times(&times))
    }

    pub async fn get_telemetry(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TelemetryResult<TelemetryResponse> {
        validate_range(start, end)?;

        let channels = self.discovery.fuel_channels(device_id).await?;
        let window = AggregateWindow::for_span(start, end);

        // Existence check, then the windowed probe, so a device/window with
        // no data never pays for the full telemetry query.
        if !self.device_exists(device_id).await? {
            tracing::debug!(device_id, "device has no data at all, returning empty response");
            return Ok(TelemetryResponse::empty(channels, window.is_some()));
        }

        let probe = self
            .store
            .run_query(&self.queries.availability_probe(device_id, start, end))
            .await?;
        if probe.rows.is_empty() {
            tracing::debug!(device_id, "availability probe empty, returning empty response");
            return Ok(TelemetryResponse::empty(channels, window.is_some()));
        }

        let flux = self.queries.telemetry(device_id, start, end, &channels, window);
        let batch = self.store.run_query(&flux).await?;
        let data = transform_rows(&batch.rows);
        if data.dropped_rows > 0 {
            tracing::debug!(device_id, dropped = data.dropped_rows, "rows excluded during transform");
        }

        let time_range = data.time_bounds().and_then(|(min, max)| {
            Some(TimeRange {
                start: DateTime::from_timestamp_millis(min)?,
                end: DateTime::from_timestamp_millis(max)?,
            })
        });

        Ok(TelemetryResponse {
            data_info: DataInfo {
                total_points: data.total_points(),
                time_range,
                available_sensors: channels,
                aggregation_applied: window.is_some(),
                truncated: batch.truncated,
            },
            speed: data.speed,
            voltage: data.voltage,
            fuel_channels: data.fuel_channels,
            track: data.track,
        })
    }
}

fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> TelemetryResult<()> {
    if start >= end {
        return Err(TelemetryError::InvalidRange(
            "start must be before end".to_string(),
        ));
    }
    if end - start > Duration::days(MAX_RANGE_DAYS) {
        return Err(TelemetryError::InvalidRange(format!(
            "span exceeds {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(())
}

fn probe_times(rows: &[SampleRow]) -> Vec<DateTime<Utc>> {
    rows.iter().filter_map(|row| row.time).collect()
}

/// Naive average-interval projection of how many points the main query would
/// return. An estimate only; floored at the probed count so it stays
/// monotonic in probed row density.
fn estimate_points(times: &[DateTime<Utc>], start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let n = times.len() as u64;
    if times.len() < 2 {
        return n;
    }

    let covered_ms = (times[times.len() - 1] - times[0]).num_milliseconds();
    if covered_ms <= 0 {
        return n;
    }

    let avg_interval_ms = covered_ms as f64 / (n - 1) as f64;
    let span_ms = (end - start).num_milliseconds() as f64;
    ((span_ms / avg_interval_ms).round() as u64).max(n)
}

/// Recommend the densest recent window: [T-12h, T] when it holds samples
/// besides the latest, widened to 24h, else the earliest of the last 1000
/// samples paired with T.
fn recommend_from_times(times: &[DateTime<Utc>]) -> Option<RecommendedRange> {
    let latest = *times.last()?;

    for hours in [12i64, 24] {
        let window_start = latest - Duration::hours(hours);
        let in_window = times
            .iter()
            .filter(|t| **t >= window_start && **t < latest)
            .count();
        if in_window > 0 {
            return Some(RecommendedRange {
                start: window_start,
                end: latest,
                sample_count: in_window + 1,
            });
        }
    }

    let tail_start = times.len().saturating_sub(FALLBACK_SAMPLE_COUNT);
    Some(RecommendedRange {
        start: times[tail_start],
        end: latest,
        sample_count: times.len() - tail_start,
    })
}
