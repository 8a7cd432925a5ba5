// Flux query construction for the five query shapes the engine issues.
//
// Every query is parameterized by the bucket and measurement injected from
// configuration. Aggregation granularity is a pure function of the requested
// span; it is the only mechanism bounding row volume for long ranges.
use crate::domain::sample::BASE_FIELDS;
use chrono::{DateTime, SecondsFormat, Utc};

pub const MAX_IDENTIFIERS: usize = 500;
pub const MAX_FIELDS: usize = 200;
pub const MAX_PROBE_ROWS: usize = 5000;
pub const MAX_TELEMETRY_ROWS: usize = 80_000;
pub const MAX_RECENT_TIMESTAMPS: usize = 15_000;

/// Mean-aggregation bucket width, selected from the elapsed span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateWindow {
    OneHour,
    FifteenMinutes,
    ThreeMinutes,
}

impl AggregateWindow {
    pub fn flux_every(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::FifteenMinutes => "15m",
            Self::ThreeMinutes => "3m",
        }
    }

    /// Pure selection: >168h -> 1h, (24h, 168h] -> 15m, (6h, 24h] -> 3m,
    /// <=6h -> raw (None).
    pub fn for_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let hours = (end - start).num_seconds() as f64 / 3600.0;
        if hours > 168.0 {
            Some(Self::OneHour)
        } else if hours > 24.0 {
            Some(Self::FifteenMinutes)
        } else if hours > 6.0 {
            Some(Self::ThreeMinutes)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct FluxQueryBuilder {
    bucket: String,
    measurement: String,
}

impl FluxQueryBuilder {
    pub fn new(bucket: String, measurement: String) -> Self {
        Self { bucket, measurement }
    }

    /// Identifier discovery: wide lookback, distinct device_id tag values.
    pub fn device_ids(&self) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -90d)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\")\n  \
             |> keep(columns: [\"device_id\"])\n  \
             |> group()\n  \
             |> distinct(column: \"device_id\")\n  \
             |> sort(columns: [\"_value\"])\n  \
             |> limit(n: {limit})",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            limit = MAX_IDENTIFIERS,
        )
    }

    /// Fallback identifier discovery: schema helper over a narrower lookback.
    pub fn device_ids_fallback(&self) -> String {
        format!(
            "import \"influxdata/influxdb/schema\"\n\n\
             schema.tagValues(\n  \
             bucket: \"{bucket}\",\n  \
             tag: \"device_id\",\n  \
             predicate: (r) => r._measurement == \"{measurement}\",\n  \
             start: -30d,\n)",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
        )
    }

    /// Field discovery for one identifier.
    pub fn fields(&self, device_id: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -90d)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> keep(columns: [\"_field\"])\n  \
             |> group()\n  \
             |> distinct(column: \"_field\")\n  \
             |> sort(columns: [\"_value\"])\n  \
             |> limit(n: {limit})",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
            limit = MAX_FIELDS,
        )
    }

    pub fn fields_fallback(&self, device_id: &str) -> String {
        format!(
            "import \"influxdata/influxdb/schema\"\n\n\
             schema.fieldKeys(\n  \
             bucket: \"{bucket}\",\n  \
             predicate: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\",\n  \
             start: -30d,\n)",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
        )
    }

    /// Fuel-channel discovery: field names matching the channel pattern.
    pub fn fuel_channels(&self, device_id: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -90d)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> filter(fn: (r) => r._field =~ /^fuel_level_[1-4]$/)\n  \
             |> keep(columns: [\"_field\"])\n  \
             |> group()\n  \
             |> distinct(column: \"_field\")\n  \
             |> sort(columns: [\"_value\"])",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
        )
    }

    /// Narrow existence check: does this identifier have any data at all.
    /// Issued before the windowed probe so unknown devices stop early.
    pub fn device_exists(&self, device_id: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -90d)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> limit(n: 1)",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
        )
    }

    /// Availability probe: bounded, time-windowed timestamp sample used to
    /// decide whether the main query is worth running and to estimate density.
    pub fn availability_probe(&self, device_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: {start}, stop: {stop})\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> keep(columns: [\"_time\"])\n  \
             |> sort(columns: [\"_time\"])\n  \
             |> limit(n: {limit})",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
            start = rfc3339(start),
            stop = rfc3339(end),
            limit = MAX_PROBE_ROWS,
        )
    }

    /// Main telemetry retrieval: base fields plus discovered channels,
    /// optionally mean-aggregated per the span, time sorted, hard capped.
    pub fn telemetry(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        channels: &[String],
        window: Option<AggregateWindow>,
    ) -> String {
        let field_filter = BASE_FIELDS
            .iter()
            .copied()
            .chain(channels.iter().map(String::as_str))
            .map(|f| format!("r._field == \"{}\"", escape(f)))
            .collect::<Vec<_>>()
            .join(" or ");

        let aggregate = match window {
            Some(w) => format!(
                "\n  |> aggregateWindow(every: {}, fn: mean, createEmpty: false)",
                w.flux_every()
            ),
            None => String::new(),
        };

        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: {start}, stop: {stop})\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> filter(fn: (r) => {field_filter}){aggregate}\n  \
             |> sort(columns: [\"_time\"])\n  \
             |> limit(n: {limit})",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
            start = rfc3339(start),
            stop = rfc3339(end),
            limit = MAX_TELEMETRY_ROWS,
        )
    }

    /// Recent timestamps for the recommended-range heuristic. `tail` keeps
    /// the latest rows when the device has more than the cap in 30 days.
    pub fn recent_timestamps(&self, device_id: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -30d)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\" and r.device_id == \"{device}\")\n  \
             |> keep(columns: [\"_time\"])\n  \
             |> sort(columns: [\"_time\"])\n  \
             |> tail(n: {limit})",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
            device = escape(device_id),
            limit = MAX_RECENT_TIMESTAMPS,
        )
    }

    /// Minimal single-row query for the connection health probe.
    pub fn ping(&self) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: -72h)\n  \
             |> filter(fn: (r) => r._measurement == \"{measurement}\")\n  \
             |> limit(n: 1)",
            bucket = escape(&self.bucket),
            measurement = escape(&self.measurement),
        )
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Escape a string for interpolation into a Flux string literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
