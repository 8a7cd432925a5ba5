// InfluxDB store client: Flux execution over HTTP with retry, bounded row
// buffering, and connection health tracking.
use crate::application::store::TelemetryStore;
use crate::domain::error::TelemetryResult;
use crate::domain::sample::{RowBatch, SampleRow};
use crate::domain::telemetry::ConnectionStatus;
use crate::infrastructure::config::InfluxSettings;
use crate::infrastructure::flux::FluxQueryBuilder;
use crate::infrastructure::health::ConnectionHealth;
use crate::infrastructure::retry::{with_retry, FailureKind, QueryFailure, RetryPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Rows buffered per query before the client stops materializing further
/// results. Hitting the cap is not a failure, only annotated on the batch.
const MAX_BUFFERED_ROWS: usize = 150_000;

pub struct InfluxStoreClient {
    http: reqwest::Client,
    query_url: String,
    token: String,
    queries: FluxQueryBuilder,
    health: Arc<ConnectionHealth>,
    retry: RetryPolicy,
}

impl InfluxStoreClient {
    pub fn new(
        settings: &InfluxSettings,
        queries: FluxQueryBuilder,
        health: Arc<ConnectionHealth>,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let query_url = format!(
            "{}/api/v2/query?org={}",
            settings.url.trim_end_matches('/'),
            urlencoding::encode(&settings.org),
        );

        Ok(Self {
            http,
            query_url,
            token: settings.token.clone(),
            queries,
            health,
            retry,
        })
    }

    /// One query execution: POST Flux, stream the CSV response body and
    /// parse rows incrementally into a bounded buffer.
    async fn execute_once(&self, flux: &str) -> Result<RowBatch, QueryFailure> {
        tracing::debug!(query = flux, "executing flux query");

        let body = serde_json::json!({
            "query": flux,
            "dialect": { "header": true, "annotations": [] },
        });

        let response = self
            .http
            .post(&self.query_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let mut parser = CsvRowParser::new(MAX_BUFFERED_ROWS);
        let mut pending: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(classify_transport)?;
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                parser.push_line(&String::from_utf8_lossy(&line));
            }
        }
        if !pending.is_empty() {
            parser.push_line(&String::from_utf8_lossy(&pending));
        }

        parser.finish()
    }
}

#[async_trait]
impl TelemetryStore for InfluxStoreClient {
    async fn run_query(&self, flux: &str) -> TelemetryResult<RowBatch> {
        with_retry(&self.retry, || async move {
            let outcome = self.execute_once(flux).await;
            self.health.record(outcome.is_ok());
            outcome
        })
        .await
    }

    async fn ping(&self) -> bool {
        let ok = self.execute_once(&self.queries.ping()).await.is_ok();
        self.health.record(ok);
        if !ok {
            tracing::warn!("store health probe failed");
        }
        ok
    }

    async fn connection_status(&self) -> ConnectionStatus {
        if self.health.needs_probe(Utc::now()) {
            self.ping().await;
        }
        self.health.snapshot()
    }
}

fn classify_transport(err: reqwest::Error) -> QueryFailure {
    if err.is_timeout() {
        QueryFailure::new(FailureKind::Timeout, err.to_string())
    } else if err.is_connect() {
        QueryFailure::new(FailureKind::Connection, err.to_string())
    } else {
        classify_text(&err.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> QueryFailure {
    let message = format!("status {}: {}", status.as_u16(), body.trim());
    match status.as_u16() {
        401 | 403 => QueryFailure::new(FailureKind::Authentication, message),
        404 => QueryFailure::new(FailureKind::NotFound, message),
        400 => QueryFailure::new(FailureKind::Syntax, message),
        _ => QueryFailure::new(FailureKind::Unknown, message),
    }
}

/// Textual fallback classification for causes reqwest does not label.
fn classify_text(message: &str) -> QueryFailure {
    let lowered = message.to_lowercase();
    let kind = if lowered.contains("timed out") || lowered.contains("timeout") {
        FailureKind::Timeout
    } else if lowered.contains("connection refused")
        || lowered.contains("dns")
        || lowered.contains("unreachable")
    {
        FailureKind::Connection
    } else if lowered.contains("unauthorized") {
        FailureKind::Authentication
    } else if lowered.contains("not found") {
        FailureKind::NotFound
    } else if lowered.contains("compilation") || lowered.contains("syntax") {
        FailureKind::Syntax
    } else {
        FailureKind::Unknown
    };
    QueryFailure::new(kind, message.to_string())
}

/// Incremental parser for the store's header-per-table CSV output
/// (annotations disabled). Tracks the column positions of _time, _field and
/// _value across table boundaries and stops buffering at the row cap.
struct CsvRowParser {
    cap: usize,
    time_idx: Option<usize>,
    field_idx: Option<usize>,
    value_idx: Option<usize>,
    rows: Vec<SampleRow>,
    truncated: bool,
    overflow: usize,
    error_table: bool,
    error_message: Option<String>,
}

impl CsvRowParser {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            time_idx: None,
            field_idx: None,
            value_idx: None,
            rows: Vec::new(),
            truncated: false,
            overflow: 0,
            error_table: false,
            error_message: None,
        }
    }

    fn push_line(&mut self, raw: &str) {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return;
        }

        let cells = split_csv_line(line);
        if is_header(&cells) {
            self.error_table = cells.iter().any(|c| c == "error");
            self.time_idx = cells.iter().position(|c| c == "_time");
            self.field_idx = cells.iter().position(|c| c == "_field");
            self.value_idx = cells.iter().position(|c| c == "_value");
            return;
        }

        if self.error_table {
            if self.error_message.is_none() {
                self.error_message = cells.iter().find(|c| !c.is_empty()).cloned();
            }
            return;
        }

        if self.rows.len() >= self.cap {
            if !self.truncated {
                tracing::warn!(cap = self.cap, "row buffer cap reached, truncating result");
                self.truncated = true;
            }
            self.overflow += 1;
            return;
        }

        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).cloned().unwrap_or_default();
        let time = self
            .time_idx
            .and_then(|i| cells.get(i))
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        self.rows
            .push(SampleRow::new(time, cell(self.field_idx), cell(self.value_idx)));
    }

    fn finish(self) -> Result<RowBatch, QueryFailure> {
        if let Some(message) = self.error_message {
            return Err(classify_text(&message));
        }
        if self.truncated {
            tracing::warn!(
                buffered = self.rows.len(),
                skipped = self.overflow,
                "query result truncated at buffer cap"
            );
        }
        Ok(RowBatch {
            rows: self.rows,
            truncated: self.truncated,
        })
    }
}

/// Header rows look like `,result,table,_time,...`; data rows carry the
/// result name (usually `_result`) in the same position. Error tables use
/// `error,reference` columns.
fn is_header(cells: &[String]) -> bool {
    let second_is_result = cells.first().is_some_and(|c| c.is_empty())
        && cells.get(1).is_some_and(|c| c == "result");
    let is_error_header = cells.first().is_some_and(|c| c == "error");
    second_is_result || is_error_header
}

/// Minimal CSV field splitter handling double-quoted cells with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::TelemetryError;

    fn unreachable_settings() -> InfluxSettings {
        InfluxSettings {
            // Port 9 (discard) is not served locally, so connects fail fast.
            url: "http://127.0.0.1:9".to_string(),
            org: "fleet".to_string(),
            token: "secret".to_string(),
            bucket: "telemetry".to_string(),
            measurement: "vehicle_data".to_string(),
            request_timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn each_failed_attempt_marks_health_disconnected() {
        let health = Arc::new(ConnectionHealth::new());
        // Start from a healthy record so the test observes the flip.
        health.record(true);
        let before = health.snapshot().last_tested_at.unwrap();

        let queries = FluxQueryBuilder::new("telemetry".to_string(), "vehicle_data".to_string());
        let retry = RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::ZERO,
        };
        let client =
            InfluxStoreClient::new(&unreachable_settings(), queries, health.clone(), retry)
                .unwrap();

        let err = client.run_query("buckets()").await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::ConnectionUnavailable { attempts: 3, .. }
                | TelemetryError::Timeout { attempts: 3 }
        ));

        let status = health.snapshot();
        assert!(!status.connected);
        assert!(status.last_tested_at.unwrap() >= before);
    }

    #[test]
    fn splits_quoted_cells() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line(",_result,0"), vec!["", "_result", "0"]);
        assert_eq!(
            split_csv_line("\"with,comma\",\"esc\"\"aped\""),
            vec!["with,comma", "esc\"aped"]
        );
    }

    #[test]
    fn parses_header_and_data_rows() {
        let mut parser = CsvRowParser::new(10);
        parser.push_line(",result,table,_time,_value,_field\r\n");
        parser.push_line(",_result,0,2024-05-01T10:00:00Z,42.5,speed\r\n");
        parser.push_line(",_result,0,2024-05-01T10:00:05Z,12345,main_power_voltage\r\n");
        parser.push_line("\r\n");

        let batch = parser.finish().unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert!(!batch.truncated);
        assert_eq!(batch.rows[0].field, "speed");
        assert_eq!(batch.rows[0].value, "42.5");
        assert!(batch.rows[0].time.is_some());
    }

    #[test]
    fn reindexes_columns_on_new_table_header() {
        let mut parser = CsvRowParser::new(10);
        parser.push_line(",result,table,_value");
        parser.push_line(",_result,0,veh-001234");
        parser.push_line(",result,table,_field,_value");
        parser.push_line(",_result,1,ignored,veh-005678");

        let batch = parser.finish().unwrap();
        assert_eq!(batch.rows[0].value, "veh-001234");
        assert_eq!(batch.rows[0].time, None);
        assert_eq!(batch.rows[1].value, "veh-005678");
        assert_eq!(batch.rows[1].field, "ignored");
    }

    #[test]
    fn stops_buffering_at_cap_without_failing() {
        let mut parser = CsvRowParser::new(3);
        parser.push_line(",result,table,_value");
        for i in 0..5 {
            parser.push_line(&format!(",_result,0,{i}"));
        }

        let batch = parser.finish().unwrap();
        assert_eq!(batch.rows.len(), 3);
        assert!(batch.truncated);
    }

    #[test]
    fn error_table_surfaces_as_failure() {
        let mut parser = CsvRowParser::new(10);
        parser.push_line("error,reference");
        parser.push_line("compilation failed: unexpected token,897");

        let err = parser.finish().unwrap_err();
        assert_eq!(err.kind, FailureKind::Syntax);
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        use reqwest::StatusCode;
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, "").kind, FailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, "").kind, FailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, "").kind, FailureKind::NotFound);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, "bad flux").kind, FailureKind::Syntax);
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").kind, FailureKind::Unknown);
    }

    #[test]
    fn text_classification_matches_taxonomy() {
        assert_eq!(classify_text("operation timed out").kind, FailureKind::Timeout);
        assert_eq!(classify_text("connection refused").kind, FailureKind::Connection);
        assert_eq!(classify_text("dns error: no such host").kind, FailureKind::Connection);
        assert_eq!(classify_text("unauthorized access").kind, FailureKind::Authentication);
        assert_eq!(classify_text("compilation failed").kind, FailureKind::Syntax);
        assert_eq!(classify_text("something odd").kind, FailureKind::Unknown);
    }
}
