// Discovery service: device identifiers, fields and fuel channels, each
// with a differently-shaped fallback query when the primary yields nothing.
// Empty results are valid outcomes, never errors.
use crate::application::store::TelemetryStore;
use crate::domain::error::TelemetryResult;
use crate::domain::sample::{fuel_channel_suffix, SampleRow};
use crate::infrastructure::flux::FluxQueryBuilder;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Identifiers shorter than this are junk tag values, not device serials.
const MIN_IDENTIFIER_LEN: usize = 6;

#[derive(Clone)]
pub struct DiscoveryService {
    store: Arc<dyn TelemetryStore>,
    queries: FluxQueryBuilder,
}

impl DiscoveryService {
    pub fn new(store: Arc<dyn TelemetryStore>, queries: FluxQueryBuilder) -> Self {
        Self { store, queries }
    }

    pub async fn device_ids(&self) -> TelemetryResult<Vec<String>> {
        let batch = self.store.run_query(&self.queries.device_ids()).await?;
        let mut ids = clean_values(&batch.rows);
        if ids.is_empty() {
            tracing::debug!("primary identifier discovery empty, trying fallback");
            let fallback = self.store.run_query(&self.queries.device_ids_fallback()).await?;
            ids = clean_values(&fallback.rows);
        }
        ids.retain(|id| id.len() >= MIN_IDENTIFIER_LEN);
        Ok(ids)
    }

    pub async fn fields(&self, device_id: &str) -> TelemetryResult<Vec<String>> {
        let batch = self.store.run_query(&self.queries.fields(device_id)).await?;
        let mut fields = clean_values(&batch.rows);
        if fields.is_empty() {
            tracing::debug!(device_id, "primary field discovery empty, trying fallback");
            let fallback = self
                .store
                .run_query(&self.queries.fields_fallback(device_id))
                .await?;
            fields = clean_values(&fallback.rows);
        }
        Ok(fields)
    }

    /// Fuel channels via the dedicated pattern query, falling back to the
    /// general field discovery filtered by the channel naming pattern.
    pub async fn fuel_channels(&self, device_id: &str) -> TelemetryResult<Vec<String>> {
        let batch = self.store.run_query(&self.queries.fuel_channels(device_id)).await?;
        let channels = clean_values(&batch.rows);
        if !channels.is_empty() {
            return Ok(channels);
        }

        tracing::debug!(device_id, "channel discovery empty, deriving from field list");
        let fields = self.fields(device_id).await?;
        Ok(fields
            .into_iter()
            .filter(|f| fuel_channel_suffix(f).is_some())
            .collect())
    }
}

/// Trim, drop empties, dedup and sort lexicographically.
fn clean_values(rows: &[SampleRow]) -> Vec<String> {
    rows.iter()
        .map(|row| row.value.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::store::mock::MockStore;

    fn value_row(value: &str) -> SampleRow {
        SampleRow::new(None, "", value)
    }

    fn service(store: Arc<MockStore>) -> DiscoveryService {
        let queries = FluxQueryBuilder::new("telemetry".to_string(), "vehicle_data".to_string());
        DiscoveryService::new(store, queries)
    }

    #[tokio::test]
    async fn identifiers_are_trimmed_deduped_and_sorted() {
        let store = Arc::new(MockStore::new());
        store.push_rows(vec![
            value_row(" veh-zulu "),
            value_row("veh-alpha"),
            value_row("veh-alpha"),
            value_row(""),
            value_row("short"),
        ]);

        let ids = service(store).device_ids().await.unwrap();
        assert_eq!(ids, vec!["veh-alpha", "veh-zulu"]);
    }

    #[tokio::test]
    async fn empty_primary_triggers_fallback_query() {
        let store = Arc::new(MockStore::new());
        store.push_rows(vec![]);
        store.push_rows(vec![value_row("veh-001234")]);

        let ids = service(store.clone()).device_ids().await.unwrap();
        assert_eq!(ids, vec!["veh-001234"]);

        let queries = store.queries_run();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].contains("schema.tagValues"));
    }

    #[tokio::test]
    async fn empty_both_strategies_returns_empty_not_error() {
        let store = Arc::new(MockStore::new());
        store.push_rows(vec![]);
        store.push_rows(vec![]);

        let fields = service(store).fields("veh-001234").await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn fuel_channels_fall_back_to_field_list_filtered_by_pattern() {
        let store = Arc::new(MockStore::new());
        // Dedicated channel query: nothing.
        store.push_rows(vec![]);
        // General field discovery: mixed fields.
        store.push_rows(vec![
            value_row("speed"),
            value_row("fuel_level_1"),
            value_row("fuel_level_9"),
            value_row("fuel_level_3"),
        ]);

        let channels = service(store.clone()).fuel_channels("veh-001234").await.unwrap();
        assert_eq!(channels, vec!["fuel_level_1", "fuel_level_3"]);
        assert_eq!(store.queries_run().len(), 2);
    }
}
