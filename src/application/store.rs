// Store trait seam for telemetry data access
use crate::domain::error::TelemetryResult;
use crate::domain::sample::RowBatch;
use crate::domain::telemetry::ConnectionStatus;
use async_trait::async_trait;

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Execute a declarative query with retry and return the materialized
    /// row batch.
    async fn run_query(&self, flux: &str) -> TelemetryResult<RowBatch>;

    /// Minimal single-row probe; records health and never raises.
    async fn ping(&self) -> bool;

    /// Current advisory connection status, re-probed if stale.
    async fn connection_status(&self) -> ConnectionStatus;
}
