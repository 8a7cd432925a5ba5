// Application state for HTTP handlers
use crate::application::store::TelemetryStore;
use crate::application::telemetry_service::TelemetryService;
use std::sync::Arc;

pub struct AppState {
    pub telemetry_service: TelemetryService,
    pub store: Arc<dyn TelemetryStore>,
}
