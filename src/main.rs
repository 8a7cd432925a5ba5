// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::application::discovery::DiscoveryService;
use crate::application::store::TelemetryStore;
use crate::application::telemetry_service::TelemetryService;
use crate::infrastructure::config::load_store_config;
use crate::infrastructure::flux::FluxQueryBuilder;
use crate::infrastructure::health::ConnectionHealth;
use crate::infrastructure::influx_client::InfluxStoreClient;
use crate::infrastructure::retry::RetryPolicy;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    check_availability, get_telemetry, health_check, list_devices, list_fields,
    list_fuel_channels, recommended_range,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = load_store_config()?;

    // Create the store client (infrastructure layer)
    let health = Arc::new(ConnectionHealth::new());
    let queries = FluxQueryBuilder::new(
        config.influx.bucket.clone(),
        config.influx.measurement.clone(),
    );
    let store: Arc<dyn TelemetryStore> = Arc::new(InfluxStoreClient::new(
        &config.influx,
        queries.clone(),
        health,
        RetryPolicy::default(),
    )?);

    // Create services (application layer)
    let discovery = DiscoveryService::new(store.clone(), queries.clone());
    let telemetry_service = TelemetryService::new(store.clone(), discovery, queries);

    // Create application state
    let state = Arc::new(AppState {
        telemetry_service,
        store,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/devices", get(list_devices))
        .route("/devices/:id/fields", get(list_fields))
        .route("/devices/:id/fuel-channels", get(list_fuel_channels))
        .route("/devices/:id/availability", get(check_availability))
        .route("/devices/:id/recommended-range", get(recommended_range))
        .route("/devices/:id/telemetry", get(get_telemetry))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    tracing::info!("starting fleet-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
