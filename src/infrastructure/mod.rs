// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod flux;
pub mod health;
pub mod influx_client;
pub mod retry;
