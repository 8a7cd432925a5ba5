// Application layer - Use cases and the store trait seam
pub mod discovery;
pub mod store;
pub mod telemetry_service;
pub mod transform;
