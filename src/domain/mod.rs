// Domain layer - Core telemetry models and error taxonomy
pub mod error;
pub mod sample;
pub mod telemetry;
