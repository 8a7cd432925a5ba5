// Process-wide connection health cell.
//
// Advisory only: every query attempt records its outcome here, last writer
// wins, and nothing gates correctness on it. The staleness decision is a pure
// function so the lazy re-probe logic stays testable.
use crate::domain::telemetry::ConnectionStatus;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, PoisonError};

pub const STALE_AFTER_SECONDS: i64 = 120;

#[derive(Debug, Default)]
pub struct ConnectionHealth {
    inner: Mutex<State>,
}

#[derive(Debug, Default, Clone, Copy)]
struct State {
    connected: bool,
    last_tested_at: Option<DateTime<Utc>>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, connected: bool) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.connected = connected;
        state.last_tested_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> ConnectionStatus {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ConnectionStatus {
            connected: state.connected,
            last_tested_at: state.last_tested_at,
        }
    }

    pub fn needs_probe(&self, now: DateTime<Utc>) -> bool {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        is_stale(now, state.last_tested_at, STALE_AFTER_SECONDS)
    }
}

/// A status is stale when it was never tested or the last test is older than
/// the threshold.
pub fn is_stale(now: DateTime<Utc>, last_tested_at: Option<DateTime<Utc>>, threshold_seconds: i64) -> bool {
    match last_tested_at {
        None => true,
        Some(tested) => now - tested > Duration::seconds(threshold_seconds),
    }
}
