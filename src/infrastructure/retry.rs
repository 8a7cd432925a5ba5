// Retry combinator shared by every store query.
//
// Transient causes (timeout, unreachable) are retried on a linear-in-attempt
// backoff schedule; everything else surfaces immediately. Exhausting the
// schedule yields a terminal error carrying the total attempt count.
use crate::domain::error::TelemetryError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    Authentication,
    NotFound,
    Syntax,
    Unknown,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

/// A classified single-attempt failure, before retry accounting.
#[derive(Debug)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl QueryFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_error(self, attempts: u32) -> TelemetryError {
        match self.kind {
            FailureKind::Timeout => TelemetryError::Timeout { attempts },
            FailureKind::Connection => TelemetryError::ConnectionUnavailable {
                attempts,
                message: self.message,
            },
            FailureKind::Authentication => TelemetryError::AuthenticationFailed(self.message),
            FailureKind::NotFound => TelemetryError::ResourceNotFound(self.message),
            FailureKind::Syntax => TelemetryError::QuerySyntaxInvalid(self.message),
            FailureKind::Unknown => TelemetryError::Unknown(self.message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, TelemetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueryFailure>>,
{
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                if !failure.kind.is_retryable() || retries >= policy.max_retries {
                    return Err(failure.into_error(retries + 1));
                }
                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::warn!(
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    cause = %failure.message,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn immediate_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_schedule_is_linear_in_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn timeout_is_retried_three_times_then_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&immediate_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QueryFailure::new(FailureKind::Timeout, "deadline exceeded")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(TelemetryError::Timeout { attempts: 4 })));
    }

    #[tokio::test]
    async fn non_retryable_failure_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&immediate_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QueryFailure::new(FailureKind::Authentication, "401")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TelemetryError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn success_after_transient_failure_returns_value() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&immediate_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(QueryFailure::new(FailureKind::Connection, "refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap(), 42);
    }
}
