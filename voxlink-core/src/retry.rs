//! Retry policy for provisioning polls
//!
//! Session provisioning (token acquisition, conversation initialization,
//! job-status polling) happens over REST outside this crate; only the
//! interface and the retry schedule live here. Polling uses exponential
//! backoff and honors a cancellation flag so a disconnected session
//! cannot be resurrected by an in-flight retry loop.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::VoxlinkError;

/// Exponential backoff schedule for retried operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(1000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        self.initial_interval.mul_f64(factor)
    }
}

/// Shared flag used to cancel in-flight retry loops on disconnect
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create a new, uncancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel all loops holding this flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a session provisioning call
#[derive(Debug, Clone)]
pub struct ProvisionedSession {
    /// Access token for the transport handshake
    pub access_token: String,
    /// Identifier of the provisioned conversation/job
    pub session_id: String,
}

/// External collaborator that provisions sessions over REST
///
/// Implementations live outside this crate; tests use in-process fakes.
#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    /// Obtain an access token and conversation id for the given agent
    async fn provision(
        &self,
        agent_id: &str,
        params: serde_json::Value,
    ) -> Result<ProvisionedSession, VoxlinkError>;

    /// Check whether a provisioning job has completed
    async fn poll_job(&self, session_id: &str) -> Result<bool, VoxlinkError>;
}

/// Run an operation under a retry policy with exponential backoff
///
/// The cancellation flag is checked before every attempt; cancellation
/// yields [`VoxlinkError::Cancelled`] immediately. After the attempt
/// budget is exhausted the last error is surfaced as
/// [`VoxlinkError::RetryExhausted`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationFlag,
    operation: &str,
    mut op: F,
) -> Result<T, VoxlinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VoxlinkError>>,
{
    let mut last_error = String::new();
    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(VoxlinkError::Cancelled {
                operation: operation.to_string(),
            });
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!("{operation} attempt {} failed: {e}", attempt + 1);
                last_error = e.to_string();
            }
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
        }
    }
    warn!("{operation} exhausted retry budget: {last_error}");
    Err(VoxlinkError::RetryExhausted {
        operation: operation.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio_test::assert_ok;

    fn immediate_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::ZERO,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn backoff_schedule_is_multiplicative() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &immediate_policy(5),
            &CancellationFlag::new(),
            "job poll",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(VoxlinkError::Transport {
                            reason: "not ready".to_string(),
                        })
                    } else {
                        Ok(42u32)
                    }
                }
            },
        )
        .await;
        assert_eq!(assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_aggregates_the_last_error() {
        let result: Result<(), _> = retry_with_backoff(
            &immediate_policy(3),
            &CancellationFlag::new(),
            "job poll",
            || async {
                Err(VoxlinkError::Transport {
                    reason: "still pending".to_string(),
                })
            },
        )
        .await;
        match result {
            Err(VoxlinkError::RetryExhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("still pending"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result: Result<(), _> =
            retry_with_backoff(&immediate_policy(5), &cancel, "job poll", || async {
                panic!("operation must not run after cancellation")
            })
            .await;
        assert!(matches!(result, Err(VoxlinkError::Cancelled { .. })));
    }
}
