//! Resilience primitives for the MCP method runtime.
//!
//! Each method owns a circuit breaker, a bounded permit pool, a per-request
//! timeout and a retry loop for transient failures, composed in that order:
//! breaker check → permit acquire → timeout(run) → retry → breaker record.

use crate::config::McpConfig;
use crate::errors::{ApidexError, Result};
use rand::Rng;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// CLOSED → (failures ≥ threshold) → OPEN → (recovery timeout) → HALF_OPEN →
/// (successes ≥ threshold) → CLOSED. OPEN short-circuits without touching
/// the pool.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Gate a call. In OPEN state fails fast with a retry-after hint, moving
    /// to HALF_OPEN once the recovery timeout has elapsed.
    pub fn check(&self, method: &str) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                    debug!(method, "Circuit breaker half-open, probing");
                    Ok(())
                } else {
                    let retry_after = self.recovery_timeout.saturating_sub(elapsed);
                    Err(ApidexError::CircuitOpen {
                        method: method.to_string(),
                        retry_after_ms: retry_after.as_millis() as u64,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                }
            }
            BreakerState::Closed => {}
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, method: &str) {
        let mut inner = self.lock();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;
        let should_open = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(method, failures = inner.consecutive_failures, "Circuit breaker opened");
        }
    }
}

/// Per-method resilience wrapper
pub struct MethodResilience {
    method: String,
    breaker: CircuitBreaker,
    permits: Semaphore,
    acquire_timeout: Duration,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl MethodResilience {
    pub fn new(method: &str, config: &McpConfig) -> Self {
        Self {
            method: method.to_string(),
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_success_threshold,
                Duration::from_millis(config.breaker_recovery_timeout_ms),
            ),
            permits: Semaphore::new(config.max_concurrent_requests),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            request_timeout: config.timeout_for(method),
            retry_attempts: config.retry_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Run `operation` under the full resilience pipeline. The factory is
    /// invoked once per attempt; only transient error classes retry.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.breaker.check(&self.method)?;

        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.acquire())
            .await
            .map_err(|_| ApidexError::ResourceExhausted {
                resource: format!("{} request pool", self.method),
            })?
            .map_err(|_| ApidexError::internal("request pool closed"))?;

        let mut attempt: u32 = 0;
        let result = loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.request_timeout, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ApidexError::timeout(
                    self.method.clone(),
                    self.request_timeout.as_millis() as u64,
                )),
            };

            match outcome {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() && attempt <= self.retry_attempts => {
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        method = %self.method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        drop(permit);

        match &result {
            Ok(_) => self.breaker.record_success(),
            // Client-input and not-found outcomes are not breaker signals
            Err(e) if breaker_counts(e) => self.breaker.record_failure(&self.method),
            Err(_) => self.breaker.record_success(),
        }

        result
    }

    /// Exponential backoff with jitter, capped at two seconds
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(1u64 << (attempt.min(6) - 1));
        let jitter = rand::thread_rng().gen_range(0..=exponential / 2 + 1);
        Duration::from_millis((exponential + jitter).min(2000))
    }
}

/// Infrastructure failures trip the breaker; client mistakes do not
fn breaker_counts(error: &ApidexError) -> bool {
    matches!(
        error,
        ApidexError::Database { .. }
            | ApidexError::DatabaseConnection { .. }
            | ApidexError::Transient { .. }
            | ApidexError::Timeout { .. }
            | ApidexError::Internal { .. }
            | ApidexError::Repository { .. }
            | ApidexError::DataIntegrity { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> McpConfig {
        McpConfig {
            breaker_failure_threshold: 3,
            breaker_success_threshold: 2,
            breaker_recovery_timeout_ms: 100,
            retry_attempts: 2,
            retry_base_delay_ms: 1,
            default_timeout_ms: 200,
            acquire_timeout_ms: 50,
            max_concurrent_requests: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success_path() {
        let resilience = MethodResilience::new("searchEndpoints", &config());
        let result = resilience.execute(|| async { Ok::<_, ApidexError>(42) }).await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(resilience.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_transient_errors_retry() {
        let resilience = MethodResilience::new("getSchema", &config());
        let calls = AtomicU32::new(0);
        let result = resilience
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApidexError::transient("hiccup"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_errors_do_not_retry_or_trip() {
        let resilience = MethodResilience::new("getExample", &config());
        let calls = AtomicU32::new(0);
        for _ in 0..10 {
            let err = resilience
                .execute(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ApidexError::validation("bad input")) }
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ApidexError::Validation { .. }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10, "no retries for validation errors");
        assert_eq!(resilience.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_recovers() {
        let resilience = MethodResilience::new("getSchema", &config());

        // Internal errors are not retryable; each execute records one failure
        for _ in 0..3 {
            let _ = resilience
                .execute(|| async { Err::<(), _>(ApidexError::internal("down")) })
                .await;
        }
        assert_eq!(resilience.breaker_state(), BreakerState::Open);

        // Open short-circuits with a retry-after hint
        let err = resilience.execute(|| async { Ok::<_, ApidexError>(1) }).await.unwrap_err();
        match err {
            ApidexError::CircuitOpen { retry_after_ms, .. } => assert!(retry_after_ms <= 100),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }

        // After the recovery timeout, half-open probes succeed and close it
        tokio::time::sleep(Duration::from_millis(120)).await;
        resilience.execute(|| async { Ok::<_, ApidexError>(1) }).await.unwrap();
        assert_eq!(resilience.breaker_state(), BreakerState::HalfOpen);
        resilience.execute(|| async { Ok::<_, ApidexError>(1) }).await.unwrap();
        assert_eq!(resilience.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let resilience = MethodResilience::new("getSchema", &config());
        for _ in 0..3 {
            let _ = resilience
                .execute(|| async { Err::<(), _>(ApidexError::internal("down")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        let _ = resilience
            .execute(|| async { Err::<(), _>(ApidexError::internal("still down")) })
            .await;
        assert_eq!(resilience.breaker_state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let resilience = MethodResilience::new("slow", &config());
        let err = resilience
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ApidexError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApidexError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_pool_exhaustion() {
        let resilience = std::sync::Arc::new(MethodResilience::new("searchEndpoints", &config()));

        // Saturate both permits with slow calls
        let mut holders = Vec::new();
        for _ in 0..2 {
            let r = std::sync::Arc::clone(&resilience);
            holders.push(tokio::spawn(async move {
                let _ = r
                    .execute(|| async {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        Ok::<_, ApidexError>(())
                    })
                    .await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = resilience.execute(|| async { Ok::<_, ApidexError>(()) }).await.unwrap_err();
        assert!(matches!(err, ApidexError::ResourceExhausted { .. }));

        for holder in holders {
            holder.await.unwrap();
        }
    }
}
