//! Bounded waiting on remote state transitions
//!
//! EC2 state changes (instance stopping, volume attach/detach) converge
//! asynchronously. This module provides a generic poll loop with exponential
//! backoff and a hard timeout; exceeding the bound is an error, never a
//! silent continue.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{debug, warn};

use crate::defaults::{DEFAULT_POLL_INITIAL_DELAY, DEFAULT_POLL_MAX_DELAY, DEFAULT_WAIT_TIMEOUT};

/// Configuration for a bounded poll loop.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Delay before the first re-check
    pub initial_delay: Duration,
    /// Cap for the exponentially growing delay
    pub max_delay: Duration,
    /// Hard bound on the total wait
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_POLL_INITIAL_DELAY,
            max_delay: DEFAULT_POLL_MAX_DELAY,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl WaitConfig {
    /// Default poll cadence with a caller-chosen timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Poll `check` until it reports ready, a bounded amount of time.
///
/// `check` returns `Ok(true)` when the resource reached the target state,
/// `Ok(false)` to poll again after a backoff delay, or `Err` to abort the
/// wait immediately (unexpected states, failed describe calls).
///
/// Returns an error naming `resource_name` if `config.timeout` elapses
/// first.
pub async fn wait_for_resource<F, Fut>(
    config: WaitConfig,
    check: F,
    resource_name: &str,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = std::time::Instant::now();
    let mut attempts = 0u32;

    let backoff = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .build();

    let mut delays = backoff.into_iter();

    loop {
        attempts += 1;

        if start.elapsed() >= config.timeout {
            anyhow::bail!(
                "Timeout waiting for {} after {:?} ({} attempts)",
                resource_name,
                config.timeout,
                attempts
            );
        }

        match check().await {
            Ok(true) => {
                debug!(resource = %resource_name, attempts, "Resource ready");
                return Ok(());
            }
            Ok(false) => {
                let delay = delays.next().unwrap_or(config.max_delay);
                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Resource not ready, polling again"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(resource = %resource_name, error = ?e, "Resource check failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> WaitConfig {
        WaitConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_ready_after_several_polls() {
        let polls = Arc::new(AtomicU32::new(0));

        let result = wait_for_resource(
            fast_config(),
            || {
                let polls = polls.clone();
                async move {
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    Ok(n >= 2)
                }
            },
            "test-resource",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_resource_name() {
        let result = wait_for_resource(
            WaitConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                timeout: Duration::from_millis(20),
            },
            || async { Ok(false) },
            "never-ready",
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("Timeout waiting for never-ready"), "{err}");
    }

    #[tokio::test]
    async fn test_check_error_aborts_immediately() {
        let polls = Arc::new(AtomicU32::new(0));

        let result = wait_for_resource(
            fast_config(),
            || {
                let polls = polls.clone();
                async move {
                    polls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("describe failed")
                }
            },
            "broken-resource",
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("describe failed"));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_timeout_keeps_default_cadence() {
        let config = WaitConfig::with_timeout(Duration::from_secs(42));
        assert_eq!(config.timeout, Duration::from_secs(42));
        assert_eq!(config.initial_delay, DEFAULT_POLL_INITIAL_DELAY);
        assert_eq!(config.max_delay, DEFAULT_POLL_MAX_DELAY);
    }
}
