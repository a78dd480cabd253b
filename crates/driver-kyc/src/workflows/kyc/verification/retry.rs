use std::future::Future;
use std::time::Duration;

use crate::config::KycConfig;

use super::AdapterError;

/// Timeout and backoff schedule for verification calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Delay before each retry; its length is the number of retries after the first call.
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &KycConfig) -> Self {
        Self {
            timeout: config.verification_timeout,
            backoff: config.verification_backoff.clone(),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.backoff.len() + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&KycConfig::default())
    }
}

/// Call `f` until it succeeds, bounding each call by the policy timeout and sleeping
/// through the backoff schedule between failures. Returns the last error once the
/// schedule is exhausted.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, AdapterError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, f(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(policy.timeout)),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay) = policy.backoff.get(attempt).copied() else {
            return Err(err);
        };
        attempt += 1;
        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts(),
            "verification call failed, retrying in {delay:?}: {err}"
        );
        tokio::time::sleep(delay).await;
    }
}
