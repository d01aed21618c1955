// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Retry policy for transient failures: socket errors, KV write contention
//! and upstream timeouts are retried with exponential backoff, everything
//! else surfaces to the caller on the first attempt.

use modulr_logger::prelude::*;
use std::{fmt::Debug, future::Future, time::Duration};

/// Exponential backoff, capped at `max_attempts` total tries.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    factor: u32,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, factor: u32, max_attempts: u32) -> Self {
        Self {
            base_delay,
            factor,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * self.factor.saturating_pow(attempt)
    }
}

impl Default for ExponentialBackoff {
    /// Cap of 4 attempts with a 1 s base cool-down.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2, 4)
    }
}

/// Drives `operation` until it succeeds or the policy is exhausted, sleeping
/// between attempts. The last error is returned unchanged.
pub async fn retry_async<F, Fut, T, E>(policy: ExponentialBackoff, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts() {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = ?error,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, &str> = retry_async(ExponentialBackoff::default(), move || {
            let calls = calls2.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_capped() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, &str> = retry_async(ExponentialBackoff::default(), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down for good")
            }
        })
        .await;
        assert_eq!(result, Err("down for good"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
