//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

/// Retry parameters. The defaults match the GitHub client's policy:
/// 3 attempts, 1 s initial backoff, doubling, capped at 30 s.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Calls `op` up to `max_attempts` times, sleeping with exponential backoff
/// and jitter between attempts. The operation is a black box: any error
/// triggers a retry. Returns the last error if all attempts fail.
pub async fn retry<T, E, F, Fut>(cfg: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = cfg.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                let backoff = (cfg.initial_backoff.as_secs_f64()
                    * cfg.multiplier.powi(attempt as i32 - 1))
                .min(cfg.max_backoff.as_secs_f64());
                // Jitter: 50-100% of the computed backoff.
                let jittered = backoff * (0.5 + rand::random::<f64>() * 0.5);
                tokio::time::sleep(Duration::from_secs_f64(jittered)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn succeeds_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), &str> = retry(&fast(), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), &str> = retry(&fast(), move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let cfg = RetryConfig {
            max_attempts: 4,
            ..fast()
        };
        let result: Result<(), &str> = retry(&cfg, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("persistent")
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "persistent");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn single_attempt_never_sleeps() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let cfg = RetryConfig {
            max_attempts: 1,
            // A sleep here would hang the test for an hour.
            initial_backoff: Duration::from_secs(3600),
            ..Default::default()
        };
        let result: Result<(), &str> = retry(&cfg, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("fail")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_one_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let cfg = RetryConfig {
            max_attempts: 2,
            ..fast()
        };
        let result: Result<u32, &str> = retry(&cfg, move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first fail")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
