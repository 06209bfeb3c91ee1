//! Seams to the embedding service and the search index, with retry of transient failures.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use super::record::EmbeddingRecord;
use crate::config::EmbeddingConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Transient: the call may succeed if retried.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("service call failed: {0}")]
    Failed(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

/// Turns texts into vectors, one per text, in order.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>, ServiceError>> + Send;
}

/// Search index the records are uploaded to.
pub trait DocumentStore: Send + Sync {
    fn add_documents(
        &self,
        index: &str,
        records: &[EmbeddingRecord],
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Exchange the contents of two indexes.
    fn swap_indexes(&self, first: &str, second: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn delete_index(&self, index: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Run `call` until it succeeds, fails hard, or runs out of attempts.
    /// The wait before attempt `n + 1` is `delay * n`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        "service unavailable, retrying"
                    );
                    tokio::time::sleep(self.delay * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_until_available() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy(5)
            .run("embed", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ServiceError::Unavailable("busy".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy(2)
            .run("embed", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Unavailable("down".to_string()))
            })
            .await;
        assert_eq!(result, Err(ServiceError::Unavailable("down".to_string())));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy(5)
            .run("embed", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Failed("bad request".to_string()))
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Failed(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let config = EmbeddingConfig {
            max_attempts: 0,
            retry_delay_ms: 250,
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
