//! Retry combinators for document store operations.
//!
//! A [`RetryPolicy`] re-runs an operation when it fails with a transient
//! [`StoreError`] (connection failure or write conflict), sleeping
//! `cooldown * attempt` between attempts (linear backoff). Once the attempt
//! counter exceeds `max_retries` the last error is returned. A negative
//! `max_retries` retries forever. Fatal errors are returned immediately.
//!
//! Two shapes are supported:
//!
//! - [`RetryPolicy::run`] for operations producing one result;
//! - [`RetryPolicy::stream`] for lazily produced sequences. A transient
//!   failure anywhere in the sequence re-opens it from the beginning, so
//!   consumers see already-delivered elements again.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};

use asset_catalog_core::error::{StoreError, StoreResult};

use crate::config::RetrySettings;

pub const DEFAULT_MAX_RETRIES: i64 = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: i64,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.cooldown())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: i64, cooldown: Duration) -> Self {
        Self {
            max_retries,
            cooldown,
        }
    }

    /// Retry transient failures forever.
    pub fn unlimited(cooldown: Duration) -> Self {
        Self::new(-1, cooldown)
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn exhausted(&self, attempt: i64) -> bool {
        self.max_retries >= 0 && attempt > self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: i64) -> Duration {
        self.cooldown
            .saturating_mul(u32::try_from(attempt.max(0)).unwrap_or(u32::MAX))
    }

    /// Decide what to do after a failure. Returns the error back when it
    /// must be surfaced, after sleeping otherwise.
    async fn after_failure(&self, attempt: i64, err: StoreError) -> Option<StoreError> {
        if !err.is_transient() || self.exhausted(attempt) {
            return Some(err);
        }
        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.backoff(attempt)).await;
        }
        tracing::warn!(attempt, error = %err, "document store failure, retrying");
        None
    }

    /// Run `op` until it succeeds, fails fatally, or retries run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0i64;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if let Some(err) = self.after_failure(attempt, err).await {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Stream the sequence produced by `open`, re-opening it from the start
    /// after each transient failure.
    pub fn stream<'a, T, F>(&self, open: F) -> BoxStream<'a, StoreResult<T>>
    where
        T: Send + 'a,
        F: FnMut() -> BoxStream<'a, StoreResult<T>> + Send + 'a,
    {
        let state = StreamState {
            policy: *self,
            open,
            current: None,
            attempt: 0,
            finished: false,
        };

        stream::unfold(state, |mut st| async move {
            loop {
                if st.finished {
                    return None;
                }
                let open = &mut st.open;
                let current = st.current.get_or_insert_with(|| open());
                let next = current.next().await;
                match next {
                    Some(Ok(item)) => return Some((Ok(item), st)),
                    None => {
                        st.finished = true;
                        return None;
                    }
                    Some(Err(err)) => {
                        st.current = None;
                        st.attempt += 1;
                        if let Some(err) = st.policy.after_failure(st.attempt, err).await {
                            st.finished = true;
                            return Some((Err(err), st));
                        }
                    }
                }
            }
        })
        .boxed()
    }
}

struct StreamState<'a, T, F> {
    policy: RetryPolicy,
    open: F,
    current: Option<BoxStream<'a, StoreResult<T>>>,
    attempt: i64,
    finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn conn_err() -> StoreError {
        StoreError::Connection("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_succeeds_without_retry() {
        let policy = RetryPolicy::default();
        let value = policy.run(|| async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::default();
        let err = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StoreError::InvalidQuery("bad".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_surfaces_first_failure() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let err = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(conn_err()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_retries_keep_going() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::unlimited(Duration::from_millis(10));
        let counter = calls.clone();
        let value = policy
            .run(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 20 {
                        Err(conn_err())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 20);
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = RetrySettings {
            max_retries: -1,
            cooldown_secs: 3,
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy, RetryPolicy::unlimited(Duration::from_secs(3)));
    }
}
