//! Retry primitive: re-invoke a callable on qualifying failures, spaced by
//! a [`BackoffSequence`], blocking or cooperative.

use crate::events::RetryEvent;
use crate::sequence::{BackoffSequence, BackoffSpec};
use hermes_core::events::{EventListeners, FnListener};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// A configured retryer: a [`BackoffSpec`] plus a name used in events.
///
/// Cloning is cheap (the predicate and listeners are reference-counted).
/// Builder methods consume `self` and return a new, independently
/// configured `Retryer` — the original is never mutated, so a shared
/// default can be reused as the basis for per-call overrides.
#[derive(Clone)]
pub struct Retryer<E> {
    spec: BackoffSpec,
    name: String,
    predicate: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    listeners: EventListeners<RetryEvent>,
}

impl<E> Retryer<E> {
    /// Creates a retryer from a [`BackoffSpec`], retrying every error by
    /// default.
    pub fn new(spec: BackoffSpec) -> Self {
        Self {
            spec,
            name: "<unnamed>".to_string(),
            predicate: None,
            listeners: EventListeners::new(),
        }
    }

    /// Returns a new retryer with the given spec, keeping this one's name,
    /// predicate, and listeners.
    pub fn with_spec(&self, spec: BackoffSpec) -> Self {
        Self {
            spec,
            ..self.clone()
        }
    }

    /// Returns a new retryer with the given name (used in emitted events).
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Returns a new retryer that only retries errors accepted by
    /// `predicate`; errors it rejects are surfaced immediately.
    pub fn with_retry_on<F>(&self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
            ..self.clone()
        }
    }

    /// Returns a new retryer with an additional event listener attached.
    pub fn with_listener<F>(&self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.clone();
        listeners.add(FnListener::new(f));
        Self {
            listeners,
            ..self.clone()
        }
    }

    fn should_retry(&self, err: &E) -> bool {
        match &self.predicate {
            Some(p) => p(err),
            None => true,
        }
    }
}

/// Outcome returned by a single call attempt.
type AttemptResult<T, E> = Result<T, E>;

/// Blocking retry: invokes `f` synchronously, sleeping with
/// [`std::thread::sleep`] between attempts.
///
/// Returns the result on success; returns the last error once the
/// predicate rejects it or the backoff sequence is exhausted.
pub fn call_blocking<T, E, F>(retryer: &Retryer<E>, mut f: F) -> AttemptResult<T, E>
where
    F: FnMut() -> AttemptResult<T, E>,
{
    let mut seq = BackoffSequence::new(retryer.spec);
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        match f() {
            Ok(value) => {
                emit_success(retryer, attempt);
                return Ok(value);
            }
            Err(err) => {
                if !retryer.should_retry(&err) {
                    emit_ignored(retryer);
                    return Err(err);
                }
                match seq.try_next() {
                    Ok(delay) => {
                        emit_retry(retryer, attempt, delay);
                        std::thread::sleep(delay);
                    }
                    Err(_) => {
                        emit_exhausted(retryer, attempt);
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Cooperative retry: invokes `f` (producing a future each attempt),
/// sleeping with [`tokio::time::sleep`] between attempts. Because the
/// sleep is a suspension point, other tasks make progress while this one
/// waits.
pub async fn call_async<T, E, F, Fut>(retryer: &Retryer<E>, mut f: F) -> AttemptResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AttemptResult<T, E>>,
{
    let mut seq = BackoffSequence::new(retryer.spec);
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                emit_success(retryer, attempt);
                return Ok(value);
            }
            Err(err) => {
                if !retryer.should_retry(&err) {
                    emit_ignored(retryer);
                    return Err(err);
                }
                match seq.try_next() {
                    Ok(delay) => {
                        emit_retry(retryer, attempt, delay);
                        tokio::time::sleep(delay).await;
                    }
                    Err(_) => {
                        emit_exhausted(retryer, attempt);
                        return Err(err);
                    }
                }
            }
        }
    }
}

fn emit_success<E>(retryer: &Retryer<E>, attempts: usize) {
    #[cfg(feature = "metrics")]
    counter!("hermes_retry_calls_total", "retry" => retryer.name.clone(), "result" => "success")
        .increment(1);
    #[cfg(feature = "tracing")]
    if attempts > 1 {
        debug!(retry = %retryer.name, attempts, "retry succeeded");
    }
    retryer.listeners.emit(&RetryEvent::Success {
        name: retryer.name.clone(),
        timestamp: Instant::now(),
        attempts,
    });
}

fn emit_retry<E>(retryer: &Retryer<E>, attempt: usize, delay: std::time::Duration) {
    #[cfg(feature = "metrics")]
    counter!("hermes_retry_attempts_total", "retry" => retryer.name.clone()).increment(1);
    #[cfg(feature = "tracing")]
    debug!(retry = %retryer.name, attempt, delay_ms = delay.as_millis(), "retrying after delay");
    retryer.listeners.emit(&RetryEvent::Retry {
        name: retryer.name.clone(),
        timestamp: Instant::now(),
        attempt,
        delay,
    });
}

fn emit_exhausted<E>(retryer: &Retryer<E>, attempts: usize) {
    #[cfg(feature = "metrics")]
    counter!("hermes_retry_calls_total", "retry" => retryer.name.clone(), "result" => "exhausted")
        .increment(1);
    #[cfg(feature = "tracing")]
    warn!(retry = %retryer.name, attempts, "retry attempts exhausted");
    retryer.listeners.emit(&RetryEvent::Exhausted {
        name: retryer.name.clone(),
        timestamp: Instant::now(),
        attempts,
    });
}

fn emit_ignored<E>(retryer: &Retryer<E>) {
    #[cfg(feature = "tracing")]
    debug!(retry = %retryer.name, "error not retryable, failing immediately");
    retryer.listeners.emit(&RetryEvent::IgnoredError {
        name: retryer.name.clone(),
        timestamp: Instant::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_spec() -> BackoffSpec {
        BackoffSpec::new(1.0, 0.0).max_retries(5)
    }

    #[test]
    fn blocking_retry_succeeds_eventually() {
        let retryer = Retryer::<&'static str>::new(fast_spec());
        let calls = AtomicUsize::new(0);
        let result = call_blocking(&retryer, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("temporary")
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn blocking_retry_surfaces_last_error_on_exhaustion() {
        let retryer = Retryer::<&'static str>::new(BackoffSpec::new(1.0, 0.0).max_retries(2));
        let calls = AtomicUsize::new(0);
        let result: AttemptResult<(), _> = call_blocking(&retryer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("permanent")
        });
        assert_eq!(result, Err("permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[test]
    fn predicate_rejects_without_retrying() {
        let retryer = Retryer::<&'static str>::new(fast_spec()).with_retry_on(|_| false);
        let calls = AtomicUsize::new(0);
        let result: AttemptResult<(), _> = call_blocking(&retryer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("non-retryable")
        });
        assert_eq!(result, Err("non-retryable"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_spec_does_not_mutate_the_original() {
        let base = Retryer::<&'static str>::new(BackoffSpec::default());
        let overridden = base.with_spec(BackoffSpec::new(1.0, 0.0).max_retries(1));
        assert_eq!(base.spec.max_retries, 10);
        assert_eq!(overridden.spec.max_retries, 1);
    }

    #[tokio::test]
    async fn async_retry_succeeds_eventually() {
        let retryer = Retryer::<&'static str>::new(fast_spec());
        let calls = AtomicUsize::new(0);
        let result = call_async(&retryer, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("temporary")
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn async_retry_respects_timeout() {
        let spec = BackoffSpec::new(2.0, 10.0)
            .max_retries(50)
            .timeout(Duration::from_millis(1));
        let retryer = Retryer::<&'static str>::new(spec);
        let calls = AtomicUsize::new(0);
        let result: AttemptResult<(), _> = call_async(&retryer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err("still failing") }
        })
        .await;
        assert_eq!(result, Err("still failing"));
        // first delay (10s) already blows the 1ms timeout budget.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
