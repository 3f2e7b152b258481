//! A lazy, single-use sequence of backoff delays.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Parameters governing a [`BackoffSequence`].
///
/// The un-randomized delay for the `n`-th step (0-indexed) is
/// `min(multiplier * base.powi(n), threshold)`. When `randomize` is set,
/// each computed delay is multiplied by a further factor uniform in
/// `[0.85, 1.15)` to avoid synchronized retries across many callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSpec {
    /// Exponential base (e.g. `2.0` doubles the delay each step).
    pub base: f64,
    /// Multiplier applied to `base.powi(n)`; also the first delay (n=0).
    pub multiplier: f64,
    /// Upper bound every computed delay is capped at.
    pub threshold: Duration,
    /// Maximum number of retries permitted. The sequence yields
    /// `max_retries + 1` delays (one per retry attempt, the last of which
    /// is the delay preceding the final permitted retry).
    pub max_retries: usize,
    /// Optional wall-clock budget for the whole sequence, measured from
    /// construction. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Whether to randomize each computed delay.
    pub randomize: bool,
}

impl Default for BackoffSpec {
    /// Matches this agent's default retry profile: exponential backoff
    /// starting at 200ms, doubling, for up to 10 retries, uncapped and
    /// unbounded by wall clock.
    fn default() -> Self {
        Self {
            base: 2.0,
            multiplier: 0.2,
            threshold: Duration::from_secs(u64::MAX / 2),
            max_retries: 10,
            timeout: None,
            randomize: false,
        }
    }
}

impl BackoffSpec {
    /// Creates a spec with the given base and multiplier; everything else
    /// takes the default value.
    pub fn new(base: f64, multiplier: f64) -> Self {
        Self {
            base,
            multiplier,
            ..Self::default()
        }
    }

    /// Sets the retry threshold (cap on a single delay).
    pub fn threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the overall wall-clock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables delay randomization.
    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    fn raw_delay(&self, attempt: usize) -> Duration {
        let secs = (self.multiplier * self.base.powi(attempt as i32))
            .min(self.threshold.as_secs_f64())
            .max(0.0);
        Duration::from_secs_f64(secs)
    }
}

/// Errors produced by [`BackoffSequence`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BackoffError {
    /// The sequence was advanced past the point where `has_next()` would
    /// have returned `false`. This is a programmer error: callers must
    /// check `has_next()` (or rely on `try_next` returning this variant)
    /// before computing a further delay.
    #[error("backoff sequence is exhausted (max_retries or timeout reached)")]
    Exhausted,
}

/// A lazy, forward-only producer of backoff delays.
///
/// Construction captures the start time. Each call to [`BackoffSequence::try_next`]
/// returns the current delay and advances the internal attempt counter.
/// [`BackoffSequence::has_next`] reports whether another step is permitted
/// under both `max_retries` and `timeout`; the timeout check is applied
/// *after* the prospective delay — "would we still be inside the timeout
/// if we slept this long and then tried again".
pub struct BackoffSequence {
    spec: BackoffSpec,
    start: Instant,
    attempt: usize,
}

impl BackoffSequence {
    /// Creates a new sequence from `spec`, capturing the start time now.
    pub fn new(spec: BackoffSpec) -> Self {
        Self {
            spec,
            start: Instant::now(),
            attempt: 0,
        }
    }

    /// The attempt count so far (i.e. how many delays have been produced).
    pub fn attempts(&self) -> usize {
        self.attempt
    }

    /// Wall-clock time elapsed since this sequence was constructed.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whether another step is permitted.
    pub fn has_next(&self) -> bool {
        if self.attempt > self.spec.max_retries {
            return false;
        }
        if let Some(timeout) = self.spec.timeout {
            let prospective = self.spec.raw_delay(self.attempt);
            if self.start.elapsed() + prospective > timeout {
                return false;
            }
        }
        true
    }

    /// Returns the next delay and advances the sequence, or
    /// [`BackoffError::Exhausted`] if [`Self::has_next`] was false.
    pub fn try_next(&mut self) -> Result<Duration, BackoffError> {
        if !self.has_next() {
            return Err(BackoffError::Exhausted);
        }
        let raw = self.spec.raw_delay(self.attempt);
        self.attempt += 1;
        Ok(if self.spec.randomize {
            randomize(raw)
        } else {
            raw
        })
    }
}

fn randomize(duration: Duration) -> Duration {
    use rand::Rng;
    let u: f64 = rand::rng().random_range(0.0..1.0);
    let factor = 0.85 + 0.3 * u;
    duration.mul_f64(factor)
}
