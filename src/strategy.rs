//! Backoff strategies producing the delay before each attempt.
//!
//! A strategy returns a fresh, lazily evaluated sequence on every call to
//! [`RetryStrategy::timeouts`], so one instance can be shared by any number of
//! concurrent requests and large attempt counts never allocate. The first
//! element is always `0.0`: the initial attempt is never delayed.

use std::{
    fmt, iter,
    sync::{Arc, Mutex},
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{Result, RetryError};

/// Delay sequence for one logical request, in seconds.
pub type Timeouts = Box<dyn Iterator<Item = f64> + Send>;

/// Produces the inter-attempt delays, in seconds, for one logical request.
pub trait RetryStrategy: fmt::Debug + Send + Sync {
    /// Delay before each attempt; `attempts + 1` entries unless the strategy
    /// defines its own length.
    fn timeouts(&self, attempts: u32) -> Timeouts;

    /// Smallest delay the strategy produces after the first attempt.
    fn min_timeout(&self) -> f64;

    /// Largest configured delay bound.
    fn max_timeout(&self) -> f64;
}

/// Doubles (by default) the delay after each failed attempt.
///
/// Element `i >= 1` is `min_timeout * multiplier^(i - 1)`, never below
/// `min_timeout`. Growth is not capped at `max_timeout`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialRetry {
    min_timeout: f64,
    max_timeout: f64,
    multiplier: f64,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self {
            min_timeout: 0.1,
            max_timeout: 30.0,
            multiplier: 2.0,
        }
    }
}

impl ExponentialRetry {
    /// Fails with [`RetryError::InvalidConfig`] on non-positive bounds,
    /// `max_timeout < min_timeout`, or a non-positive multiplier.
    pub fn new(min_timeout: f64, max_timeout: f64, multiplier: f64) -> Result<Self> {
        validate_bounds(min_timeout, max_timeout)?;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(RetryError::InvalidConfig(format!(
                "multiplier must be positive and finite, got {multiplier}"
            )));
        }
        Ok(Self {
            min_timeout,
            max_timeout,
            multiplier,
        })
    }

    /// Growth factor applied after each retry.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl RetryStrategy for ExponentialRetry {
    fn timeouts(&self, attempts: u32) -> Timeouts {
        let min_timeout = self.min_timeout;
        let multiplier = self.multiplier;
        let backoff = iter::successors(Some(min_timeout), move |delay| Some(delay * multiplier))
            .map(move |delay| delay.max(min_timeout))
            .take(attempts as usize);
        Box::new(iter::once(0.0).chain(backoff))
    }

    fn min_timeout(&self) -> f64 {
        self.min_timeout
    }

    fn max_timeout(&self) -> f64 {
        self.max_timeout
    }
}

type RandomSource = Box<dyn FnMut() -> f64 + Send>;

/// Draws every delay uniformly from `[min_timeout, max_timeout]`.
///
/// The random source yields values in `[0, 1)` and can be replaced for
/// reproducible schedules.
#[derive(Clone)]
pub struct RandomRetry {
    min_timeout: f64,
    max_timeout: f64,
    source: Arc<Mutex<RandomSource>>,
}

impl fmt::Debug for RandomRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomRetry")
            .field("min_timeout", &self.min_timeout)
            .field("max_timeout", &self.max_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for RandomRetry {
    fn default() -> Self {
        Self::from_parts(0.1, 3.0, Box::new(rand::random::<f64>))
    }
}

impl RandomRetry {
    /// Uses the thread-local RNG.
    pub fn new(min_timeout: f64, max_timeout: f64) -> Result<Self> {
        Self::with_source(min_timeout, max_timeout, rand::random::<f64>)
    }

    /// Uses a `StdRng` seeded with `seed`; equal seeds give equal schedules.
    pub fn seeded(min_timeout: f64, max_timeout: f64, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::with_source(min_timeout, max_timeout, move || rng.gen::<f64>())
    }

    /// Uses a caller-supplied source of values in `[0, 1)`.
    pub fn with_source<F>(min_timeout: f64, max_timeout: f64, source: F) -> Result<Self>
    where
        F: FnMut() -> f64 + Send + 'static,
    {
        validate_bounds(min_timeout, max_timeout)?;
        Ok(Self::from_parts(min_timeout, max_timeout, Box::new(source)))
    }

    fn from_parts(min_timeout: f64, max_timeout: f64, source: RandomSource) -> Self {
        Self {
            min_timeout,
            max_timeout,
            source: Arc::new(Mutex::new(source)),
        }
    }
}

impl RetryStrategy for RandomRetry {
    fn timeouts(&self, attempts: u32) -> Timeouts {
        let (min_timeout, max_timeout) = (self.min_timeout, self.max_timeout);
        let source = Arc::clone(&self.source);
        let draws = (0..attempts).map(move |_| {
            let mut source = source
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let sample = (*source)().clamp(0.0, 1.0);
            let delay = min_timeout + sample * (max_timeout - min_timeout);
            delay.clamp(min_timeout, max_timeout)
        });
        Box::new(iter::once(0.0).chain(draws))
    }

    fn min_timeout(&self) -> f64 {
        self.min_timeout
    }

    fn max_timeout(&self) -> f64 {
        self.max_timeout
    }
}

/// Replays an explicit list of delays; the attempt count is ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct ListRetry {
    timeouts: Vec<f64>,
}

impl ListRetry {
    /// Fails with [`RetryError::InvalidConfig`] if any delay is negative or
    /// non-finite. An empty list means a single attempt.
    pub fn new<I>(timeouts: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let timeouts: Vec<f64> = timeouts.into_iter().collect();
        if let Some(bad) = timeouts.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(RetryError::InvalidConfig(format!(
                "list delays must be finite and non-negative, got {bad}"
            )));
        }
        Ok(Self { timeouts })
    }
}

impl RetryStrategy for ListRetry {
    fn timeouts(&self, _attempts: u32) -> Timeouts {
        Box::new(iter::once(0.0).chain(self.timeouts.clone()))
    }

    fn min_timeout(&self) -> f64 {
        self.timeouts.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    fn max_timeout(&self) -> f64 {
        self.timeouts.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }
}

/// Waits the same delay before every retry.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedRetry {
    timeout: f64,
}

impl FixedRetry {
    /// Fails with [`RetryError::InvalidConfig`] unless `timeout` is positive.
    pub fn new(timeout: f64) -> Result<Self> {
        validate_bounds(timeout, timeout)?;
        Ok(Self { timeout })
    }
}

impl RetryStrategy for FixedRetry {
    fn timeouts(&self, attempts: u32) -> Timeouts {
        let delays = iter::repeat(self.timeout).take(attempts as usize);
        Box::new(iter::once(0.0).chain(delays))
    }

    fn min_timeout(&self) -> f64 {
        self.timeout
    }

    fn max_timeout(&self) -> f64 {
        self.timeout
    }
}

fn validate_bounds(min_timeout: f64, max_timeout: f64) -> Result<()> {
    for (name, value) in [("min_timeout", min_timeout), ("max_timeout", max_timeout)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(RetryError::InvalidConfig(format!(
                "{name} must be positive and finite, got {value}"
            )));
        }
    }
    if min_timeout > max_timeout {
        return Err(RetryError::InvalidConfig(format!(
            "min_timeout {min_timeout} exceeds max_timeout {max_timeout}"
        )));
    }
    Ok(())
}
