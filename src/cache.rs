//! Time-boxed, single-flight cache for the fetched dataset.
//!
//! Within the TTL every caller gets the same `Arc` without touching the
//! remote sheet. Only one fill runs at a time; callers that arrive while a
//! fill is in flight wait for it and share its outcome, including a failure.
//! Failures are never stored past that point, so the next call fetches again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::LoadError;
use crate::records::Dataset;

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: parking_lot::Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: parking_lot::Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

struct CachedValue<T> {
    value: Arc<T>,
    stored_at: Instant,
}

/// Last outcome of a fill, visible to callers that queued behind it.
struct Flight<E> {
    last_error: Option<E>,
}

pub struct TtlCache<T, E> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: parking_lot::Mutex<Option<CachedValue<T>>>,
    flight: tokio::sync::Mutex<Flight<E>>,
    completed_fills: AtomicU64,
}

/// The process-wide dataset cache.
pub type DatasetCache = TtlCache<Dataset, LoadError>;

impl<T, E: Clone> TtlCache<T, E> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: parking_lot::Mutex::new(None),
            flight: tokio::sync::Mutex::new(Flight { last_error: None }),
            completed_fills: AtomicU64::new(0),
        }
    }

    /// The cached value, if one exists and is still inside the window.
    pub fn get(&self) -> Option<Arc<T>> {
        let now = self.clock.now();
        self.slot
            .lock()
            .as_ref()
            .filter(|cached| now.saturating_duration_since(cached.stored_at) < self.ttl)
            .map(|cached| cached.value.clone())
    }

    /// How long ago the current value was stored (stale or not).
    pub fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.slot
            .lock()
            .as_ref()
            .map(|cached| now.saturating_duration_since(cached.stored_at))
    }

    /// Drop the cached value so the next call refills.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }

    /// Return the fresh value, or run `fill` (at most one at a time) to get one.
    pub async fn get_or_try_fill<F, Fut>(&self, fill: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let seen_fills = self.completed_fills.load(Ordering::Acquire);
        let mut flight = self.flight.lock().await;

        // Another caller filled while we were waiting.
        if let Some(value) = self.get() {
            return Ok(value);
        }
        if self.completed_fills.load(Ordering::Acquire) != seen_fills {
            if let Some(err) = flight.last_error.clone() {
                return Err(err);
            }
        }

        let outcome = fill().await;
        self.completed_fills.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                *self.slot.lock() = Some(CachedValue {
                    value: value.clone(),
                    stored_at: self.clock.now(),
                });
                flight.last_error = None;
                Ok(value)
            }
            Err(err) => {
                flight.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}
