//! Timestamp sources.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use wallet_sync_protocol::Timestamp;

/// A source of wall-clock milliseconds.
pub trait Clock: std::fmt::Debug + Send + Sync {
    /// Returns the current time in epoch milliseconds.
    fn now_millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `millis`.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Sets the reading.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Moves the reading forward.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Hands out strictly increasing timestamps that follow a [`Clock`].
///
/// Each tick returns `max(previous + 1, now)`, so two transactions never
/// share a timestamp even if the wall clock stalls or steps back.
#[derive(Debug)]
pub struct MonotonicClock<C> {
    source: C,
    last: Mutex<u64>,
}

impl<C: Clock> MonotonicClock<C> {
    /// Wraps a clock.
    pub fn new(source: C) -> Self {
        Self {
            source,
            last: Mutex::new(0),
        }
    }

    /// Returns the next timestamp.
    pub fn tick(&self) -> Timestamp {
        let now = self.source.now_millis();
        let mut last = self.last.lock();
        *last = now.max(last.saturating_add(1));
        Timestamp::from_millis(*last)
    }

    /// Returns the wrapped clock.
    pub fn source(&self) -> &C {
        &self.source
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}
