//! Time source used for issuance and expiry math.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use time::OffsetDateTime;

/// Supplies the current instant.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to. Used in tests and tooling.
#[derive(Debug)]
pub struct FixedClock {
    now: ArcSwap<OffsetDateTime>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: ArcSwap::from_pointee(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        self.now.store(Arc::new(now));
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let next = **self.now.load() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        **self.now.load()
    }
}
