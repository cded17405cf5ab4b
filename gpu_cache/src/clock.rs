// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical clock used to order resources by recency.

/// A point on a cache's logical clock.
///
/// Larger values are more recent. Timestamps are only comparable within the
/// cache that issued them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u32);

/// A monotonically increasing counter.
///
/// [`Clock::advance`] hands out the current value and moves forward. The
/// owner is responsible for renumbering whatever it has stamped once
/// [`Clock::is_exhausted`] reports that the next step would wrap.
#[derive(Clone, Debug, Default)]
pub struct Clock {
    now: u32,
}

impl Clock {
    /// Creates a clock starting at zero.
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// The timestamp that the next call to [`Clock::advance`] will return.
    #[inline]
    pub fn now(&self) -> Timestamp {
        Timestamp(self.now)
    }

    /// Moves the clock to `timestamp`, forwards or backwards.
    #[inline]
    pub fn set(&mut self, timestamp: Timestamp) {
        self.now = timestamp.0;
    }

    /// Whether the counter has reached its last representable value.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.now == u32::MAX
    }

    /// Returns the current timestamp and steps the clock.
    ///
    /// Saturates at `u32::MAX`.
    #[inline]
    pub fn advance(&mut self) -> Timestamp {
        let stamp = Timestamp(self.now);
        self.now = self.now.saturating_add(1);
        stamp
    }
}
