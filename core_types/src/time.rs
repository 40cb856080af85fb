//! Tick-based time
//!
//! The reincarnation service measures all time in scheduler ticks: the
//! periodic alarm, health-check periods, stop watchdogs, and update
//! deadlines. Time is explicit and controllable, so the same code runs
//! unchanged against a simulated clock in tests.

use core::ops::{Add, AddAssign, Mul, Sub};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in time, in ticks since boot
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tick(u64);

impl Tick {
    /// Creates a tick timestamp from a raw tick count
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw tick count
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the elapsed duration since an earlier timestamp
    ///
    /// Saturates to zero if `earlier` is in the future.
    pub fn since(&self, earlier: Tick) -> Ticks {
        Ticks(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Ticks> for Tick {
    type Output = Tick;

    fn add(self, rhs: Ticks) -> Tick {
        Tick(self.0 + rhs.0)
    }
}

impl Sub<Ticks> for Tick {
    type Output = Tick;

    fn sub(self, rhs: Ticks) -> Tick {
        Tick(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A duration, in ticks
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ticks(u64);

impl Ticks {
    /// A zero-length duration
    pub const ZERO: Ticks = Ticks(0);

    /// Creates a duration from a raw tick count
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw tick count
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns true for the zero duration
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 + rhs.0)
    }
}

impl AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Ticks) {
        self.0 += rhs.0;
    }
}

impl Mul<u64> for Ticks {
    type Output = Ticks;

    fn mul(self, rhs: u64) -> Ticks {
        Ticks(self.0 * rhs)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}
