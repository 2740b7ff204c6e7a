use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Half the width of the window around a reference tick inside which
/// timestamps are ordered unambiguously.
pub const COMPARABLE_HALF_WINDOW: i16 = 16384;

const WRAP_TICKS: f64 = 65536.0;
const HALF_WRAP_TICKS: f64 = 32768.0;

/// A simulation tick counter that wraps modulo 2^16.
///
/// Ordering is circular: `a < b` when the shortest path from `a` to `b` moves
/// forward. That relation is only transitive for values that lie within
/// [`COMPARABLE_HALF_WINDOW`] of a common reference tick, so anything outside
/// [`Timestamp::acceptable_window`] has to be rejected before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i16);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i16::MIN);
    pub const MAX: Timestamp = Timestamp(i16::MAX);

    /// Wraps any tick count into the 16-bit range.
    pub fn new(ticks: i32) -> Self {
        Self(ticks as i16)
    }

    pub fn ticks(self) -> i16 {
        self.0
    }

    pub fn from_seconds(seconds: f64, timestep_seconds: f64) -> Self {
        FloatTimestamp::from_seconds(seconds, timestep_seconds).round()
    }

    pub fn as_seconds(self, timestep_seconds: f64) -> f64 {
        f64::from(self.0) * timestep_seconds
    }

    pub fn increment(&mut self) {
        *self += 1;
    }

    /// Signed shortest-path distance travelled from `earlier` to `self`.
    pub fn ticks_since(self, earlier: Timestamp) -> i16 {
        self.0.wrapping_sub(earlier.0)
    }

    /// `[self - 16384, self + 16384)`, the values that may be stored against
    /// this tick as a reference point.
    pub fn acceptable_window(self) -> TimestampWindow {
        TimestampWindow {
            start: self - COMPARABLE_HALF_WINDOW,
            end: self + COMPARABLE_HALF_WINDOW,
        }
    }

    pub fn check_acceptable(self, baseline: Timestamp) -> Result<(), WindowError> {
        if baseline.acceptable_window().contains(self) {
            Ok(())
        } else {
            Err(WindowError {
                timestamp: self,
                baseline,
            })
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.ticks_since(*other) {
            0 => Ordering::Equal,
            // Exactly half a revolution apart: neither direction is shorter, so
            // fall back to the raw value to stay antisymmetric.
            i16::MIN => self.0.cmp(&other.0),
            diff if diff < 0 => Ordering::Less,
            _ => Ordering::Greater,
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<i16> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: i16) -> Timestamp {
        Timestamp(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<i16> for Timestamp {
    fn add_assign(&mut self, rhs: i16) {
        *self = *self + rhs;
    }
}

impl Sub<i16> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: i16) -> Timestamp {
        Timestamp(self.0.wrapping_sub(rhs))
    }
}

impl SubAssign<i16> for Timestamp {
    fn sub_assign(&mut self, rhs: i16) {
        *self = *self - rhs;
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = i16;

    fn sub(self, rhs: Timestamp) -> i16 {
        self.ticks_since(rhs)
    }
}

impl Sub<FloatTimestamp> for Timestamp {
    type Output = FloatTimestamp;

    fn sub(self, rhs: FloatTimestamp) -> FloatTimestamp {
        FloatTimestamp::from(self) - rhs
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Half-open circular range of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimestampWindow {
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        let width = (self.end.0 as u16).wrapping_sub(self.start.0 as u16);
        let offset = (timestamp.0 as u16).wrapping_sub(self.start.0 as u16);
        offset < width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timestamp {timestamp} is outside the acceptable window around {baseline}")]
pub struct WindowError {
    pub timestamp: Timestamp,
    pub baseline: Timestamp,
}

/// Sub-tick position on the same wrapping timeline as [`Timestamp`].
///
/// The value is normalised into `[-32768, 32768)` before any truncation, so
/// `floor`/`ceil` never produce a tick on the wrong side of the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloatTimestamp(f64);

impl FloatTimestamp {
    pub fn from_unwrapped(ticks: f64) -> Self {
        Self((ticks + HALF_WRAP_TICKS).rem_euclid(WRAP_TICKS) - HALF_WRAP_TICKS)
    }

    pub fn from_seconds(seconds: f64, timestep_seconds: f64) -> Self {
        Self::from_unwrapped(seconds / timestep_seconds)
    }

    pub fn ticks(self) -> f64 {
        self.0
    }

    pub fn as_seconds(self, timestep_seconds: f64) -> f64 {
        self.0 * timestep_seconds
    }

    pub fn floor(self) -> Timestamp {
        Timestamp::new(self.0.floor() as i32)
    }

    pub fn ceil(self) -> Timestamp {
        Timestamp::new(self.0.ceil() as i32)
    }

    pub fn round(self) -> Timestamp {
        Timestamp::new(self.0.round() as i32)
    }
}

impl From<Timestamp> for FloatTimestamp {
    fn from(timestamp: Timestamp) -> Self {
        Self(f64::from(timestamp.0))
    }
}

impl Add for FloatTimestamp {
    type Output = FloatTimestamp;

    fn add(self, rhs: FloatTimestamp) -> FloatTimestamp {
        FloatTimestamp::from_unwrapped(self.0 + rhs.0)
    }
}

impl Sub for FloatTimestamp {
    type Output = FloatTimestamp;

    fn sub(self, rhs: FloatTimestamp) -> FloatTimestamp {
        FloatTimestamp::from_unwrapped(self.0 - rhs.0)
    }
}

/// A value tagged with the tick it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    inner: T,
    timestamp: Timestamp,
}

impl<T> Timestamped<T> {
    pub fn new(inner: T, timestamp: Timestamp) -> Self {
        Self { inner, timestamp }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }
}
