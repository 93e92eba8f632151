use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

/// Index into the ordered array of time points.
pub type TimePointIndex = i64;

/// Closed interval `[left, right]` with `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval<T> {
    left: T,
    right: T,
}

/// Visible bars addressed by whole time-point indexes.
pub type StrictRange = Interval<TimePointIndex>;

/// Continuous visible window in logical index space.
pub type LogicalRange = Interval<f64>;

impl<T> Interval<T>
where
    T: Copy + PartialOrd + fmt::Debug + Into<IntervalBound>,
{
    pub fn new(left: T, right: T) -> ChartResult<Self> {
        // NaN bounds are unordered and rejected as well.
        if !matches!(left.partial_cmp(&right), Some(Ordering::Less | Ordering::Equal)) {
            return Err(ChartError::InvalidInterval {
                left: left.into().0,
                right: right.into().0,
            });
        }
        Ok(Self { left, right })
    }

    #[must_use]
    pub fn left(self) -> T {
        self.left
    }

    #[must_use]
    pub fn right(self) -> T {
        self.right
    }

    #[must_use]
    pub fn contains(self, value: T) -> bool {
        self.left <= value && value <= self.right
    }
}

impl Interval<TimePointIndex> {
    #[must_use]
    pub fn count(self) -> i64 {
        self.right - self.left + 1
    }
}

impl Interval<f64> {
    #[must_use]
    pub fn count(self) -> f64 {
        self.right - self.left + 1.0
    }
}

/// Bound widened to `f64` for error reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalBound(f64);

impl From<f64> for IntervalBound {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<TimePointIndex> for IntervalBound {
    fn from(value: TimePointIndex) -> Self {
        Self(value as f64)
    }
}
