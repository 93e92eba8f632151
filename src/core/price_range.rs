use serde::{Deserialize, Serialize};

/// Mutable `[min, max]` pair over price values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    min: f64,
    max: f64,
}

impl PriceRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn min(self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(self) -> f64 {
        self.max
    }

    pub fn set_min(&mut self, min: f64) {
        self.min = min;
    }

    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.min == self.max || self.min.is_nan() || self.max.is_nan()
    }

    #[must_use]
    pub fn contains_strictly(self, other: PriceRange) -> bool {
        other.min > self.min && other.max < self.max
    }

    /// Component-wise union; a non-finite bound on one side yields to the finite one.
    #[must_use]
    pub fn merge(self, other: PriceRange) -> Self {
        Self {
            min: finite_or_fallback(f64::min, self.min, other.min, f64::NEG_INFINITY),
            max: finite_or_fallback(f64::max, self.max, other.max, f64::INFINITY),
        }
    }

    #[must_use]
    pub fn merge_optional(self, other: Option<PriceRange>) -> Self {
        match other {
            Some(other) => self.merge(other),
            None => self,
        }
    }

    pub fn scale_around_center(&mut self, coeff: f64) {
        if !coeff.is_finite() || self.length() == 0.0 {
            return;
        }
        let center = (self.max + self.min) * 0.5;
        let max_delta = (self.max - center) * coeff;
        let min_delta = (self.min - center) * coeff;
        self.max = center + max_delta;
        self.min = center + min_delta;
    }

    pub fn shift(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        self.max += delta;
        self.min += delta;
    }
}

fn finite_or_fallback(pick: fn(f64, f64) -> f64, left: f64, right: f64, fallback: f64) -> f64 {
    match (left.is_finite(), right.is_finite()) {
        (true, true) => pick(left, right),
        (true, false) => left,
        (false, true) => right,
        (false, false) => fallback,
    }
}
