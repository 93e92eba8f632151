//! Value transforms used by the non-linear price scale modes.
//!
//! Percentage and indexed-to-100 are relative to a base (first visible)
//! value. The logarithmic transform is parameterized by a [`LogFormula`]
//! that is re-derived whenever the visible range changes magnitude.

use serde::{Deserialize, Serialize};

use super::PriceRange;

const LOG_ZERO_EPSILON: f64 = 1e-15;

/// Parameters of the signed logarithmic transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogFormula {
    pub logical_offset: f64,
    pub coord_offset: f64,
}

impl Default for LogFormula {
    fn default() -> Self {
        Self {
            logical_offset: 4.0,
            coord_offset: 0.0001,
        }
    }
}

impl LogFormula {
    #[must_use]
    pub fn same_as(self, other: LogFormula) -> bool {
        self.logical_offset == other.logical_offset && self.coord_offset == other.coord_offset
    }
}

#[must_use]
pub fn to_percent(value: f64, base_value: f64) -> f64 {
    let result = 100.0 * (value - base_value) / base_value;
    if base_value < 0.0 { -result } else { result }
}

#[must_use]
pub fn from_percent(value: f64, base_value: f64) -> f64 {
    let value = if base_value < 0.0 { -value } else { value };
    (value / 100.0) * base_value + base_value
}

#[must_use]
pub fn to_percent_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        to_percent(range.min(), base_value),
        to_percent(range.max(), base_value),
    )
}

/// Percentage change shifted so that `base_value` maps to 100.
#[must_use]
pub fn to_indexed_to_100(value: f64, base_value: f64) -> f64 {
    to_percent(value, base_value) + 100.0
}

#[must_use]
pub fn from_indexed_to_100(value: f64, base_value: f64) -> f64 {
    from_percent(value - 100.0, base_value)
}

#[must_use]
pub fn to_indexed_to_100_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        to_indexed_to_100(range.min(), base_value),
        to_indexed_to_100(range.max(), base_value),
    )
}

#[must_use]
pub fn to_log(price: f64, formula: LogFormula) -> f64 {
    let magnitude = price.abs();
    if magnitude < LOG_ZERO_EPSILON {
        return 0.0;
    }
    let value = (magnitude + formula.coord_offset).log10() + formula.logical_offset;
    if price < 0.0 { -value } else { value }
}

#[must_use]
pub fn from_log(logical: f64, formula: LogFormula) -> f64 {
    let magnitude = logical.abs();
    if magnitude < LOG_ZERO_EPSILON {
        return 0.0;
    }
    let value = 10f64.powf(magnitude - formula.logical_offset) - formula.coord_offset;
    if logical < 0.0 { -value } else { value }
}

#[must_use]
pub fn convert_price_range_to_log(
    range: Option<PriceRange>,
    formula: LogFormula,
) -> Option<PriceRange> {
    range.map(|r| PriceRange::new(to_log(r.min(), formula), to_log(r.max(), formula)))
}

#[must_use]
pub fn convert_price_range_from_log(
    range: Option<PriceRange>,
    formula: LogFormula,
) -> Option<PriceRange> {
    range.map(|r| PriceRange::new(from_log(r.min(), formula), from_log(r.max(), formula)))
}

/// Both bounds of a log-space range map back to finite raw prices.
#[must_use]
pub fn can_convert_price_range_from_log(range: Option<PriceRange>, formula: LogFormula) -> bool {
    let Some(range) = range else {
        return false;
    };
    from_log(range.min(), formula).is_finite() && from_log(range.max(), formula).is_finite()
}

/// Derives log parameters that keep sub-unit ranges from collapsing.
#[must_use]
pub fn log_formula_for_price_range(range: Option<PriceRange>) -> LogFormula {
    let default = LogFormula::default();
    let Some(range) = range else {
        return default;
    };
    let diff = (range.max() - range.min()).abs();
    if !(LOG_ZERO_EPSILON..1.0).contains(&diff) {
        return default;
    }
    let digits = diff.log10().abs().ceil();
    let logical_offset = default.logical_offset + digits;
    let coord_offset = 1.0 / 10f64.powf(logical_offset);
    LogFormula {
        logical_offset,
        coord_offset,
    }
}
