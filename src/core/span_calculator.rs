use crate::error::{ChartError, ChartResult};

const TICK_SPAN_EPSILON: f64 = 1e-14;
const MAX_FRACTIONAL_DIVIDERS: usize = 100;

/// Divider sequences run side by side; the smallest resulting span wins.
pub const INTEGRAL_DIVIDER_SEQUENCES: [[f64; 3]; 3] =
    [[2.0, 2.5, 2.0], [2.0, 2.0, 2.5], [2.5, 2.0, 2.0]];

/// Picks a "nice" tick spacing for a value interval.
///
/// `base` is the number of minimum price increments per unit
/// (`round(1 / min_move)`); fractional spans are only produced in steps the
/// base can represent.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTickSpanCalculator {
    base: f64,
    integral_dividers: Vec<f64>,
    fractional_dividers: Vec<f64>,
}

impl PriceTickSpanCalculator {
    pub fn new(base: f64, integral_dividers: &[f64]) -> ChartResult<Self> {
        if !base.is_finite() || base < 0.0 || base.fract() != 0.0 {
            return Err(ChartError::InvalidTickBase(base));
        }
        if integral_dividers.is_empty() || integral_dividers.iter().any(|d| *d <= 1.0) {
            return Err(ChartError::InvalidData(
                "tick span dividers must be non-empty and > 1".to_owned(),
            ));
        }
        Ok(Self {
            base,
            integral_dividers: integral_dividers.to_vec(),
            fractional_dividers: fractional_dividers_for_base(base)?,
        })
    }

    #[must_use]
    pub fn base(&self) -> f64 {
        self.base
    }

    #[must_use]
    pub fn tick_span(&self, high: f64, low: f64, max_tick_span: f64) -> f64 {
        let min_movement = if self.base == 0.0 { 0.0 } else { 1.0 / self.base };

        let mut result = 10f64.powf((high - low).log10().ceil().max(0.0));
        let mut index = 0;
        let mut divider = self.integral_dividers[0];
        loop {
            let larger_min_movement = greater_or_equal(result, min_movement)
                && result > min_movement + TICK_SPAN_EPSILON;
            let larger_max_tick_span = greater_or_equal(result, max_tick_span * divider);
            let larger_one = greater_or_equal(result, 1.0);
            if !(larger_min_movement && larger_max_tick_span && larger_one) {
                break;
            }
            result /= divider;
            index += 1;
            divider = self.integral_dividers[index % self.integral_dividers.len()];
        }

        if result <= min_movement + TICK_SPAN_EPSILON {
            result = min_movement;
        }
        result = result.max(1.0);

        if !self.fractional_dividers.is_empty() && (result - 1.0).abs() < TICK_SPAN_EPSILON {
            index = 0;
            divider = self.fractional_dividers[0];
            loop {
                let larger_min_movement = greater_or_equal(result, min_movement)
                    && result > min_movement + TICK_SPAN_EPSILON;
                let larger_max_tick_span = greater_or_equal(result, max_tick_span * divider);
                if !(larger_min_movement && larger_max_tick_span) {
                    break;
                }
                result /= divider;
                index += 1;
                divider = self.fractional_dividers[index % self.fractional_dividers.len()];
            }
        }

        result
    }
}

/// Minimum span over the three rotated divider sequences.
#[must_use]
pub fn min_tick_span(
    calculators: &[PriceTickSpanCalculator],
    high: f64,
    low: f64,
    max_tick_span: f64,
) -> f64 {
    calculators
        .iter()
        .map(|calculator| calculator.tick_span(high, low, max_tick_span))
        .fold(f64::INFINITY, f64::min)
}

fn greater_or_equal(x: f64, y: f64) -> bool {
    y - x <= TICK_SPAN_EPSILON
}

fn is_base_decimal(base: f64) -> bool {
    let mut current = base;
    while current > 1.0 {
        if current % 10.0 != 0.0 {
            return false;
        }
        current /= 10.0;
    }
    true
}

fn fractional_dividers_for_base(base: f64) -> ChartResult<Vec<f64>> {
    if is_base_decimal(base) {
        return Ok(vec![2.0, 2.5, 2.0]);
    }
    let mut dividers = Vec::new();
    let mut rest = base;
    while rest != 1.0 {
        if rest % 2.0 == 0.0 {
            dividers.push(2.0);
            rest /= 2.0;
        } else if rest % 5.0 == 0.0 {
            dividers.extend([2.0, 2.5]);
            rest /= 5.0;
        } else {
            return Err(ChartError::InvalidTickBase(base));
        }
        if dividers.len() > MAX_FRACTIONAL_DIVIDERS {
            return Err(ChartError::InvalidTickBase(base));
        }
    }
    Ok(dividers)
}
