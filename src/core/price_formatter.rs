use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const MINUS_SIGN: &str = "\u{2212}";
const DEFAULT_PRECISION: u32 = 2;

/// Formats prices rounded to a minimum increment with fixed fractional digits.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFormatter {
    precision: u32,
    min_move: Decimal,
}

impl Default for PriceFormatter {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl PriceFormatter {
    /// Precision follows the number of decimal digits of `min_move`.
    #[must_use]
    pub fn new(min_move: f64) -> Self {
        let min_move = decimal_min_move(min_move);
        let precision = if min_move.is_zero() {
            DEFAULT_PRECISION
        } else {
            min_move.normalize().scale()
        };
        Self {
            precision,
            min_move,
        }
    }

    #[must_use]
    pub fn with_precision(precision: u32, min_move: f64) -> Self {
        Self {
            precision,
            min_move: decimal_min_move(min_move),
        }
    }

    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    #[must_use]
    pub fn format(&self, price: f64) -> String {
        if !price.is_finite() {
            return "nan".to_owned();
        }
        let precision = self.precision as usize;
        let Some(value) = Decimal::from_f64(price.abs()) else {
            let sign = if price < 0.0 { MINUS_SIGN } else { "" };
            return format!("{sign}{:.precision$}", price.abs());
        };

        let rounded = if self.min_move.is_zero() {
            value
        } else {
            (value / self.min_move)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                * self.min_move
        };
        let rounded =
            rounded.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointAwayFromZero);
        let sign = if price < 0.0 && !rounded.is_zero() {
            MINUS_SIGN
        } else {
            ""
        };
        format!("{sign}{rounded:.precision$}")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PercentageFormatter {
    inner: PriceFormatter,
}

impl PercentageFormatter {
    #[must_use]
    pub fn format(&self, percent: f64) -> String {
        format!("{}%", self.inner.format(percent))
    }
}

/// Label formatter selected by the price scale mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleFormatter {
    Price(PriceFormatter),
    Percentage(PercentageFormatter),
    IndexedTo100(PriceFormatter),
}

impl ScaleFormatter {
    #[must_use]
    pub fn format(&self, value: f64) -> String {
        match self {
            Self::Price(formatter) | Self::IndexedTo100(formatter) => formatter.format(value),
            Self::Percentage(formatter) => formatter.format(value),
        }
    }
}

fn decimal_min_move(min_move: f64) -> Decimal {
    if !min_move.is_finite() || min_move <= 0.0 {
        return Decimal::ZERO;
    }
    Decimal::from_f64(min_move).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::{PercentageFormatter, PriceFormatter, ScaleFormatter};

    #[test]
    fn rounds_to_min_move_and_pads_precision() {
        let formatter = PriceFormatter::new(0.01);
        assert_eq!(formatter.format(1234.5678), "1234.57");
        assert_eq!(formatter.format(3.0), "3.00");

        let quarter = PriceFormatter::new(0.25);
        assert_eq!(quarter.precision(), 2);
        assert_eq!(quarter.format(1.1), "1.00");
        assert_eq!(quarter.format(1.2), "1.25");
    }

    #[test]
    fn negative_prices_use_unicode_minus() {
        let formatter = PriceFormatter::default();
        assert_eq!(formatter.format(-3.0), "\u{2212}3.00");
        assert_eq!(formatter.format(-0.001), "0.00");
    }

    #[test]
    fn whole_unit_min_move_has_no_fraction() {
        let formatter = PriceFormatter::new(1.0);
        assert_eq!(formatter.precision(), 0);
        assert_eq!(formatter.format(41.6), "42");
    }

    #[test]
    fn percentage_formatter_appends_suffix() {
        let formatter = ScaleFormatter::Percentage(PercentageFormatter::default());
        assert_eq!(formatter.format(12.346), "12.35%");
    }
}
