pub mod interval;
pub mod price_formatter;
pub mod price_range;
pub mod span_calculator;
pub mod transforms;

pub use interval::{Interval, LogicalRange, StrictRange, TimePointIndex};
pub use price_formatter::{PercentageFormatter, PriceFormatter, ScaleFormatter};
pub use price_range::PriceRange;
pub use span_calculator::{INTEGRAL_DIVIDER_SEQUENCES, PriceTickSpanCalculator, min_tick_span};
pub use transforms::LogFormula;
