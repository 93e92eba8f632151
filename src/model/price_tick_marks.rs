use smallvec::SmallVec;

use crate::core::transforms::{from_log, to_log};
use crate::core::{
    INTEGRAL_DIVIDER_SEQUENCES, LogFormula, PriceRange, PriceTickSpanCalculator, ScaleFormatter,
    min_tick_span,
};
use crate::error::ChartResult;

const TICK_DENSITY: f64 = 2.5;

/// Renderable price-axis label.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMark {
    pub coordinate: f64,
    pub logical: f64,
    pub label: String,
    pub need_align_coordinate: bool,
}

/// Snapshot of a price scale's projection state.
///
/// `range` is in the scale's internal space: log-transformed when
/// `log_formula` is set, otherwise raw (or percent / indexed) values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceProjection {
    pub height: f64,
    pub internal_height: f64,
    pub bottom_margin: f64,
    pub range: PriceRange,
    pub inverted: bool,
    pub log_formula: Option<LogFormula>,
}

impl PriceProjection {
    #[must_use]
    pub fn logical_to_coordinate(&self, logical: f64) -> f64 {
        let logical = match self.log_formula {
            Some(formula) if logical != 0.0 => to_log(logical, formula),
            _ => logical,
        };
        let inv_coordinate = self.bottom_margin
            + (self.internal_height - 1.0) * (logical - self.range.min()) / self.range.length();
        self.inverted_coordinate(inv_coordinate)
    }

    #[must_use]
    pub fn coordinate_to_logical(&self, coordinate: f64) -> f64 {
        let span_px = self.internal_height - 1.0;
        let logical = if span_px <= 0.0 {
            self.range.min()
        } else {
            let inv_coordinate = self.inverted_coordinate(coordinate);
            self.range.min()
                + self.range.length() * ((inv_coordinate - self.bottom_margin) / span_px)
        };
        match self.log_formula {
            Some(formula) => from_log(logical, formula),
            None => logical,
        }
    }

    fn inverted_coordinate(&self, coordinate: f64) -> f64 {
        if self.inverted {
            coordinate
        } else {
            self.height - 1.0 - coordinate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceMarkSettings {
    pub font_size: f64,
    /// Drop marks whose label would be clipped at the top or bottom.
    pub entire_text_only: bool,
    /// Emit the range extremes as aligned marks.
    pub edge_marks: bool,
}

/// Evenly spaced, collision-free price marks.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTickMarkBuilder {
    base: f64,
    calculators: Vec<PriceTickSpanCalculator>,
}

impl PriceTickMarkBuilder {
    pub fn new(base: f64) -> ChartResult<Self> {
        let calculators = INTEGRAL_DIVIDER_SEQUENCES
            .iter()
            .map(|dividers| PriceTickSpanCalculator::new(base, dividers))
            .collect::<ChartResult<Vec<_>>>()?;
        Ok(Self { base, calculators })
    }

    #[must_use]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Span for `[low, high]` so that marks stay one label height apart on a
    /// scale `height` pixels tall.
    #[must_use]
    pub fn tick_span(&self, high: f64, low: f64, height: f64, mark_height: f64) -> f64 {
        let max_tick_span = (high - low) * mark_height / height;
        min_tick_span(&self.calculators, high, low, max_tick_span)
    }

    #[must_use]
    pub fn build(
        &self,
        projection: &PriceProjection,
        settings: PriceMarkSettings,
        formatter: &ScaleFormatter,
    ) -> Vec<PriceMark> {
        let height = projection.height;
        let bottom = projection.coordinate_to_logical(height - 1.0);
        let top = projection.coordinate_to_logical(0.0);
        let high = bottom.max(top);
        let low = bottom.min(top);
        if high == low || !high.is_finite() || !low.is_finite() {
            return Vec::new();
        }

        let mark_height = tick_mark_height(settings.font_size);
        let extra_margin = if settings.entire_text_only {
            settings.font_size / 2.0
        } else {
            0.0
        };
        let min_coordinate = extra_margin;
        let max_coordinate = height - 1.0 - extra_margin;

        let edges = if settings.edge_marks {
            edge_marks(projection, formatter)
        } else {
            SmallVec::new()
        };

        let mut span = self.tick_span(high, low, height, mark_height);
        let mut modulo = high % span;
        if modulo < 0.0 {
            modulo += span;
        }

        let mut marks = Vec::new();
        let mut previous_coordinate: Option<f64> = None;
        let mut logical = high - modulo;
        while logical > low && span > 0.0 && span.is_finite() {
            let coordinate = projection.logical_to_coordinate(logical);
            let crowded =
                previous_coordinate.is_some_and(|prev| (coordinate - prev).abs() < mark_height);
            let near_edge = edges
                .iter()
                .any(|edge: &PriceMark| (coordinate - edge.coordinate).abs() < mark_height);
            let visible = (min_coordinate..=max_coordinate).contains(&coordinate);
            if !crowded && !near_edge && visible {
                marks.push(PriceMark {
                    coordinate,
                    logical,
                    label: formatter.format(logical),
                    need_align_coordinate: false,
                });
                previous_coordinate = Some(coordinate);
                // Log density is not uniform, re-derive the span below each mark.
                if projection.log_formula.is_some() {
                    span = self.tick_span(logical, low, height, mark_height);
                }
            }
            let next = logical - span;
            if next >= logical {
                break;
            }
            logical = next;
        }

        if let [top_edge, bottom_edge] = edges.as_slice() {
            marks.insert(0, top_edge.clone());
            marks.push(bottom_edge.clone());
        }
        marks
    }
}

#[must_use]
pub fn tick_mark_height(font_size: f64) -> f64 {
    (font_size * TICK_DENSITY).ceil()
}

fn edge_marks(
    projection: &PriceProjection,
    formatter: &ScaleFormatter,
) -> SmallVec<[PriceMark; 2]> {
    [projection.range.max(), projection.range.min()]
        .into_iter()
        .map(|value| {
            let logical = match projection.log_formula {
                Some(formula) => from_log(value, formula),
                None => value,
            };
            PriceMark {
                coordinate: projection.logical_to_coordinate(logical),
                logical,
                label: formatter.format(logical),
                need_align_coordinate: true,
            }
        })
        .collect()
}
