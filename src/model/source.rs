use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::{PriceRange, StrictRange, TimePointIndex};
use crate::error::{ChartError, ChartResult};

const DEFAULT_MIN_MOVE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(u64);

impl SourceId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Base value for percentage and indexed-to-100 modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstValue {
    pub index: TimePointIndex,
    pub value: f64,
}

/// Extra pixels a source asks to keep free above and below its range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoscaleMargins {
    pub above: f64,
    pub below: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoscaleInfo {
    pub price_range: Option<PriceRange>,
    pub margins: Option<AutoscaleMargins>,
}

/// Data attached to a price scale that takes part in autoscaling.
pub trait PriceScaleSource: fmt::Debug {
    fn visible(&self) -> bool;

    fn first_value(&self, visible_bars: StrictRange) -> Option<FirstValue>;

    fn autoscale_info(&self, visible_bars: StrictRange) -> Option<AutoscaleInfo>;

    /// Minimum price increment of the instrument.
    fn min_move(&self) -> f64 {
        DEFAULT_MIN_MOVE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesBar {
    pub index: TimePointIndex,
    pub low: f64,
    pub high: f64,
    pub close: f64,
}

/// Price series addressed by time-point index.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSource {
    bars: Vec<SeriesBar>,
    visible: bool,
    min_move: f64,
    margins: Option<AutoscaleMargins>,
}

impl SeriesSource {
    pub fn new(bars: Vec<SeriesBar>) -> ChartResult<Self> {
        validate_bars(&bars)?;
        Ok(Self {
            bars,
            visible: true,
            min_move: DEFAULT_MIN_MOVE,
            margins: None,
        })
    }

    pub fn with_min_move(mut self, min_move: f64) -> ChartResult<Self> {
        if !min_move.is_finite() || min_move <= 0.0 {
            return Err(ChartError::InvalidData(
                "min move must be finite and > 0".to_owned(),
            ));
        }
        self.min_move = min_move;
        Ok(self)
    }

    #[must_use]
    pub fn with_margins(mut self, margins: AutoscaleMargins) -> Self {
        self.margins = Some(margins);
        self
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_bars(&mut self, bars: Vec<SeriesBar>) -> ChartResult<()> {
        validate_bars(&bars)?;
        self.bars = bars;
        Ok(())
    }

    #[must_use]
    pub fn bars(&self) -> &[SeriesBar] {
        &self.bars
    }

    fn bars_in(&self, visible_bars: StrictRange) -> &[SeriesBar] {
        let start = self
            .bars
            .partition_point(|bar| bar.index < visible_bars.left());
        let end = self
            .bars
            .partition_point(|bar| bar.index <= visible_bars.right());
        &self.bars[start..end.max(start)]
    }
}

impl PriceScaleSource for SeriesSource {
    fn visible(&self) -> bool {
        self.visible
    }

    fn first_value(&self, visible_bars: StrictRange) -> Option<FirstValue> {
        let start = self
            .bars
            .partition_point(|bar| bar.index < visible_bars.left());
        self.bars
            .get(start)
            .filter(|bar| bar.index <= visible_bars.right())
            .map(|bar| FirstValue {
                index: bar.index,
                value: bar.close,
            })
    }

    fn autoscale_info(&self, visible_bars: StrictRange) -> Option<AutoscaleInfo> {
        let bars = self.bars_in(visible_bars);
        let low = bars.iter().map(|bar| OrderedFloat(bar.low)).min()?;
        let high = bars.iter().map(|bar| OrderedFloat(bar.high)).max()?;
        Some(AutoscaleInfo {
            price_range: Some(PriceRange::new(low.into_inner(), high.into_inner())),
            margins: self.margins,
        })
    }

    fn min_move(&self) -> f64 {
        self.min_move
    }
}

fn validate_bars(bars: &[SeriesBar]) -> ChartResult<()> {
    if bars.windows(2).any(|pair| pair[0].index >= pair[1].index) {
        return Err(ChartError::InvalidData(
            "series bars must be strictly ascending by index".to_owned(),
        ));
    }
    let malformed = bars.iter().any(|bar| {
        !bar.low.is_finite()
            || !bar.high.is_finite()
            || !bar.close.is_finite()
            || bar.low > bar.high
    });
    if malformed {
        return Err(ChartError::InvalidData(
            "series bar values must be finite with low <= high".to_owned(),
        ));
    }
    Ok(())
}
