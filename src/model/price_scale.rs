use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::core::transforms::{
    can_convert_price_range_from_log, convert_price_range_from_log, convert_price_range_to_log,
    from_indexed_to_100, from_percent, log_formula_for_price_range, to_indexed_to_100,
    to_indexed_to_100_range, to_percent, to_percent_range,
};
use crate::core::{
    LogFormula, PercentageFormatter, PriceFormatter, PriceRange, ScaleFormatter, StrictRange,
};
use crate::error::{ChartError, ChartResult};

use super::price_tick_marks::{
    PriceMark, PriceMarkSettings, PriceProjection, PriceTickMarkBuilder,
};
use super::source::{FirstValue, PriceScaleSource, SourceId};

const DEFAULT_TICK_BASE: f64 = 100.0;
const DEFAULT_MIN_MOVE: f64 = 0.01;
const EDGE_MARKS_PADDING: f64 = 6.0;
const DEGENERATE_RANGE_MIN_MOVES: f64 = 5.0;
const MIN_SCALE_COEFF: f64 = 0.1;
const SCALE_ANCHOR_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceScaleMode {
    #[default]
    Normal,
    Logarithmic,
    Percentage,
    IndexedTo100,
}

impl PriceScaleMode {
    fn is_relative(self) -> bool {
        matches!(self, Self::Percentage | Self::IndexedTo100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceScaleState {
    pub auto_scale: bool,
    pub is_inverted: bool,
    pub mode: PriceScaleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceScaleStateChange {
    pub auto_scale: Option<bool>,
    pub is_inverted: Option<bool>,
    pub mode: Option<PriceScaleMode>,
}

/// Fractions of the scale height kept free above and below the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceScaleMargins {
    pub top: f64,
    pub bottom: f64,
}

impl Default for PriceScaleMargins {
    fn default() -> Self {
        Self {
            top: 0.2,
            bottom: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceScaleOptions {
    pub auto_scale: bool,
    pub mode: PriceScaleMode,
    pub invert_scale: bool,
    pub scale_margins: PriceScaleMargins,
    pub entire_text_only: bool,
    pub ensure_edge_tick_marks_visible: bool,
    pub font_size: f64,
}

impl Default for PriceScaleOptions {
    fn default() -> Self {
        Self {
            auto_scale: true,
            mode: PriceScaleMode::Normal,
            invert_scale: false,
            scale_margins: PriceScaleMargins::default(),
            entire_text_only: false,
            ensure_edge_tick_marks_visible: false,
            font_size: 12.0,
        }
    }
}

impl PriceScaleOptions {
    fn validate(&self) -> ChartResult<()> {
        let margins = self.scale_margins;
        if !(0.0..=1.0).contains(&margins.top) {
            return Err(ChartError::InvalidOptions(
                "price scale top margin must be in [0,1]".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&margins.bottom) {
            return Err(ChartError::InvalidOptions(
                "price scale bottom margin must be in [0,1]".to_owned(),
            ));
        }
        if margins.top + margins.bottom > 1.0 {
            return Err(ChartError::InvalidOptions(
                "sum of price scale margins must be <= 1".to_owned(),
            ));
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(ChartError::InvalidOptions(
                "font size must be finite and > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`PriceScaleOptions`]; unset fields stay untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PriceScaleOptionsPatch {
    pub auto_scale: Option<bool>,
    pub mode: Option<PriceScaleMode>,
    pub invert_scale: Option<bool>,
    pub scale_margins: Option<PriceScaleMargins>,
    pub entire_text_only: Option<bool>,
    pub ensure_edge_tick_marks_visible: Option<bool>,
    pub font_size: Option<f64>,
}

impl PriceScaleOptionsPatch {
    pub fn from_json_str(input: &str) -> ChartResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    fn merged_into(self, options: PriceScaleOptions) -> PriceScaleOptions {
        PriceScaleOptions {
            auto_scale: self.auto_scale.unwrap_or(options.auto_scale),
            mode: self.mode.unwrap_or(options.mode),
            invert_scale: self.invert_scale.unwrap_or(options.invert_scale),
            scale_margins: self.scale_margins.unwrap_or(options.scale_margins),
            entire_text_only: self.entire_text_only.unwrap_or(options.entire_text_only),
            ensure_edge_tick_marks_visible: self
                .ensure_edge_tick_marks_visible
                .unwrap_or(options.ensure_edge_tick_marks_visible),
            font_size: self.font_size.unwrap_or(options.font_size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PriceScaleGesture {
    Idle,
    Scale {
        start_point: f64,
        snapshot: PriceRange,
    },
    Scroll {
        start_point: f64,
        snapshot: PriceRange,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InvalidatedRange {
    visible_bars: Option<StrictRange>,
    is_valid: bool,
}

#[derive(Debug, Clone)]
struct FormatterState {
    formatter: ScaleFormatter,
    mark_builder: Option<PriceTickMarkBuilder>,
}

#[derive(Debug, Clone)]
struct MarksCache {
    marks: Vec<PriceMark>,
    first_value_is_null: bool,
}

/// Vertical scale of a pane.
///
/// The price range is recomputed lazily: [`PriceScale::recalculate_price_range`]
/// only records the visible bars, the merge over sources runs on the next read.
#[derive(Debug)]
pub struct PriceScale {
    id: String,
    options: PriceScaleOptions,
    height: f64,
    internal_height_cache: Option<f64>,
    price_range: Option<PriceRange>,
    invalidated: InvalidatedRange,
    is_custom_price_range: bool,
    margin_above: f64,
    margin_below: f64,
    gesture: PriceScaleGesture,
    log_formula: LogFormula,
    sources: IndexMap<SourceId, Box<dyn PriceScaleSource>>,
    formatter: Option<FormatterState>,
    marks_cache: Option<MarksCache>,
    mode_changes: SmallVec<[(PriceScaleState, PriceScaleState); 2]>,
}

impl PriceScale {
    #[must_use]
    pub fn new(id: impl Into<String>, options: PriceScaleOptions) -> Self {
        let id = id.into();
        let mut options = match options.validate() {
            Ok(()) => options,
            Err(err) => {
                warn!(id = %id, error = %err, "invalid price scale options, using defaults");
                PriceScaleOptions::default()
            }
        };
        if options.mode.is_relative() {
            options.auto_scale = true;
        }
        Self {
            id,
            options,
            height: 0.0,
            internal_height_cache: None,
            price_range: None,
            invalidated: InvalidatedRange {
                visible_bars: None,
                is_valid: false,
            },
            is_custom_price_range: false,
            margin_above: 0.0,
            margin_below: 0.0,
            gesture: PriceScaleGesture::Idle,
            log_formula: LogFormula::default(),
            sources: IndexMap::new(),
            formatter: None,
            marks_cache: None,
            mode_changes: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn options(&self) -> PriceScaleOptions {
        self.options
    }

    /// Validates the merged options before touching any state.
    pub fn apply_options(&mut self, patch: PriceScaleOptionsPatch) -> ChartResult<()> {
        let merged = patch.merged_into(self.options);
        merged.validate()?;
        debug!(id = %self.id, ?patch, "applying price scale options");

        self.options.scale_margins = merged.scale_margins;
        self.options.entire_text_only = merged.entire_text_only;
        self.options.ensure_edge_tick_marks_visible = merged.ensure_edge_tick_marks_visible;
        self.options.font_size = merged.font_size;
        self.set_mode(PriceScaleStateChange {
            auto_scale: patch.auto_scale,
            is_inverted: patch.invert_scale,
            mode: patch.mode,
        });

        self.invalidate_internal_height_cache();
        self.formatter = None;
        self.marks_cache = None;
        self.invalidated.is_valid = false;
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> PriceScaleState {
        PriceScaleState {
            auto_scale: self.options.auto_scale,
            is_inverted: self.options.invert_scale,
            mode: self.options.mode,
        }
    }

    pub fn set_mode(&mut self, change: PriceScaleStateChange) {
        let old = self.mode();
        if let Some(auto_scale) = change.auto_scale {
            self.options.auto_scale = auto_scale;
        }
        if let Some(mode) = change.mode {
            self.options.mode = mode;
            if mode.is_relative() {
                self.options.auto_scale = true;
            }
            self.invalidated.is_valid = false;
        }

        let new_mode = self.options.mode;
        if old.mode == PriceScaleMode::Logarithmic && new_mode != old.mode {
            if can_convert_price_range_from_log(self.price_range, self.log_formula) {
                if let Some(raw) =
                    convert_price_range_from_log(self.price_range, self.log_formula)
                {
                    self.set_price_range(Some(raw));
                }
            } else {
                self.options.auto_scale = true;
            }
        }
        if new_mode == PriceScaleMode::Logarithmic && new_mode != old.mode {
            if let Some(log_range) =
                convert_price_range_to_log(self.price_range, self.log_formula)
            {
                self.set_price_range(Some(log_range));
            }
        }
        if new_mode != old.mode {
            if old.mode.is_relative() || new_mode.is_relative() {
                self.formatter = None;
            }
            self.marks_cache = None;
        }

        if let Some(inverted) = change.is_inverted
            && inverted != old.is_inverted
        {
            self.options.invert_scale = inverted;
            self.invalidate_internal_height_cache();
            self.marks_cache = None;
        }

        let new = self.mode();
        if new != old {
            debug!(id = %self.id, ?old, ?new, "price scale mode changed");
            self.mode_changes.push((old, new));
        }
    }

    /// Drains `(old, new)` mode pairs recorded since the last call.
    pub fn take_mode_changes(&mut self) -> SmallVec<[(PriceScaleState, PriceScaleState); 2]> {
        std::mem::take(&mut self.mode_changes)
    }

    #[must_use]
    pub fn is_auto_scale(&self) -> bool {
        self.options.auto_scale
    }

    #[must_use]
    pub fn is_custom_price_range(&self) -> bool {
        self.is_custom_price_range
    }

    #[must_use]
    pub fn is_log(&self) -> bool {
        self.options.mode == PriceScaleMode::Logarithmic
    }

    #[must_use]
    pub fn is_percentage(&self) -> bool {
        self.options.mode == PriceScaleMode::Percentage
    }

    #[must_use]
    pub fn is_indexed_to_100(&self) -> bool {
        self.options.mode == PriceScaleMode::IndexedTo100
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.options.invert_scale
    }

    #[must_use]
    pub fn log_formula(&self) -> LogFormula {
        self.log_formula
    }

    pub fn set_height(&mut self, value: f64) {
        if !value.is_finite() || value < 0.0 {
            warn!(id = %self.id, height = value, "ignoring invalid price scale height");
            return;
        }
        if self.height == value {
            return;
        }
        self.height = value;
        self.invalidate_internal_height_cache();
        self.marks_cache = None;
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Height between the top and bottom margins.
    pub fn internal_height(&mut self) -> f64 {
        if let Some(cached) = self.internal_height_cache {
            return cached;
        }
        let value = self.height - self.top_margin_px() - self.bottom_margin_px();
        self.internal_height_cache = Some(value);
        value
    }

    pub fn price_range(&mut self) -> Option<PriceRange> {
        self.make_sure_valid();
        self.price_range
    }

    pub fn set_price_range(&mut self, range: Option<PriceRange>) {
        if self.price_range == range {
            return;
        }
        self.marks_cache = None;
        self.price_range = range;
    }

    pub fn set_custom_price_range(&mut self, range: Option<PriceRange>) {
        self.set_price_range(range);
        self.is_custom_price_range = range.is_some();
    }

    pub fn is_empty(&mut self) -> bool {
        self.make_sure_valid();
        self.height == 0.0 || self.price_range.is_none_or(PriceRange::is_empty)
    }

    /// Autoscale back on with the default range and log formula.
    pub fn reset_autoscale_state(&mut self) {
        self.set_mode(PriceScaleStateChange {
            auto_scale: Some(true),
            ..PriceScaleStateChange::default()
        });
        self.is_custom_price_range = false;
        self.gesture = PriceScaleGesture::Idle;
        self.set_price_range(None);
        self.log_formula = LogFormula::default();
        self.invalidated.is_valid = false;
    }

    /// Registers `source`, replacing a source already known under `id`.
    pub fn add_source(
        &mut self,
        id: SourceId,
        source: Box<dyn PriceScaleSource>,
    ) -> ChartResult<()> {
        PriceTickMarkBuilder::new(tick_base_for_min_move(source.min_move()))?;
        self.sources.insert(id, source);
        self.invalidate_sources();
        Ok(())
    }

    pub fn remove_source(&mut self, id: SourceId) -> ChartResult<Box<dyn PriceScaleSource>> {
        let source = self
            .sources
            .shift_remove(&id)
            .ok_or(ChartError::UnknownSource(id))?;
        if self.sources.is_empty() {
            self.reset_autoscale_state();
        }
        self.invalidate_sources();
        Ok(source)
    }

    #[must_use]
    pub fn source(&self, id: SourceId) -> Option<&dyn PriceScaleSource> {
        self.sources.get(&id).map(|source| source.as_ref())
    }

    #[must_use]
    pub fn has_source(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Marks the range stale for `visible_bars`; the merge runs on the next read.
    pub fn recalculate_price_range(&mut self, visible_bars: StrictRange) {
        self.invalidated = InvalidatedRange {
            visible_bars: Some(visible_bars),
            is_valid: false,
        };
    }

    /// Earliest first value across sources within the last recalculated bars.
    #[must_use]
    pub fn first_value(&self) -> Option<FirstValue> {
        let visible_bars = self.invalidated.visible_bars?;
        self.sources
            .values()
            .filter_map(|source| source.first_value(visible_bars))
            .min_by_key(|first| first.index)
    }

    pub fn price_to_coordinate(&mut self, price: f64, base_value: f64) -> f64 {
        let logical = self.price_to_logical(price, base_value);
        self.logical_to_coordinate(logical)
    }

    pub fn coordinate_to_price(&mut self, coordinate: f64, base_value: f64) -> f64 {
        let logical = self.coordinate_to_logical(coordinate);
        self.logical_to_price(logical, base_value)
    }

    #[must_use]
    pub fn price_to_logical(&self, price: f64, base_value: f64) -> f64 {
        match self.options.mode {
            PriceScaleMode::Percentage => to_percent(price, base_value),
            PriceScaleMode::IndexedTo100 => to_indexed_to_100(price, base_value),
            PriceScaleMode::Normal | PriceScaleMode::Logarithmic => price,
        }
    }

    #[must_use]
    pub fn logical_to_price(&self, logical: f64, base_value: f64) -> f64 {
        match self.options.mode {
            PriceScaleMode::Percentage => from_percent(logical, base_value),
            PriceScaleMode::IndexedTo100 => from_indexed_to_100(logical, base_value),
            PriceScaleMode::Normal | PriceScaleMode::Logarithmic => logical,
        }
    }

    pub fn logical_to_coordinate(&mut self, logical: f64) -> f64 {
        self.projection()
            .map_or(0.0, |projection| projection.logical_to_coordinate(logical))
    }

    pub fn coordinate_to_logical(&mut self, coordinate: f64) -> f64 {
        self.projection()
            .map_or(0.0, |projection| projection.coordinate_to_logical(coordinate))
    }

    /// Current projection state, `None` while the scale is empty.
    pub fn projection(&mut self) -> Option<PriceProjection> {
        if self.is_empty() {
            return None;
        }
        let range = self.price_range?;
        Some(PriceProjection {
            height: self.height,
            internal_height: self.internal_height(),
            bottom_margin: self.bottom_margin_px(),
            range,
            inverted: self.is_inverted(),
            log_formula: self.is_log().then_some(self.log_formula),
        })
    }

    pub fn formatter(&mut self) -> &ScaleFormatter {
        &self.formatter_state().formatter
    }

    pub fn format_price(&mut self, price: f64, first_value: f64) -> String {
        let logical = self.price_to_logical(price, first_value);
        self.format_logical(logical)
    }

    pub fn format_logical(&mut self, logical: f64) -> String {
        self.formatter().format(logical)
    }

    /// Tick marks for the current state, rebuilt only after invalidation.
    ///
    /// While no source has a first value the previous marks are kept.
    pub fn marks(&mut self) -> &[PriceMark] {
        self.make_sure_valid();
        let first_value_is_null = self.first_value().is_none();
        let reusable = self.marks_cache.as_ref().is_some_and(|cache| {
            first_value_is_null || cache.first_value_is_null == first_value_is_null
        });
        if !reusable {
            let marks = if first_value_is_null {
                Vec::new()
            } else {
                self.rebuild_marks()
            };
            trace!(id = %self.id, count = marks.len(), "rebuilt price marks");
            self.marks_cache = Some(MarksCache {
                marks,
                first_value_is_null,
            });
        }
        match &self.marks_cache {
            Some(cache) => &cache.marks,
            None => &[],
        }
    }

    pub fn start_scale(&mut self, x: f64) {
        if self.options.mode.is_relative() || self.gesture != PriceScaleGesture::Idle {
            return;
        }
        if self.is_empty() {
            return;
        }
        let Some(snapshot) = self.price_range else {
            return;
        };
        self.gesture = PriceScaleGesture::Scale {
            start_point: self.height - x,
            snapshot,
        };
    }

    /// Dragging near the start point barely zooms, dragging across the
    /// height zooms strongly. The coefficient never drops below 0.1.
    pub fn scale_to(&mut self, x: f64) {
        if self.options.mode.is_relative() {
            return;
        }
        let PriceScaleGesture::Scale {
            start_point,
            snapshot,
        } = self.gesture
        else {
            return;
        };
        self.set_mode(PriceScaleStateChange {
            auto_scale: Some(false),
            ..PriceScaleStateChange::default()
        });
        let x = (self.height - x).max(0.0);
        let anchor = (self.height - 1.0) * SCALE_ANCHOR_FRACTION;
        let coeff = ((start_point + anchor) / (x + anchor)).max(MIN_SCALE_COEFF);
        let mut range = snapshot;
        range.scale_around_center(coeff);
        self.set_price_range(Some(range));
    }

    pub fn end_scale(&mut self) {
        if matches!(self.gesture, PriceScaleGesture::Scale { .. }) {
            self.gesture = PriceScaleGesture::Idle;
        }
    }

    pub fn start_scroll(&mut self, x: f64) {
        if self.options.auto_scale || self.gesture != PriceScaleGesture::Idle {
            return;
        }
        if self.is_empty() {
            return;
        }
        let Some(snapshot) = self.price_range else {
            return;
        };
        self.gesture = PriceScaleGesture::Scroll {
            start_point: x,
            snapshot,
        };
    }

    pub fn scroll_to(&mut self, x: f64) {
        if self.options.auto_scale {
            return;
        }
        let PriceScaleGesture::Scroll {
            start_point,
            snapshot,
        } = self.gesture
        else {
            return;
        };
        let span_px = self.internal_height() - 1.0;
        if span_px <= 0.0 {
            return;
        }
        let mut pixel_delta = x - start_point;
        if self.is_inverted() {
            pixel_delta *= -1.0;
        }
        let mut range = snapshot;
        range.shift(pixel_delta * snapshot.length() / span_px);
        self.set_price_range(Some(range));
        self.marks_cache = None;
    }

    pub fn end_scroll(&mut self) {
        if matches!(self.gesture, PriceScaleGesture::Scroll { .. }) {
            self.gesture = PriceScaleGesture::Idle;
        }
    }

    #[must_use]
    pub fn has_visible_edge_marks(&self) -> bool {
        self.options.ensure_edge_tick_marks_visible && self.options.auto_scale
    }

    #[must_use]
    pub fn edge_marks_padding(&self) -> f64 {
        EDGE_MARKS_PADDING
    }

    fn formatter_state(&mut self) -> &FormatterState {
        let mode = self.options.mode;
        let id = &self.id;
        let first_min_move = self.sources.values().next().map(|source| source.min_move());
        self.formatter.get_or_insert_with(|| {
            let (formatter, base) = match (mode, first_min_move) {
                (PriceScaleMode::Percentage, _) => (
                    ScaleFormatter::Percentage(PercentageFormatter::default()),
                    DEFAULT_TICK_BASE,
                ),
                (PriceScaleMode::IndexedTo100, _) => (
                    ScaleFormatter::IndexedTo100(PriceFormatter::new(DEFAULT_MIN_MOVE)),
                    DEFAULT_TICK_BASE,
                ),
                (_, Some(min_move)) => (
                    ScaleFormatter::Price(PriceFormatter::new(min_move)),
                    tick_base_for_min_move(min_move),
                ),
                (_, None) => (
                    ScaleFormatter::Price(PriceFormatter::default()),
                    DEFAULT_TICK_BASE,
                ),
            };
            let mark_builder = match PriceTickMarkBuilder::new(base) {
                Ok(builder) => Some(builder),
                Err(err) => {
                    warn!(id = %id, error = %err, "invalid tick base, falling back to default");
                    PriceTickMarkBuilder::new(DEFAULT_TICK_BASE).ok()
                }
            };
            FormatterState {
                formatter,
                mark_builder,
            }
        })
    }

    fn rebuild_marks(&mut self) -> Vec<PriceMark> {
        let Some(projection) = self.projection() else {
            return Vec::new();
        };
        let settings = PriceMarkSettings {
            font_size: self.options.font_size,
            entire_text_only: self.options.entire_text_only,
            edge_marks: self.has_visible_edge_marks(),
        };
        let state = self.formatter_state();
        state.mark_builder.as_ref().map_or_else(Vec::new, |builder| {
            builder.build(&projection, settings, &state.formatter)
        })
    }

    fn make_sure_valid(&mut self) {
        if !self.invalidated.is_valid {
            self.invalidated.is_valid = true;
            self.recalculate_price_range_impl();
        }
    }

    fn recalculate_price_range_impl(&mut self) {
        let Some(visible_bars) = self.invalidated.visible_bars else {
            return;
        };
        if !self.options.auto_scale && self.price_range.is_some() {
            return;
        }

        let mode = self.options.mode;
        let mut price_range: Option<PriceRange> = None;
        let mut margin_above: f64 = 0.0;
        let mut margin_below: f64 = 0.0;

        for source in self.sources.values() {
            if !source.visible() {
                continue;
            }
            let Some(first_value) = source.first_value(visible_bars) else {
                continue;
            };
            let Some(info) = source.autoscale_info(visible_bars) else {
                continue;
            };
            let Some(source_range) = info.price_range else {
                continue;
            };
            let source_range = match mode {
                PriceScaleMode::Logarithmic => {
                    convert_price_range_to_log(Some(source_range), self.log_formula)
                        .unwrap_or(source_range)
                }
                PriceScaleMode::Percentage => to_percent_range(source_range, first_value.value),
                PriceScaleMode::IndexedTo100 => {
                    to_indexed_to_100_range(source_range, first_value.value)
                }
                PriceScaleMode::Normal => source_range,
            };
            price_range = Some(source_range.merge_optional(price_range));
            if let Some(margins) = info.margins {
                margin_above = margin_above.max(margins.above);
                margin_below = margin_below.max(margins.below);
            }
        }

        if self.has_visible_edge_marks() {
            margin_above = margin_above.max(EDGE_MARKS_PADDING);
            margin_below = margin_below.max(EDGE_MARKS_PADDING);
        }
        if margin_above != self.margin_above || margin_below != self.margin_below {
            self.margin_above = margin_above;
            self.margin_below = margin_below;
            self.marks_cache = None;
            self.invalidate_internal_height_cache();
        }

        let Some(mut range) = price_range else {
            if self.price_range.is_none() {
                self.set_price_range(Some(PriceRange::new(-0.5, 0.5)));
                self.log_formula = log_formula_for_price_range(None);
            }
            return;
        };

        if range.min() == range.max() {
            let min_move = if mode.is_relative() {
                1.0
            } else {
                self.sources
                    .values()
                    .next()
                    .map_or(DEFAULT_MIN_MOVE, |source| source.min_move())
            };
            let extend = DEGENERATE_RANGE_MIN_MOVES * min_move;
            if self.is_log()
                && let Some(raw) = convert_price_range_from_log(Some(range), self.log_formula)
            {
                range = raw;
            }
            range = PriceRange::new(range.min() - extend, range.max() + extend);
            if self.is_log()
                && let Some(log_range) = convert_price_range_to_log(Some(range), self.log_formula)
            {
                range = log_range;
            }
        }

        if self.is_log()
            && let Some(raw) = convert_price_range_from_log(Some(range), self.log_formula)
        {
            let new_formula = log_formula_for_price_range(Some(raw));
            if !new_formula.same_as(self.log_formula) {
                let old_formula = self.log_formula;
                self.log_formula = new_formula;
                range = convert_price_range_to_log(Some(raw), new_formula).unwrap_or(range);
                if let PriceScaleGesture::Scale { snapshot, .. }
                | PriceScaleGesture::Scroll { snapshot, .. } = &mut self.gesture
                    && let Some(raw_snapshot) =
                        convert_price_range_from_log(Some(*snapshot), old_formula)
                    && let Some(reprojected) =
                        convert_price_range_to_log(Some(raw_snapshot), new_formula)
                {
                    *snapshot = reprojected;
                }
            }
        }

        trace!(id = %self.id, ?range, "recalculated price range");
        self.set_price_range(Some(range));
    }

    fn invalidate_sources(&mut self) {
        self.formatter = None;
        self.marks_cache = None;
        self.invalidated.is_valid = false;
    }

    fn invalidate_internal_height_cache(&mut self) {
        self.internal_height_cache = None;
    }

    fn top_margin_px(&self) -> f64 {
        if self.is_inverted() {
            self.options.scale_margins.bottom * self.height + self.margin_below
        } else {
            self.options.scale_margins.top * self.height + self.margin_above
        }
    }

    fn bottom_margin_px(&self) -> f64 {
        if self.is_inverted() {
            self.options.scale_margins.top * self.height + self.margin_above
        } else {
            self.options.scale_margins.bottom * self.height + self.margin_below
        }
    }
}

/// Number of minimum increments per price unit.
#[must_use]
pub fn tick_base_for_min_move(min_move: f64) -> f64 {
    (1.0 / min_move).round()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{PriceScale, PriceScaleMode, PriceScaleOptions, tick_base_for_min_move};
    use crate::core::{PriceRange, StrictRange};
    use crate::model::source::{AutoscaleMargins, SeriesBar, SeriesSource, SourceId};

    fn bars(values: &[(f64, f64)]) -> Vec<SeriesBar> {
        values
            .iter()
            .enumerate()
            .map(|(index, &(low, high))| SeriesBar {
                index: index as i64,
                low,
                high,
                close: high,
            })
            .collect()
    }

    #[test]
    fn linear_price_coordinate_round_trip_is_stable() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        price_scale.set_height(500.0);
        price_scale.set_price_range(Some(PriceRange::new(100.0, 200.0)));
        let y = price_scale.price_to_coordinate(150.0, 150.0);
        let p = price_scale.coordinate_to_price(y, 150.0);
        assert_abs_diff_eq!(p, 150.0, epsilon = 1e-9);
    }

    #[test]
    fn percentage_price_transform_round_trip() {
        let options = PriceScaleOptions {
            mode: PriceScaleMode::Percentage,
            ..Default::default()
        };
        let mut price_scale = PriceScale::new("right", options);
        price_scale.set_height(400.0);
        price_scale.set_price_range(Some(PriceRange::new(-10.0, 10.0)));
        let y = price_scale.price_to_coordinate(105.0, 100.0);
        let p = price_scale.coordinate_to_price(y, 100.0);
        assert_abs_diff_eq!(p, 105.0, epsilon = 1e-6);
    }

    #[test]
    fn recalculate_price_range_with_no_sources_falls_back_to_default() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        price_scale.recalculate_price_range(StrictRange::new(0, 10).expect("range"));
        let range = price_scale.price_range().expect("default range");
        assert_abs_diff_eq!(range.min(), -0.5);
        assert_abs_diff_eq!(range.max(), 0.5);
    }

    #[test]
    fn margin_below_merges_against_running_below_margin() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        price_scale.set_height(100.0);
        let tall_above = SeriesSource::new(bars(&[(1.0, 2.0)]))
            .expect("source")
            .with_margins(AutoscaleMargins {
                above: 20.0,
                below: 1.0,
            });
        let tall_below = SeriesSource::new(bars(&[(1.0, 2.0)]))
            .expect("source")
            .with_margins(AutoscaleMargins {
                above: 0.0,
                below: 5.0,
            });
        price_scale
            .add_source(SourceId::new(1), Box::new(tall_above))
            .expect("add");
        price_scale
            .add_source(SourceId::new(2), Box::new(tall_below))
            .expect("add");
        price_scale.recalculate_price_range(StrictRange::new(0, 0).expect("range"));
        let _ = price_scale.price_range();

        // 100 - (20 + 20) - (10 + 5)
        assert_abs_diff_eq!(price_scale.internal_height(), 45.0);
    }

    #[test]
    fn tick_base_inverts_min_move() {
        assert_abs_diff_eq!(tick_base_for_min_move(0.01), 100.0);
        assert_abs_diff_eq!(tick_base_for_min_move(0.25), 4.0);
        assert_abs_diff_eq!(tick_base_for_min_move(1.0), 1.0);
    }
}
