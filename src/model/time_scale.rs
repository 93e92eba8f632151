use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;

#[cfg(feature = "parallel-projection")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::core::{Interval, LogicalRange, StrictRange, TimePointIndex};
use crate::error::{ChartError, ChartResult};
use crate::interaction::{
    KineticAnimation, KineticScrollConfig, OffsetTransition, TimeScaleAnimation,
};

use super::{
    HorzScaleBehavior, TickMark, TickMarkWeight, TickMarks, TimeScalePoint, UtcTimeBehavior,
};

const MIN_VISIBLE_BARS_COUNT: f64 = 2.0;
const DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH: usize = 8;
const DEFAULT_SCROLL_ANIMATION_MS: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScaleOptions {
    pub right_offset: f64,
    /// Takes precedence over `right_offset` and is kept constant while zooming.
    pub right_offset_pixels: Option<f64>,
    pub bar_spacing: f64,
    pub min_bar_spacing: f64,
    /// `0` means half of the scale width.
    pub max_bar_spacing: f64,
    pub fix_left_edge: bool,
    pub fix_right_edge: bool,
    pub lock_visible_time_range_on_resize: bool,
    pub right_bar_stays_on_scroll: bool,
    pub uniform_distribution: bool,
    /// Label width budget in characters, `None` means 8.
    pub tick_mark_max_character_length: Option<usize>,
    pub font_size: f64,
    pub handle_scroll: bool,
    pub handle_scale: bool,
}

impl Default for TimeScaleOptions {
    fn default() -> Self {
        Self {
            right_offset: 0.0,
            right_offset_pixels: None,
            bar_spacing: 6.0,
            min_bar_spacing: 0.5,
            max_bar_spacing: 0.0,
            fix_left_edge: false,
            fix_right_edge: false,
            lock_visible_time_range_on_resize: false,
            right_bar_stays_on_scroll: false,
            uniform_distribution: false,
            tick_mark_max_character_length: None,
            font_size: 12.0,
            handle_scroll: true,
            handle_scale: true,
        }
    }
}

impl TimeScaleOptions {
    fn validate(&self) -> ChartResult<()> {
        if !self.bar_spacing.is_finite() || self.bar_spacing <= 0.0 {
            return Err(ChartError::InvalidOptions(
                "bar spacing must be finite and > 0".to_owned(),
            ));
        }
        if !self.min_bar_spacing.is_finite() || self.min_bar_spacing <= 0.0 {
            return Err(ChartError::InvalidOptions(
                "min bar spacing must be finite and > 0".to_owned(),
            ));
        }
        if !self.max_bar_spacing.is_finite() || self.max_bar_spacing < 0.0 {
            return Err(ChartError::InvalidOptions(
                "max bar spacing must be finite and >= 0".to_owned(),
            ));
        }
        if !self.right_offset.is_finite() {
            return Err(ChartError::InvalidOptions(
                "right offset must be finite".to_owned(),
            ));
        }
        if self.right_offset_pixels.is_some_and(|px| !px.is_finite()) {
            return Err(ChartError::InvalidOptions(
                "right offset pixels must be finite".to_owned(),
            ));
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(ChartError::InvalidOptions(
                "font size must be finite and > 0".to_owned(),
            ));
        }
        if self.tick_mark_max_character_length == Some(0) {
            return Err(ChartError::InvalidOptions(
                "tick mark max character length must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`TimeScaleOptions`]; unset fields stay untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct TimeScaleOptionsPatch {
    pub right_offset: Option<f64>,
    pub right_offset_pixels: Option<f64>,
    pub bar_spacing: Option<f64>,
    pub min_bar_spacing: Option<f64>,
    pub max_bar_spacing: Option<f64>,
    pub fix_left_edge: Option<bool>,
    pub fix_right_edge: Option<bool>,
    pub lock_visible_time_range_on_resize: Option<bool>,
    pub right_bar_stays_on_scroll: Option<bool>,
    pub uniform_distribution: Option<bool>,
    pub tick_mark_max_character_length: Option<usize>,
    pub font_size: Option<f64>,
    pub handle_scroll: Option<bool>,
    pub handle_scale: Option<bool>,
}

impl TimeScaleOptionsPatch {
    pub fn from_json_str(input: &str) -> ChartResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    fn merged_into(self, options: TimeScaleOptions) -> TimeScaleOptions {
        TimeScaleOptions {
            right_offset: self.right_offset.unwrap_or(options.right_offset),
            right_offset_pixels: self.right_offset_pixels.or(options.right_offset_pixels),
            bar_spacing: self.bar_spacing.unwrap_or(options.bar_spacing),
            min_bar_spacing: self.min_bar_spacing.unwrap_or(options.min_bar_spacing),
            max_bar_spacing: self.max_bar_spacing.unwrap_or(options.max_bar_spacing),
            fix_left_edge: self.fix_left_edge.unwrap_or(options.fix_left_edge),
            fix_right_edge: self.fix_right_edge.unwrap_or(options.fix_right_edge),
            lock_visible_time_range_on_resize: self
                .lock_visible_time_range_on_resize
                .unwrap_or(options.lock_visible_time_range_on_resize),
            right_bar_stays_on_scroll: self
                .right_bar_stays_on_scroll
                .unwrap_or(options.right_bar_stays_on_scroll),
            uniform_distribution: self
                .uniform_distribution
                .unwrap_or(options.uniform_distribution),
            tick_mark_max_character_length: self
                .tick_mark_max_character_length
                .or(options.tick_mark_max_character_length),
            font_size: self.font_size.unwrap_or(options.font_size),
            handle_scroll: self.handle_scroll.unwrap_or(options.handle_scroll),
            handle_scale: self.handle_scale.unwrap_or(options.handle_scale),
        }
    }
}

/// Renderable time-axis label.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMark {
    pub index: TimePointIndex,
    pub coordinate: f64,
    pub label: String,
    pub weight: TickMarkWeight,
    /// Set when the label sits next to a fixed edge and should be clamped into view.
    pub need_align_coordinate: bool,
}

/// Item for the batch index-to-coordinate converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedValue {
    pub time: TimePointIndex,
    pub x: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScaleChange {
    VisibleBarsChanged,
    LogicalRangeChanged,
    BarSpacingChanged,
    RightOffsetChanged,
    OptionsApplied,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TransitionState {
    bar_spacing: f64,
    right_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimeScaleGesture {
    Idle,
    Scale {
        start_point: f64,
        start_state: TransitionState,
    },
    Scroll {
        start_point: f64,
        start_state: TransitionState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct VisibleRange {
    logical: LogicalRange,
    strict: StrictRange,
}

#[derive(Debug, Clone)]
pub struct TimeScale<B: HorzScaleBehavior = UtcTimeBehavior> {
    options: TimeScaleOptions,
    behavior: B,
    width: f64,
    base_index_or_null: Option<TimePointIndex>,
    right_offset: f64,
    points: Vec<TimeScalePoint<B::Item>>,
    bar_spacing: f64,
    gesture: TimeScaleGesture,
    visible_range: Option<VisibleRange>,
    visible_range_invalidated: bool,
    tick_marks: TickMarks,
    time_marks_cache: Option<Vec<TimeMark>>,
    formatted_labels: HashMap<(i64, TickMarkWeight), String>,
    animation: Option<TimeScaleAnimation>,
    kinetic_tracker: Option<KineticAnimation>,
    changes: SmallVec<[TimeScaleChange; 4]>,
}

impl<B: HorzScaleBehavior + Default> Default for TimeScale<B> {
    fn default() -> Self {
        Self::new(TimeScaleOptions::default(), B::default())
    }
}

impl<B: HorzScaleBehavior> TimeScale<B> {
    #[must_use]
    pub fn new(options: TimeScaleOptions, behavior: B) -> Self {
        let options = match options.validate() {
            Ok(()) => options,
            Err(err) => {
                warn!(error = %err, "invalid time scale options, using defaults");
                TimeScaleOptions::default()
            }
        };
        Self {
            behavior,
            width: 0.0,
            base_index_or_null: None,
            right_offset: options.right_offset,
            points: Vec::new(),
            bar_spacing: options.bar_spacing,
            gesture: TimeScaleGesture::Idle,
            visible_range: None,
            visible_range_invalidated: true,
            tick_marks: TickMarks::new(options.uniform_distribution),
            time_marks_cache: None,
            formatted_labels: HashMap::new(),
            animation: None,
            kinetic_tracker: None,
            changes: SmallVec::new(),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> TimeScaleOptions {
        self.options
    }

    #[must_use]
    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Merges `patch`, then re-applies edge fixing, bar spacing and right offset.
    ///
    /// Nothing changes when the merged options are invalid.
    pub fn apply_options(&mut self, patch: TimeScaleOptionsPatch) -> ChartResult<()> {
        let options = patch.merged_into(self.options);
        options.validate()?;
        debug!(?patch, "apply time scale options");

        self.track(|scale| {
            scale.options = options;
            scale.tick_marks.set_uniform_distribution(options.uniform_distribution);
            if options.fix_left_edge {
                scale.do_fix_left_edge();
            }
            if options.fix_right_edge {
                scale.do_fix_right_edge();
            }
            // Bar spacing first, the right offset in pixels depends on it.
            if patch.bar_spacing.is_some()
                || patch.min_bar_spacing.is_some()
                || patch.max_bar_spacing.is_some()
            {
                let bar_spacing = patch.bar_spacing.unwrap_or(scale.bar_spacing);
                scale.apply_bar_spacing(bar_spacing);
            }
            if let Some(pixels) = patch.right_offset_pixels {
                scale.right_offset = pixels / scale.bar_spacing;
            } else if let Some(offset) = patch.right_offset {
                scale.right_offset = offset;
            }
            scale.correct_offset();
            scale.visible_range_invalidated = true;
            scale.time_marks_cache = None;
            scale.formatted_labels.clear();
        });
        self.push_change(TimeScaleChange::OptionsApplied);
        Ok(())
    }

    pub fn set_width(&mut self, new_width: f64) -> ChartResult<()> {
        if !new_width.is_finite() || new_width <= 0.0 {
            return Err(ChartError::InvalidData(
                "time scale width must be finite and > 0".to_owned(),
            ));
        }
        if self.width == new_width {
            return Ok(());
        }
        trace!(old = self.width, new = new_width, "time scale width");

        // Edge anchoring looks at the range before the resize.
        let previous_visible_range = self.visible_logical_range();
        self.track(|scale| {
            let old_width = scale.width;
            scale.width = new_width;
            scale.visible_range_invalidated = true;

            if scale.options.lock_visible_time_range_on_resize && old_width > 0.0 {
                scale.bar_spacing = scale.bar_spacing * new_width / old_width;
            }

            if scale.options.fix_left_edge
                && let Some(range) = previous_visible_range
                && range.left() <= 0.0
            {
                let delta = old_width - new_width;
                scale.right_offset -= (delta / scale.bar_spacing).round() + 1.0;
            }

            scale.correct_bar_spacing();
            scale.correct_offset();
        });
        Ok(())
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.points.is_empty() || self.base_index_or_null.is_none()
    }

    #[must_use]
    pub fn has_points(&self) -> bool {
        !self.points.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[TimeScalePoint<B::Item>] {
        &self.points
    }

    /// Replaces the time points, reweighting and re-bucketing only from `first_changed_index`.
    pub fn update_points(
        &mut self,
        mut points: Vec<TimeScalePoint<B::Item>>,
        first_changed_index: usize,
    ) -> ChartResult<()> {
        let start = first_changed_index.min(points.len());
        let check_from = start.saturating_sub(1);
        let unsorted = points[check_from..].windows(2).any(|pair| {
            self.behavior
                .key(&pair[0].time)
                .partial_cmp(&self.behavior.key(&pair[1].time))
                != Some(Ordering::Less)
        });
        if unsorted {
            return Err(ChartError::InvalidData(
                "time points must be strictly ascending".to_owned(),
            ));
        }

        self.behavior.fill_weights_for_points(&mut points, start);
        self.tick_marks.set_time_scale_points(&points, start);
        trace!(count = points.len(), first_changed_index = start, "update time points");
        self.track(|scale| {
            scale.points = points;
            scale.visible_range_invalidated = true;
            scale.time_marks_cache = None;
            scale.correct_offset();
        });
        Ok(())
    }

    pub fn set_base_index(&mut self, base_index: Option<TimePointIndex>) {
        self.track(|scale| {
            scale.base_index_or_null = base_index;
            scale.visible_range_invalidated = true;
            scale.correct_offset();
            scale.do_fix_left_edge();
        });
    }

    #[must_use]
    pub fn base_index(&self) -> TimePointIndex {
        self.base_index_or_null.unwrap_or(0)
    }

    #[must_use]
    pub fn right_offset(&self) -> f64 {
        self.right_offset
    }

    pub fn set_right_offset(&mut self, offset: f64) -> ChartResult<()> {
        if !offset.is_finite() {
            return Err(ChartError::InvalidData(
                "time scale right offset must be finite".to_owned(),
            ));
        }
        self.track(|scale| scale.apply_right_offset(offset));
        Ok(())
    }

    #[must_use]
    pub fn bar_spacing(&self) -> f64 {
        self.bar_spacing
    }

    pub fn set_bar_spacing(&mut self, new_bar_spacing: f64) -> ChartResult<()> {
        if !new_bar_spacing.is_finite() || new_bar_spacing <= 0.0 {
            return Err(ChartError::InvalidData(
                "time scale bar spacing must be finite and > 0".to_owned(),
            ));
        }
        self.track(|scale| {
            scale.apply_bar_spacing(new_bar_spacing);
            scale.correct_offset();
        });
        Ok(())
    }

    /// Resets bar spacing and right offset to the configured defaults.
    pub fn restore_default(&mut self) {
        self.track(|scale| {
            scale.visible_range_invalidated = true;
            scale.apply_bar_spacing(scale.options.bar_spacing);
            scale.correct_offset();
            let offset = scale
                .options
                .right_offset_pixels
                .map_or(scale.options.right_offset, |px| px / scale.bar_spacing);
            scale.apply_right_offset(offset);
        });
    }

    /// Fits `range` into the width; with `apply_default_offset` the configured
    /// right offset is kept after the last bar.
    pub fn set_visible_range(&mut self, range: StrictRange, apply_default_offset: bool) {
        self.track(|scale| {
            scale.set_visible_range_impl(
                range.left() as f64,
                range.right() as f64,
                apply_default_offset,
            );
        });
    }

    pub fn set_logical_range(&mut self, range: LogicalRange) {
        self.track(|scale| scale.set_visible_range_impl(range.left(), range.right(), false));
    }

    pub fn fit_content(&mut self) {
        let (Some(first), Some(last)) = (self.first_index(), self.last_index()) else {
            return;
        };
        let right_offset_bars = if self.options.right_offset_pixels.is_none() {
            self.options.right_offset
        } else {
            0.0
        };
        self.track(|scale| {
            scale.set_visible_range_impl(first as f64, last as f64 + right_offset_bars, true);
        });
    }

    #[must_use]
    pub fn index_to_coordinate(&self, index: TimePointIndex) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let base_index = self.base_index() as f64;
        let delta_from_right = base_index + self.right_offset - index as f64;
        self.width - (delta_from_right + 0.5) * self.bar_spacing - 1.0
    }

    /// Projects `values[range]` in place. The whole slice is projected when `range` is `None`.
    pub fn indexes_to_coordinates(&self, values: &mut [TimedValue], range: Option<Range<usize>>) {
        let end = range
            .as_ref()
            .map_or(values.len(), |range| range.end.min(values.len()));
        let start = range.map_or(0, |range| range.start.min(end));

        let base_index = self.base_index() as f64;
        let right_offset = self.right_offset;
        let width = self.width;
        let bar_spacing = self.bar_spacing;
        let project = move |value: &mut TimedValue| {
            let delta_from_right = base_index + right_offset - value.time as f64;
            value.x = width - (delta_from_right + 0.5) * bar_spacing - 1.0;
        };

        #[cfg(feature = "parallel-projection")]
        values[start..end].par_iter_mut().for_each(project);

        #[cfg(not(feature = "parallel-projection"))]
        values[start..end].iter_mut().for_each(project);
    }

    #[must_use]
    pub fn coordinate_to_index(&self, x: f64) -> TimePointIndex {
        self.coordinate_to_float_index(x).ceil() as TimePointIndex
    }

    /// Inverse projection rounded to 6 decimals.
    #[must_use]
    pub fn coordinate_to_float_index(&self, x: f64) -> f64 {
        let delta_from_right = (self.width - 1.0 - x) / self.bar_spacing;
        let index = self.base_index() as f64 + self.right_offset - delta_from_right;
        (index * 1_000_000.0).round() / 1_000_000.0
    }

    #[must_use]
    pub fn right_offset_for_coordinate(&self, x: f64) -> f64 {
        (self.width - 1.0 - x) / self.bar_spacing
    }

    #[must_use]
    pub fn scroll_position(&self) -> f64 {
        self.right_offset
    }

    /// Changes bar spacing by `scale / 10` of itself, keeping the bar under
    /// `zoom_point` in place unless the right bar stays on scroll.
    pub fn zoom(&mut self, zoom_point: f64, scale: f64) {
        if self.is_empty() || !scale.is_finite() || scale == 0.0 {
            return;
        }
        self.track(|time_scale| {
            let zoom_point = zoom_point.clamp(1.0, time_scale.width.max(1.0));
            let float_index_at_zoom_point = time_scale.coordinate_to_float_index(zoom_point);
            let bar_spacing = time_scale.bar_spacing;
            time_scale.apply_bar_spacing(bar_spacing + scale * (bar_spacing / 10.0));
            time_scale.correct_offset();
            if !time_scale.options.right_bar_stays_on_scroll {
                let corrected = time_scale.right_offset
                    + (float_index_at_zoom_point
                        - time_scale.coordinate_to_float_index(zoom_point));
                time_scale.apply_right_offset(corrected);
            }
        });
    }

    pub fn start_scale(&mut self, x: f64) {
        if matches!(self.gesture, TimeScaleGesture::Scroll { .. }) {
            self.end_scroll();
        }
        if self.gesture != TimeScaleGesture::Idle || self.is_empty() {
            return;
        }
        self.stop_animation();
        self.gesture = TimeScaleGesture::Scale {
            start_point: x,
            start_state: self.transition_state(),
        };
    }

    pub fn scale_to(&mut self, x: f64) {
        let TimeScaleGesture::Scale {
            start_point,
            start_state,
        } = self.gesture
        else {
            return;
        };
        let start_length_from_right = (self.width - x).clamp(0.0, self.width);
        let current_length_from_right = (self.width - start_point).clamp(0.0, self.width);
        if start_length_from_right == 0.0 || current_length_from_right == 0.0 {
            return;
        }
        self.track(|scale| {
            scale.apply_bar_spacing(
                start_state.bar_spacing * start_length_from_right / current_length_from_right,
            );
            scale.correct_offset();
        });
    }

    pub fn end_scale(&mut self) {
        if matches!(self.gesture, TimeScaleGesture::Scale { .. }) {
            self.gesture = TimeScaleGesture::Idle;
        }
    }

    pub fn start_scroll(&mut self, x: f64) {
        if self.gesture != TimeScaleGesture::Idle || self.is_empty() {
            return;
        }
        self.stop_animation();
        self.gesture = TimeScaleGesture::Scroll {
            start_point: x,
            start_state: self.transition_state(),
        };
    }

    pub fn scroll_to(&mut self, x: f64) {
        let TimeScaleGesture::Scroll {
            start_point,
            start_state,
        } = self.gesture
        else {
            return;
        };
        let shift_in_logical = (start_point - x) / self.bar_spacing;
        self.track(|scale| scale.apply_right_offset(start_state.right_offset + shift_in_logical));
    }

    pub fn end_scroll(&mut self) {
        if matches!(self.gesture, TimeScaleGesture::Scroll { .. }) {
            self.gesture = TimeScaleGesture::Idle;
        }
    }

    pub fn visible_logical_range(&mut self) -> Option<LogicalRange> {
        self.update_visible_range();
        self.visible_range.map(|range| range.logical)
    }

    pub fn visible_strict_range(&mut self) -> Option<StrictRange> {
        self.update_visible_range();
        self.visible_range.map(|range| range.strict)
    }

    /// Time-axis labels for the visible bars, rebuilt only after invalidation.
    pub fn marks(&mut self) -> Option<&[TimeMark]> {
        self.update_visible_range();
        if self.is_empty() {
            return None;
        }
        let visible_bars = self.visible_range?.strict;
        if self.time_marks_cache.is_none() {
            let marks = self.build_time_marks(visible_bars);
            self.time_marks_cache = Some(marks);
        }
        self.time_marks_cache.as_deref()
    }

    #[must_use]
    pub fn first_index(&self) -> Option<TimePointIndex> {
        (!self.points.is_empty()).then_some(0)
    }

    #[must_use]
    pub fn last_index(&self) -> Option<TimePointIndex> {
        self.points
            .len()
            .checked_sub(1)
            .map(|last| last as TimePointIndex)
    }

    /// Lower-bound lookup of `time`.
    ///
    /// Without `find_nearest` only exact matches resolve; with it a time between
    /// points resolves to the next point and a time after the last point to the
    /// last index.
    #[must_use]
    pub fn time_to_index(&self, time: &B::Item, find_nearest: bool) -> Option<TimePointIndex> {
        let last = self.points.last()?;
        let key = self.behavior.key(time);
        if key.is_nan() {
            return None;
        }
        if key > self.behavior.key(&last.time) {
            return find_nearest.then(|| self.points.len() as TimePointIndex - 1);
        }
        let index = self
            .points
            .partition_point(|point| self.behavior.key(&point.time) < key);
        if key < self.behavior.key(&self.points[index].time) {
            return find_nearest.then_some(index as TimePointIndex);
        }
        Some(index as TimePointIndex)
    }

    #[must_use]
    pub fn index_to_time_scale_point(
        &self,
        index: TimePointIndex,
    ) -> Option<&TimeScalePoint<B::Item>> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.points.get(index))
    }

    #[must_use]
    pub fn index_to_time(&self, index: TimePointIndex) -> Option<&B::Item> {
        self.index_to_time_scale_point(index).map(|point| &point.time)
    }

    #[must_use]
    pub fn logical_range_for_time_range(
        &self,
        from: &B::Item,
        to: &B::Item,
    ) -> Option<LogicalRange> {
        let from = self.time_to_index(from, true)?;
        let to = self.time_to_index(to, true)?;
        Interval::new(from as f64, to as f64).ok()
    }

    /// Starts a linear transition of the right offset toward `offset`.
    pub fn scroll_to_offset_animated(
        &mut self,
        offset: f64,
        duration_ms: f64,
        now: f64,
    ) -> ChartResult<()> {
        if !offset.is_finite() {
            return Err(ChartError::InvalidData(
                "animation target offset must be finite".to_owned(),
            ));
        }
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Err(ChartError::InvalidData(
                "animation duration must be finite and > 0".to_owned(),
            ));
        }
        debug!(from = self.right_offset, to = offset, duration_ms, "scroll to offset");
        self.animation = Some(TimeScaleAnimation::Linear(OffsetTransition {
            from: self.right_offset,
            to: offset,
            start_time: now,
            duration: duration_ms,
        }));
        Ok(())
    }

    pub fn scroll_to_realtime(&mut self, now: f64) -> ChartResult<()> {
        self.scroll_to_offset_animated(self.options.right_offset, DEFAULT_SCROLL_ANIMATION_MS, now)
    }

    #[must_use]
    pub fn animation(&self) -> Option<&TimeScaleAnimation> {
        self.animation.as_ref()
    }

    pub fn stop_animation(&mut self) {
        self.animation = None;
    }

    /// Applies the running animation at `now`. Returns `true` while it is still active.
    pub fn advance_animation(&mut self, now: f64) -> bool {
        let Some(animation) = &self.animation else {
            return false;
        };
        let finished = animation.finished(now);
        let position = animation.position(now);
        if position.is_finite() {
            self.track(|scale| scale.apply_right_offset(position));
        }
        if finished {
            trace!(now, "time scale animation finished");
            self.animation = None;
        }
        !finished
    }

    /// Begins sampling the right offset for a momentum scroll.
    ///
    /// Pixel-based tuning is converted to bars with the current bar spacing.
    pub fn start_kinetic_tracking(&mut self, config: KineticScrollConfig, now: f64) {
        self.stop_animation();
        let bar_spacing = self.bar_spacing;
        let mut kinetic = KineticAnimation::new(
            config.min_speed / bar_spacing,
            config.max_speed / bar_spacing,
            config.damping,
            config.min_move / bar_spacing,
        );
        kinetic.add_position(self.right_offset, now);
        self.kinetic_tracker = Some(kinetic);
    }

    pub fn record_kinetic_sample(&mut self, now: f64) {
        if let Some(kinetic) = &mut self.kinetic_tracker {
            kinetic.add_position(self.right_offset, now);
        }
    }

    /// Ends sampling and starts the momentum animation when the release was fast enough.
    pub fn release_kinetic(&mut self, now: f64) -> bool {
        let Some(mut kinetic) = self.kinetic_tracker.take() else {
            return false;
        };
        if !kinetic.start(self.right_offset, now) {
            return false;
        }
        debug!(speed = kinetic.speed(), duration = kinetic.duration(), "kinetic scroll");
        self.animation = Some(TimeScaleAnimation::Kinetic(kinetic));
        true
    }

    pub fn take_changes(&mut self) -> SmallVec<[TimeScaleChange; 4]> {
        std::mem::take(&mut self.changes)
    }

    fn track<R>(&mut self, mutate: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.transition_state();
        let result = mutate(self);
        if self.bar_spacing != before.bar_spacing {
            self.time_marks_cache = None;
            self.push_change(TimeScaleChange::BarSpacingChanged);
        }
        if self.right_offset != before.right_offset {
            self.push_change(TimeScaleChange::RightOffsetChanged);
        }
        result
    }

    fn push_change(&mut self, change: TimeScaleChange) {
        if !self.changes.contains(&change) {
            self.changes.push(change);
        }
    }

    fn transition_state(&self) -> TransitionState {
        TransitionState {
            bar_spacing: self.bar_spacing,
            right_offset: self.right_offset,
        }
    }

    fn apply_right_offset(&mut self, offset: f64) {
        self.right_offset = offset;
        self.visible_range_invalidated = true;
        self.correct_offset();
    }

    fn apply_bar_spacing(&mut self, new_bar_spacing: f64) {
        let old_bar_spacing = self.bar_spacing;
        self.bar_spacing = new_bar_spacing;
        self.correct_bar_spacing();

        if self.options.right_offset_pixels.is_some() && old_bar_spacing > 0.0 {
            self.right_offset = self.right_offset * old_bar_spacing / self.bar_spacing;
        }
        if old_bar_spacing != self.bar_spacing {
            self.visible_range_invalidated = true;
        }
    }

    fn set_visible_range_impl(&mut self, left: f64, right: f64, apply_default_offset: bool) {
        let length = right - left + 1.0;
        if self.width <= 0.0 || !length.is_finite() || length <= 0.0 {
            warn!(left, right, width = self.width, "ignoring visible range");
            return;
        }
        let pixel_offset = if apply_default_offset {
            self.options.right_offset_pixels.unwrap_or(0.0)
        } else {
            0.0
        };
        self.apply_bar_spacing((self.width - pixel_offset) / length);
        self.right_offset = right - self.base_index() as f64;
        if apply_default_offset {
            self.right_offset = if pixel_offset != 0.0 {
                pixel_offset / self.bar_spacing
            } else {
                self.options.right_offset
            };
        }
        self.correct_offset();
        self.visible_range_invalidated = true;
    }

    fn update_visible_range(&mut self) {
        if !self.visible_range_invalidated {
            return;
        }
        self.visible_range_invalidated = false;

        let new_range = if self.is_empty() {
            None
        } else {
            let bars_length = self.width / self.bar_spacing;
            let right_border = self.right_offset + self.base_index() as f64;
            let left_border = right_border - bars_length + 1.0;
            match visible_range_from_borders(left_border, right_border) {
                Ok(range) => Some(range),
                Err(err) => {
                    warn!(error = %err, "degenerate visible range");
                    None
                }
            }
        };

        let old_range = self.visible_range;
        self.visible_range = new_range;
        trace!(?new_range, "rebuilt visible range");
        if old_range.map(|range| range.strict) != new_range.map(|range| range.strict) {
            self.push_change(TimeScaleChange::VisibleBarsChanged);
        }
        if old_range.map(|range| range.logical) != new_range.map(|range| range.logical) {
            self.push_change(TimeScaleChange::LogicalRangeChanged);
        }
        self.time_marks_cache = None;
    }

    fn build_time_marks(&mut self, visible_bars: StrictRange) -> Vec<TimeMark> {
        let (Some(first_index), Some(last_index)) = (self.first_index(), self.last_index()) else {
            return Vec::new();
        };
        let spacing = self.bar_spacing;
        let pixels_per_8_characters = (self.options.font_size + 4.0) * 5.0;
        let max_character_length = self
            .options
            .tick_mark_max_character_length
            .unwrap_or(DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH);
        let max_label_width = (pixels_per_8_characters
            / DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH as f64
            * max_character_length as f64)
            .round();
        let index_per_label = (max_label_width / spacing).round() as TimePointIndex;

        // Earliest index that could carry the second label, and latest for the second to last.
        let earliest_index_of_second_label = first_index + index_per_label;
        let index_of_second_last_label = last_index - index_per_label;

        let all_interaction_disabled = !self.options.handle_scroll && !self.options.handle_scale;
        let left_edge_fixed = self.options.fix_left_edge || all_interaction_disabled;
        let right_edge_fixed = self.options.fix_right_edge || all_interaction_disabled;

        let items = self.tick_marks.build(spacing, max_label_width).to_vec();
        let mut marks = Vec::with_capacity(items.len());
        for mark in items
            .into_iter()
            .filter(|mark| visible_bars.contains(mark.index))
        {
            let need_align_coordinate =
                if !all_interaction_disabled && spacing > max_label_width / 2.0 {
                    false
                } else {
                    (left_edge_fixed && mark.index <= earliest_index_of_second_label)
                        || (right_edge_fixed && mark.index >= index_of_second_last_label)
                };
            marks.push(TimeMark {
                index: mark.index,
                coordinate: self.index_to_coordinate(mark.index),
                label: self.format_label(mark),
                weight: mark.weight,
                need_align_coordinate,
            });
        }
        trace!(count = marks.len(), max_label_width, "rebuilt time marks");
        marks
    }

    fn format_label(&mut self, mark: TickMark) -> String {
        let Some(point) = usize::try_from(mark.index)
            .ok()
            .and_then(|index| self.points.get(index))
        else {
            return String::new();
        };
        let key = (self.behavior.cache_key(&point.time), mark.weight);
        if let Some(label) = self.formatted_labels.get(&key) {
            return label.clone();
        }
        let label = self.behavior.format_tickmark(&point.time, mark.weight);
        self.formatted_labels.insert(key, label.clone());
        label
    }

    fn correct_bar_spacing(&mut self) {
        let min = self.min_bar_spacing();
        let mut clamped = self.bar_spacing.max(min);
        // No upper bound until the width is known.
        if self.width > 0.0 || self.options.max_bar_spacing > 0.0 {
            clamped = clamped.min(self.max_bar_spacing().max(min));
        }
        if clamped != self.bar_spacing {
            self.bar_spacing = clamped;
            self.visible_range_invalidated = true;
        }
    }

    fn min_bar_spacing(&self) -> f64 {
        if self.options.fix_left_edge && self.options.fix_right_edge && !self.points.is_empty() {
            return self
                .options
                .min_bar_spacing
                .max(self.width / self.points.len() as f64);
        }
        self.options.min_bar_spacing
    }

    fn max_bar_spacing(&self) -> f64 {
        if self.options.max_bar_spacing > 0.0 {
            self.options.max_bar_spacing
        } else {
            self.width * 0.5
        }
    }

    fn min_right_offset(&self) -> Option<f64> {
        let first = self.first_index()?;
        let base = self.base_index_or_null?;
        let bars_estimation = if self.options.fix_left_edge {
            self.width / self.bar_spacing
        } else {
            MIN_VISIBLE_BARS_COUNT.min(self.points.len() as f64)
        };
        Some(first as f64 - base as f64 - 1.0 + bars_estimation)
    }

    fn max_right_offset(&self) -> f64 {
        if self.options.fix_right_edge {
            0.0
        } else {
            self.width / self.bar_spacing - MIN_VISIBLE_BARS_COUNT.min(self.points.len() as f64)
        }
    }

    fn correct_offset(&mut self) {
        if let Some(min_right_offset) = self.min_right_offset()
            && self.right_offset < min_right_offset
        {
            self.right_offset = min_right_offset;
            self.visible_range_invalidated = true;
        }
        let max_right_offset = self.max_right_offset();
        if self.right_offset > max_right_offset {
            self.right_offset = max_right_offset;
            self.visible_range_invalidated = true;
        }
    }

    fn do_fix_left_edge(&mut self) {
        if !self.options.fix_left_edge {
            return;
        }
        let Some(first) = self.first_index() else {
            return;
        };
        let Some(visible) = self.visible_strict_range() else {
            return;
        };
        let delta = visible.left() - first;
        if delta < 0 {
            let left_edge_offset = self.right_offset - delta as f64 - 1.0;
            self.apply_right_offset(left_edge_offset);
        }
        self.correct_bar_spacing();
    }

    fn do_fix_right_edge(&mut self) {
        self.correct_offset();
        self.correct_bar_spacing();
    }
}

fn visible_range_from_borders(left: f64, right: f64) -> ChartResult<VisibleRange> {
    let logical = Interval::new(left, right)?;
    let strict = Interval::new(
        left.floor() as TimePointIndex,
        right.ceil() as TimePointIndex,
    )?;
    Ok(VisibleRange { logical, strict })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{TimeScale, TimeScaleChange, TimeScaleOptions, TimeScalePoint};
    use crate::model::UtcTimeBehavior;

    fn scale_with_points(width: f64, count: usize, bar_spacing: f64) -> TimeScale {
        let mut time_scale =
            TimeScale::new(TimeScaleOptions::default(), UtcTimeBehavior::default());
        time_scale.set_width(width).expect("width");
        time_scale
            .update_points(
                (0..count)
                    .map(|i| TimeScalePoint::new(i as f64 * 60.0))
                    .collect(),
                0,
            )
            .expect("points");
        time_scale.set_base_index(Some(count as i64 - 1));
        time_scale.set_bar_spacing(bar_spacing).expect("spacing");
        time_scale.set_right_offset(0.0).expect("offset");
        time_scale
    }

    #[test]
    fn index_coordinate_and_coordinate_index_match_lightweight_formula() {
        let time_scale = scale_with_points(1000.0, 200, 6.0);
        let x = time_scale.index_to_coordinate(199);
        assert_abs_diff_eq!(x, 1000.0 - 0.5 * 6.0 - 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(time_scale.coordinate_to_float_index(x), 198.5, epsilon = 1e-9);
    }

    #[test]
    fn zoom_preserves_anchor_when_right_bar_does_not_stay() {
        let mut time_scale = scale_with_points(800.0, 100, 5.0);
        let anchor = 400.0;
        let before = time_scale.coordinate_to_float_index(anchor);
        time_scale.zoom(anchor, 0.5);
        let after = time_scale.coordinate_to_float_index(anchor);
        assert_abs_diff_eq!(before, after, epsilon = 1e-6);
        assert_abs_diff_eq!(time_scale.bar_spacing(), 5.25, epsilon = 1e-12);
    }

    #[test]
    fn offset_correction_is_idempotent() {
        let mut time_scale = scale_with_points(600.0, 100, 6.0);
        time_scale.right_offset = 10_000.0;
        time_scale.correct_offset();
        let once = time_scale.right_offset;
        time_scale.correct_offset();
        assert_eq!(time_scale.right_offset, once);
        assert_abs_diff_eq!(once, 600.0 / 6.0 - 2.0, epsilon = 1e-12);

        time_scale.right_offset = -10_000.0;
        time_scale.correct_offset();
        assert_abs_diff_eq!(time_scale.right_offset, -99.0 - 1.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn sub_bar_pan_changes_logical_but_not_strict_range() {
        let mut time_scale = scale_with_points(600.0, 100, 6.0);
        time_scale.set_right_offset(0.2).expect("offset");
        let _ = time_scale.visible_strict_range();
        let _ = time_scale.take_changes();

        time_scale.set_right_offset(0.4).expect("offset");
        let _ = time_scale.visible_logical_range();
        let changes = time_scale.take_changes();
        assert!(changes.contains(&TimeScaleChange::LogicalRangeChanged));
        assert!(changes.contains(&TimeScaleChange::RightOffsetChanged));
        assert!(!changes.contains(&TimeScaleChange::VisibleBarsChanged));
    }

    #[test]
    fn gesture_moves_without_start_are_ignored() {
        let mut time_scale = scale_with_points(600.0, 100, 6.0);
        time_scale.scroll_to(100.0);
        time_scale.scale_to(100.0);
        assert_eq!(time_scale.right_offset(), 0.0);
        assert_eq!(time_scale.bar_spacing(), 6.0);

        time_scale.start_scale(300.0);
        time_scale.scroll_to(100.0);
        assert_eq!(time_scale.right_offset(), 0.0);
    }

    #[test]
    fn scale_gesture_starting_during_scroll_ends_scroll() {
        let mut time_scale = scale_with_points(600.0, 100, 6.0);
        time_scale.start_scroll(300.0);
        time_scale.start_scale(300.0);
        time_scale.scale_to(150.0);
        assert_abs_diff_eq!(time_scale.bar_spacing(), 6.0 * 450.0 / 300.0, epsilon = 1e-12);
    }
}
