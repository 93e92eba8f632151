use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::StrictRange;
use crate::error::{ChartError, ChartResult};

use super::price_scale::{PriceScale, PriceScaleOptions};
use super::source::{PriceScaleSource, SourceId};

const LEFT_SCALE_ID: &str = "left";
const RIGHT_SCALE_ID: &str = "right";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(u32);

impl PaneId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Price scale a source is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceScaleId {
    Left,
    Right,
    Overlay(String),
}

impl fmt::Display for PriceScaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str(LEFT_SCALE_ID),
            Self::Right => f.write_str(RIGHT_SCALE_ID),
            Self::Overlay(id) => write!(f, "overlay:{id}"),
        }
    }
}

/// Left and right price scales plus overlay scales created on demand.
///
/// Overlay scales are dropped again once their last source leaves.
#[derive(Debug)]
pub struct Pane {
    id: PaneId,
    height: f64,
    left_price_scale: PriceScale,
    right_price_scale: PriceScale,
    overlay_price_scales: IndexMap<String, PriceScale>,
    overlay_options: PriceScaleOptions,
    source_scales: IndexMap<SourceId, PriceScaleId>,
}

impl Pane {
    #[must_use]
    pub fn new(
        id: PaneId,
        left_options: PriceScaleOptions,
        right_options: PriceScaleOptions,
    ) -> Self {
        Self {
            id,
            height: 0.0,
            left_price_scale: PriceScale::new(LEFT_SCALE_ID, left_options),
            right_price_scale: PriceScale::new(RIGHT_SCALE_ID, right_options),
            overlay_price_scales: IndexMap::new(),
            overlay_options: PriceScaleOptions::default(),
            source_scales: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PaneId {
        self.id
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_height(&mut self, height: f64) {
        self.height = height;
        self.left_price_scale.set_height(height);
        self.right_price_scale.set_height(height);
        for scale in self.overlay_price_scales.values_mut() {
            scale.set_height(height);
        }
    }

    /// Options used for overlay scales created by [`Pane::add_source`].
    pub fn set_overlay_options(&mut self, options: PriceScaleOptions) {
        self.overlay_options = options;
    }

    #[must_use]
    pub fn left_price_scale(&self) -> &PriceScale {
        &self.left_price_scale
    }

    pub fn left_price_scale_mut(&mut self) -> &mut PriceScale {
        &mut self.left_price_scale
    }

    #[must_use]
    pub fn right_price_scale(&self) -> &PriceScale {
        &self.right_price_scale
    }

    pub fn right_price_scale_mut(&mut self) -> &mut PriceScale {
        &mut self.right_price_scale
    }

    #[must_use]
    pub fn price_scale(&self, id: &PriceScaleId) -> Option<&PriceScale> {
        match id {
            PriceScaleId::Left => Some(&self.left_price_scale),
            PriceScaleId::Right => Some(&self.right_price_scale),
            PriceScaleId::Overlay(id) => self.overlay_price_scales.get(id),
        }
    }

    pub fn price_scale_mut(&mut self, id: &PriceScaleId) -> Option<&mut PriceScale> {
        match id {
            PriceScaleId::Left => Some(&mut self.left_price_scale),
            PriceScaleId::Right => Some(&mut self.right_price_scale),
            PriceScaleId::Overlay(id) => self.overlay_price_scales.get_mut(id),
        }
    }

    pub fn overlay_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.overlay_price_scales.keys().map(String::as_str)
    }

    #[must_use]
    pub fn source_price_scale(&self, source: SourceId) -> Option<&PriceScaleId> {
        self.source_scales.get(&source)
    }

    /// Attaches `source` to `target`, detaching it from its previous scale.
    ///
    /// Nothing changes when the target scale rejects the source.
    pub fn add_source(
        &mut self,
        source_id: SourceId,
        target: PriceScaleId,
        source: Box<dyn PriceScaleSource>,
    ) -> ChartResult<()> {
        let created_overlay = match &target {
            PriceScaleId::Overlay(id) if !self.overlay_price_scales.contains_key(id) => {
                let mut scale = PriceScale::new(id.clone(), self.overlay_options);
                scale.set_height(self.height);
                self.overlay_price_scales.insert(id.clone(), scale);
                true
            }
            _ => false,
        };

        let added = self
            .price_scale_mut(&target)
            .ok_or_else(|| ChartError::InvalidData(format!("missing price scale {target}")))
            .and_then(|scale| scale.add_source(source_id, source));
        if let Err(err) = added {
            if created_overlay && let PriceScaleId::Overlay(id) = &target {
                self.overlay_price_scales.shift_remove(id);
            }
            return Err(err);
        }

        if let Some(previous) = self.source_scales.insert(source_id, target.clone())
            && previous != target
        {
            self.detach_from_scale(&previous, source_id);
        }
        Ok(())
    }

    pub fn remove_source(&mut self, source_id: SourceId) -> ChartResult<Box<dyn PriceScaleSource>> {
        let scale_id = self
            .source_scales
            .shift_remove(&source_id)
            .ok_or(ChartError::UnknownSource(source_id))?;
        self.detach_from_scale(&scale_id, source_id)
            .ok_or(ChartError::UnknownSource(source_id))
    }

    /// Deregisters `source_id` and registers it again on `target`.
    pub fn move_source(&mut self, source_id: SourceId, target: PriceScaleId) -> ChartResult<()> {
        let Some(current) = self.source_scales.get(&source_id) else {
            return Err(ChartError::UnknownSource(source_id));
        };
        if *current == target {
            return Ok(());
        }
        debug!(
            pane = self.id.raw(),
            source = source_id.raw(),
            from = %current,
            to = %target,
            "moving source"
        );
        let source = self.remove_source(source_id)?;
        self.add_source(source_id, target, source)
    }

    /// Feeds the visible bars to every price scale of the pane.
    pub fn recalculate_price_scales(&mut self, visible_bars: StrictRange) {
        self.left_price_scale.recalculate_price_range(visible_bars);
        self.right_price_scale.recalculate_price_range(visible_bars);
        for scale in self.overlay_price_scales.values_mut() {
            scale.recalculate_price_range(visible_bars);
        }
    }

    fn detach_from_scale(
        &mut self,
        scale_id: &PriceScaleId,
        source_id: SourceId,
    ) -> Option<Box<dyn PriceScaleSource>> {
        let scale = self.price_scale_mut(scale_id)?;
        let source = scale.remove_source(source_id).ok()?;
        let vacated = scale.source_count() == 0;
        if vacated && let PriceScaleId::Overlay(id) = scale_id {
            self.overlay_price_scales.shift_remove(id);
        }
        Some(source)
    }
}
