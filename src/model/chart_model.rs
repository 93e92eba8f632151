use tracing::{debug, trace};

use crate::core::TimePointIndex;
use crate::error::{ChartError, ChartResult};

use super::pane::{Pane, PaneId};
use super::price_scale::PriceScaleOptions;
use super::time_scale::{TimeScale, TimeScaleOptions};
use super::{HorzScaleBehavior, TimeScalePoint, UtcTimeBehavior};

/// Shared time scale plus the panes stacked along it.
#[derive(Debug)]
pub struct ChartModel<B: HorzScaleBehavior = UtcTimeBehavior> {
    width: f64,
    time_scale: TimeScale<B>,
    panes: Vec<Pane>,
    next_pane_id: u32,
}

impl<B: HorzScaleBehavior + Default> Default for ChartModel<B> {
    fn default() -> Self {
        Self::new(TimeScaleOptions::default(), B::default())
    }
}

impl<B: HorzScaleBehavior> ChartModel<B> {
    /// Starts with a single pane whose scales use default options.
    #[must_use]
    pub fn new(options: TimeScaleOptions, behavior: B) -> Self {
        Self {
            width: 0.0,
            time_scale: TimeScale::new(options, behavior),
            panes: vec![default_pane(PaneId::new(0))],
            next_pane_id: 1,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_width(&mut self, width: f64) -> ChartResult<()> {
        if !width.is_finite() || width <= 0.0 {
            return Err(ChartError::InvalidData(
                "chart model width must be finite and > 0".to_owned(),
            ));
        }
        self.width = width;
        self.time_scale.set_width(width)?;
        self.recalculate_all_panes();
        Ok(())
    }

    #[must_use]
    pub fn time_scale(&self) -> &TimeScale<B> {
        &self.time_scale
    }

    pub fn time_scale_mut(&mut self) -> &mut TimeScale<B> {
        &mut self.time_scale
    }

    #[must_use]
    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn panes_mut(&mut self) -> &mut [Pane] {
        &mut self.panes
    }

    #[must_use]
    pub fn pane(&self, pane_id: PaneId) -> Option<&Pane> {
        self.panes.iter().find(|pane| pane.id() == pane_id)
    }

    pub fn pane_mut(&mut self, pane_id: PaneId) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|pane| pane.id() == pane_id)
    }

    pub fn add_pane(&mut self) -> PaneId {
        let id = PaneId::new(self.next_pane_id);
        self.next_pane_id += 1;
        self.panes.push(default_pane(id));
        debug!(pane = id.raw(), "added pane");
        id
    }

    /// Removes a pane; the last remaining pane cannot be removed.
    pub fn remove_pane(&mut self, pane_id: PaneId) -> ChartResult<Pane> {
        if self.panes.len() <= 1 {
            return Err(ChartError::InvalidData(
                "chart model must keep at least one pane".to_owned(),
            ));
        }
        let position = self
            .panes
            .iter()
            .position(|pane| pane.id() == pane_id)
            .ok_or_else(|| ChartError::InvalidData(format!("unknown pane {}", pane_id.raw())))?;
        Ok(self.panes.remove(position))
    }

    /// Rebuilds the time points, moves the base index to the last point and
    /// refreshes every price scale.
    pub fn update_points(
        &mut self,
        points: Vec<TimeScalePoint<B::Item>>,
        first_changed_index: usize,
    ) -> ChartResult<()> {
        let last_index = points.len().checked_sub(1).map(|last| last as TimePointIndex);
        self.time_scale.update_points(points, first_changed_index)?;
        self.time_scale.set_base_index(last_index);
        self.recalculate_all_panes();
        Ok(())
    }

    /// Feeds the strict visible range of the time scale to every price scale.
    pub fn recalculate_all_panes(&mut self) {
        let Some(visible_bars) = self.time_scale.visible_strict_range() else {
            trace!("no visible bars, skipping price scale recalculation");
            return;
        };
        for pane in &mut self.panes {
            pane.recalculate_price_scales(visible_bars);
        }
    }

    /// Advances the time scale animation; panes follow the new visible range.
    pub fn advance_animation(&mut self, now: f64) -> bool {
        let had_animation = self.time_scale.animation().is_some();
        let running = self.time_scale.advance_animation(now);
        if had_animation {
            self.recalculate_all_panes();
        }
        running
    }
}

fn default_pane(id: PaneId) -> Pane {
    Pane::new(id, PriceScaleOptions::default(), PriceScaleOptions::default())
}

#[cfg(test)]
mod tests {
    use super::ChartModel;
    use crate::model::pane::PaneId;

    #[test]
    fn starts_with_one_pane_that_cannot_be_removed() {
        let mut model: ChartModel = ChartModel::default();
        assert_eq!(model.panes().len(), 1);
        assert!(model.remove_pane(PaneId::new(0)).is_err());

        let extra = model.add_pane();
        assert_eq!(extra, PaneId::new(1));
        assert!(model.remove_pane(extra).is_ok());
        assert!(model.pane(extra).is_none());
    }

    #[test]
    fn rejects_non_finite_width() {
        let mut model: ChartModel = ChartModel::default();
        assert!(model.set_width(f64::NAN).is_err());
        assert!(model.set_width(800.0).is_ok());
        assert_eq!(model.time_scale().width(), 800.0);
    }
}
