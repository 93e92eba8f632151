mod chart_model;
mod horz_scale_behavior;
mod pane;
mod price_scale;
mod price_tick_marks;
mod source;
mod time_scale;
mod time_tick_marks;

pub use chart_model::ChartModel;
pub use horz_scale_behavior::{HorzScaleBehavior, TickMarkWeight, TimeScalePoint, UtcTimeBehavior};
pub use pane::{Pane, PaneId, PriceScaleId};
pub use price_scale::{
    PriceScale, PriceScaleMargins, PriceScaleMode, PriceScaleOptions, PriceScaleOptionsPatch,
    PriceScaleState, PriceScaleStateChange, tick_base_for_min_move,
};
pub use price_tick_marks::{
    PriceMark, PriceMarkSettings, PriceProjection, PriceTickMarkBuilder, tick_mark_height,
};
pub use source::{
    AutoscaleInfo, AutoscaleMargins, FirstValue, PriceScaleSource, SeriesBar, SeriesSource,
    SourceId,
};
pub use time_scale::{
    TimeMark, TimeScale, TimeScaleChange, TimeScaleOptions, TimeScaleOptionsPatch, TimedValue,
};
pub use time_tick_marks::{TickMark, TickMarks};
