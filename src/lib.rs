//! chart-scales: coordinate and scale engine for financial charts.
//!
//! The crate maintains the mapping between data coordinates (a logical time
//! index, a price value) and pixel coordinates, together with the autoscale,
//! tick-mark and kinetic-scroll algorithms that depend on it. Painting and
//! input decoding live outside; they feed pixel deltas in and read
//! coordinates and marks out.

pub mod core;
pub mod error;
pub mod interaction;
pub mod model;
pub mod telemetry;

pub use error::{ChartError, ChartResult};
pub use model::{ChartModel, PriceScale, TimeScale};
