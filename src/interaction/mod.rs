mod animation;
mod kinetic;

pub use animation::{OffsetTransition, TimeScaleAnimation};
pub use kinetic::{KineticAnimation, KineticScrollConfig};
