use super::KineticAnimation;

/// Linear right-offset transition used by smooth scroll-to-offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetTransition {
    pub from: f64,
    pub to: f64,
    pub start_time: f64,
    pub duration: f64,
}

impl OffsetTransition {
    #[must_use]
    pub fn finished(self, now: f64) -> bool {
        if self.duration <= 0.0 {
            return true;
        }
        (now - self.start_time) / self.duration >= 1.0
    }

    #[must_use]
    pub fn position(self, now: f64) -> f64 {
        if self.finished(now) {
            return self.to;
        }
        let progress = ((now - self.start_time) / self.duration).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * progress
    }
}

/// Animation driving the time scale right offset, advanced by the host's frame loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeScaleAnimation {
    Linear(OffsetTransition),
    Kinetic(KineticAnimation),
}

impl TimeScaleAnimation {
    #[must_use]
    pub fn position(&self, now: f64) -> f64 {
        match self {
            Self::Linear(transition) => transition.position(now),
            Self::Kinetic(kinetic) => kinetic.position(now),
        }
    }

    #[must_use]
    pub fn finished(&self, now: f64) -> bool {
        match self {
            Self::Linear(transition) => transition.finished(now),
            Self::Kinetic(kinetic) => kinetic.finished(now),
        }
    }
}
