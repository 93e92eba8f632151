use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

const MAX_SAMPLES: usize = 4;
const MAX_START_DELAY_MS: f64 = 50.0;
const EPSILON_DISTANCE: f64 = 1.0;

/// Tuning for momentum scrolling after a drag release.
///
/// Speeds are pixels per millisecond, `min_move` is pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KineticScrollConfig {
    /// Release velocity below this does not start an animation.
    pub min_speed: f64,
    /// Each sampled velocity is clamped to this magnitude.
    pub max_speed: f64,
    /// Per-millisecond velocity retention, in `(0, 1)`.
    pub damping: f64,
    /// Samples closer than this to the previous one are ignored.
    pub min_move: f64,
}

impl Default for KineticScrollConfig {
    fn default() -> Self {
        Self {
            min_speed: 0.2,
            max_speed: 7.0,
            damping: 0.997,
            min_move: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PositionSample {
    position: f64,
    time: f64,
}

/// Exponentially decaying scroll fitted to the last few drag samples.
#[derive(Debug, Clone, PartialEq)]
pub struct KineticAnimation {
    // Newest first.
    samples: SmallVec<[PositionSample; MAX_SAMPLES]>,
    start: Option<PositionSample>,
    speed: f64,
    duration: f64,
    min_speed: f64,
    max_speed: f64,
    damping: f64,
    min_move: f64,
}

impl KineticAnimation {
    #[must_use]
    pub fn new(min_speed: f64, max_speed: f64, damping: f64, min_move: f64) -> Self {
        Self {
            samples: SmallVec::new(),
            start: None,
            speed: 0.0,
            duration: 0.0,
            min_speed,
            max_speed,
            damping,
            min_move,
        }
    }

    #[must_use]
    pub fn from_config(config: KineticScrollConfig) -> Self {
        Self::new(
            config.min_speed,
            config.max_speed,
            config.damping,
            config.min_move,
        )
    }

    pub fn add_position(&mut self, position: f64, time: f64) {
        if let Some(latest) = self.samples.first_mut() {
            if latest.time == time {
                latest.position = position;
                return;
            }
            if (latest.position - position).abs() < self.min_move {
                return;
            }
        }
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop();
        }
        self.samples.insert(0, PositionSample { position, time });
    }

    /// Fits a release velocity and starts the decay from `position`.
    ///
    /// Returns `false` when the gesture went cold, has too few samples or is
    /// slower than `min_speed`.
    pub fn start(&mut self, position: f64, time: f64) -> bool {
        if self.samples.len() < 2 {
            return false;
        }
        if time - self.samples[0].time > MAX_START_DELAY_MS {
            return false;
        }

        let first_speed = self.speed_between(self.samples[0], self.samples[1]);
        let mut speeds: SmallVec<[(f64, f64); 3]> = SmallVec::new();
        for pair in self.samples.windows(2) {
            let speed = self.speed_between(pair[0], pair[1]);
            if sign(speed) != sign(first_speed) {
                break;
            }
            speeds.push((speed, (pair[0].position - pair[1].position).abs()));
        }

        let total_distance: f64 = speeds.iter().map(|(_, distance)| distance).sum();
        if total_distance == 0.0 {
            return false;
        }
        let speed: f64 = speeds
            .iter()
            .map(|(speed, distance)| distance / total_distance * speed)
            .sum();
        if speed.abs() < self.min_speed {
            return false;
        }

        self.start = Some(PositionSample { position, time });
        self.speed = speed;
        self.duration = decay_duration(speed.abs(), self.damping);
        true
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn position(&self, time: f64) -> f64 {
        let Some(start) = self.start else {
            return self.samples.first().map_or(0.0, |sample| sample.position);
        };
        let progress = (self.damping.powf(time - start.time) - 1.0) / self.damping.ln();
        start.position + self.speed * progress
    }

    #[must_use]
    pub fn finished(&self, time: f64) -> bool {
        self.start
            .is_none_or(|start| time - start.time >= self.duration)
    }

    fn speed_between(&self, newer: PositionSample, older: PositionSample) -> f64 {
        let elapsed = newer.time - older.time;
        if elapsed == 0.0 {
            return 0.0;
        }
        let speed = (newer.position - older.position) / elapsed;
        if speed.abs() > self.max_speed {
            self.max_speed * sign(speed)
        } else {
            speed
        }
    }
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn decay_duration(speed: f64, damping: f64) -> f64 {
    let ln_damping = damping.ln();
    (EPSILON_DISTANCE * ln_damping / -speed).ln() / ln_damping
}
