use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Calendar significance of a time point relative to its predecessor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum TickMarkWeight {
    #[default]
    LessThanSecond = 0,
    Second = 10,
    Minute1 = 20,
    Minute5 = 21,
    Minute30 = 22,
    Hour1 = 30,
    Hour3 = 31,
    Hour6 = 32,
    Hour12 = 33,
    Day = 50,
    Month = 60,
    Year = 70,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeScalePoint<T> {
    pub time: T,
    pub original_time: Option<T>,
    pub weight: TickMarkWeight,
}

impl<T> TimeScalePoint<T> {
    #[must_use]
    pub fn new(time: T) -> Self {
        Self {
            time,
            original_time: None,
            weight: TickMarkWeight::LessThanSecond,
        }
    }
}

/// Horizontal item semantics plugged into the time scale.
pub trait HorzScaleBehavior: fmt::Debug {
    type Item: Clone + fmt::Debug;

    /// Ordering key; time points must be sorted ascending by it.
    fn key(&self, item: &Self::Item) -> f64;

    /// Stable key for caching formatted labels.
    fn cache_key(&self, item: &Self::Item) -> i64;

    fn format_tickmark(&self, item: &Self::Item, weight: TickMarkWeight) -> String;

    /// Assigns weights to `points[start_index..]`, comparing each point to its predecessor.
    fn fill_weights_for_points(
        &self,
        points: &mut [TimeScalePoint<Self::Item>],
        start_index: usize,
    );
}

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

// Coarsest first.
const INTRADAY_WEIGHTS: [(i64, TickMarkWeight); 8] = [
    (12 * MS_PER_HOUR, TickMarkWeight::Hour12),
    (6 * MS_PER_HOUR, TickMarkWeight::Hour6),
    (3 * MS_PER_HOUR, TickMarkWeight::Hour3),
    (MS_PER_HOUR, TickMarkWeight::Hour1),
    (30 * MS_PER_MINUTE, TickMarkWeight::Minute30),
    (5 * MS_PER_MINUTE, TickMarkWeight::Minute5),
    (MS_PER_MINUTE, TickMarkWeight::Minute1),
    (MS_PER_SECOND, TickMarkWeight::Second),
];

/// UNIX-seconds time axis with calendar weights evaluated in a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcTimeBehavior {
    offset: FixedOffset,
}

impl Default for UtcTimeBehavior {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl UtcTimeBehavior {
    #[must_use]
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn local_millis(&self, seconds: f64) -> i64 {
        (seconds * 1_000.0).round() as i64
            + i64::from(self.offset.local_minus_utc()) * MS_PER_SECOND
    }

    fn local_date_time(&self, seconds: f64) -> Option<DateTime<FixedOffset>> {
        DateTime::<Utc>::from_timestamp_millis((seconds * 1_000.0).round() as i64)
            .map(|time| time.with_timezone(&self.offset))
    }

    fn weight_between(&self, previous: f64, current: f64) -> TickMarkWeight {
        let (Some(prev), Some(cur)) =
            (self.local_date_time(previous), self.local_date_time(current))
        else {
            return TickMarkWeight::LessThanSecond;
        };
        if prev.year() != cur.year() {
            return TickMarkWeight::Year;
        }
        if prev.month() != cur.month() {
            return TickMarkWeight::Month;
        }
        if prev.day() != cur.day() {
            return TickMarkWeight::Day;
        }

        let prev_ms = self.local_millis(previous);
        let cur_ms = self.local_millis(current);
        INTRADAY_WEIGHTS
            .iter()
            .find(|(divisor, _)| prev_ms.div_euclid(*divisor) != cur_ms.div_euclid(*divisor))
            .map_or(TickMarkWeight::LessThanSecond, |(_, weight)| *weight)
    }
}

impl HorzScaleBehavior for UtcTimeBehavior {
    type Item = f64;

    fn key(&self, item: &f64) -> f64 {
        *item
    }

    fn cache_key(&self, item: &f64) -> i64 {
        (item * 1_000.0).round() as i64
    }

    fn format_tickmark(&self, item: &f64, weight: TickMarkWeight) -> String {
        let Some(time) = self.local_date_time(*item) else {
            return String::new();
        };
        let pattern = match weight {
            TickMarkWeight::Year => "%Y",
            TickMarkWeight::Month => "%b",
            TickMarkWeight::Day => "%-d",
            TickMarkWeight::Minute1
            | TickMarkWeight::Minute5
            | TickMarkWeight::Minute30
            | TickMarkWeight::Hour1
            | TickMarkWeight::Hour3
            | TickMarkWeight::Hour6
            | TickMarkWeight::Hour12 => "%H:%M",
            TickMarkWeight::Second | TickMarkWeight::LessThanSecond => "%H:%M:%S",
        };
        time.format(pattern).to_string()
    }

    fn fill_weights_for_points(&self, points: &mut [TimeScalePoint<f64>], start_index: usize) {
        let start_index = start_index.min(points.len());
        let mut previous = start_index
            .checked_sub(1)
            .and_then(|index| points.get(index))
            .map(|point| point.time);

        for point in &mut points[start_index..] {
            point.weight = previous.map_or(TickMarkWeight::LessThanSecond, |prev| {
                self.weight_between(prev, point.time)
            });
            previous = Some(point.time);
        }

        // The first point has no predecessor; estimate one from the average step.
        if start_index == 0 && points.len() > 1 {
            let first = points[0].time;
            let total = points[points.len() - 1].time - first;
            let approx_step = (total / (points.len() - 1) as f64).ceil();
            points[0].weight = self.weight_between(first - approx_step, first);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::{HorzScaleBehavior, TickMarkWeight, TimeScalePoint, UtcTimeBehavior};

    const DAY: f64 = 86_400.0;
    // 2024-01-01T00:00:00Z
    const JAN_1_2024: f64 = 1_704_067_200.0;

    fn points(times: &[f64]) -> Vec<TimeScalePoint<f64>> {
        times.iter().copied().map(TimeScalePoint::new).collect()
    }

    #[test]
    fn weights_follow_calendar_boundaries() {
        let behavior = UtcTimeBehavior::default();
        let mut pts = points(&[
            JAN_1_2024 - DAY,
            JAN_1_2024,
            JAN_1_2024 + 3_600.0,
            JAN_1_2024 + 3_900.0,
            JAN_1_2024 + 3_960.0,
            JAN_1_2024 + DAY,
            JAN_1_2024 + 31.0 * DAY,
        ]);
        behavior.fill_weights_for_points(&mut pts, 0);
        let weights = pts.iter().map(|p| p.weight).collect::<Vec<_>>();
        assert_eq!(
            &weights[1..],
            &[
                TickMarkWeight::Year,
                TickMarkWeight::Hour1,
                TickMarkWeight::Minute5,
                TickMarkWeight::Minute1,
                TickMarkWeight::Day,
                TickMarkWeight::Month,
            ]
        );
    }

    #[test]
    fn incremental_fill_uses_existing_predecessor() {
        let behavior = UtcTimeBehavior::default();
        let mut pts = points(&[JAN_1_2024, JAN_1_2024 + 43_200.0]);
        pts[0].weight = TickMarkWeight::Year;
        behavior.fill_weights_for_points(&mut pts, 1);
        assert_eq!(pts[0].weight, TickMarkWeight::Year);
        assert_eq!(pts[1].weight, TickMarkWeight::Hour12);
    }

    #[test]
    fn formats_by_weight_in_configured_offset() {
        let utc = UtcTimeBehavior::default();
        assert_eq!(utc.format_tickmark(&JAN_1_2024, TickMarkWeight::Year), "2024");
        assert_eq!(utc.format_tickmark(&JAN_1_2024, TickMarkWeight::Month), "Jan");
        assert_eq!(
            utc.format_tickmark(&(JAN_1_2024 + 3_661.0), TickMarkWeight::Second),
            "01:01:01"
        );

        let plus_two = UtcTimeBehavior::new(FixedOffset::east_opt(2 * 3_600).expect("offset"));
        assert_eq!(
            plus_two.format_tickmark(&JAN_1_2024, TickMarkWeight::Hour1),
            "02:00"
        );
    }
}
