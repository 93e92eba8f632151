use std::collections::BTreeMap;

use crate::core::TimePointIndex;

use super::{TickMarkWeight, TimeScalePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMark {
    pub index: TimePointIndex,
    pub weight: TickMarkWeight,
}

#[derive(Debug, Clone, PartialEq)]
struct CachedMarks {
    max_indexes_per_mark: i64,
    marks: Vec<TickMark>,
}

/// Candidate time labels bucketed by weight.
///
/// `build` keeps heavier marks first and only admits a lighter mark when it
/// stays at least `ceil(max_width / spacing)` indexes away from its accepted
/// neighbours.
#[derive(Debug, Clone, Default)]
pub struct TickMarks {
    marks_by_weight: BTreeMap<TickMarkWeight, Vec<TickMark>>,
    cache: Option<CachedMarks>,
    uniform_distribution: bool,
}

impl TickMarks {
    #[must_use]
    pub fn new(uniform_distribution: bool) -> Self {
        Self {
            uniform_distribution,
            ..Self::default()
        }
    }

    pub fn set_uniform_distribution(&mut self, value: bool) {
        if self.uniform_distribution != value {
            self.uniform_distribution = value;
            self.cache = None;
        }
    }

    pub fn set_time_scale_points<T>(
        &mut self,
        points: &[TimeScalePoint<T>],
        first_changed_index: usize,
    ) {
        if first_changed_index == 0 {
            self.marks_by_weight.clear();
        } else {
            let since = first_changed_index as TimePointIndex;
            self.marks_by_weight.retain(|_, marks| {
                let keep = marks.partition_point(|mark| mark.index < since);
                marks.truncate(keep);
                !marks.is_empty()
            });
        }
        self.cache = None;

        for (index, point) in points.iter().enumerate().skip(first_changed_index) {
            self.marks_by_weight
                .entry(point.weight)
                .or_default()
                .push(TickMark {
                    index: index as TimePointIndex,
                    weight: point.weight,
                });
        }
    }

    pub fn build(&mut self, spacing: f64, max_width: f64) -> &[TickMark] {
        let max_indexes_per_mark = (max_width / spacing).ceil() as i64;
        let stale = self
            .cache
            .as_ref()
            .is_none_or(|cache| cache.max_indexes_per_mark != max_indexes_per_mark);
        if stale {
            let marks = self.build_marks(max_indexes_per_mark);
            self.cache = Some(CachedMarks {
                max_indexes_per_mark,
                marks,
            });
        }
        match &self.cache {
            Some(cache) => &cache.marks,
            None => &[],
        }
    }

    fn build_marks(&self, max_indexes_per_mark: i64) -> Vec<TickMark> {
        let mut marks: Vec<TickMark> = Vec::new();

        for current_weight in self.marks_by_weight.values().rev() {
            let previous = std::mem::take(&mut marks);
            let mut previous_iter = previous.iter().copied().peekable();
            let mut left_index: Option<TimePointIndex> = None;
            let mut right_index: Option<TimePointIndex> = None;

            for mark in current_weight {
                while let Some(&accepted) = previous_iter.peek() {
                    if accepted.index < mark.index {
                        marks.push(accepted);
                        previous_iter.next();
                        left_index = Some(accepted.index);
                        right_index = None;
                    } else {
                        right_index = Some(accepted.index);
                        break;
                    }
                }

                let fits_right =
                    right_index.is_none_or(|right| right - mark.index >= max_indexes_per_mark);
                let fits_left =
                    left_index.is_none_or(|left| mark.index - left >= max_indexes_per_mark);
                if fits_right && fits_left {
                    marks.push(*mark);
                    left_index = Some(mark.index);
                } else if self.uniform_distribution {
                    return previous;
                }
            }

            marks.extend(previous_iter);
        }

        marks
    }
}
