use approx::assert_abs_diff_eq;
use chart_scales::model::{
    TimeScale, TimeScaleOptions, TimeScalePoint, TimedValue, UtcTimeBehavior,
};

fn scale(width: f64, count: usize, bar_spacing: f64) -> TimeScale {
    let options = TimeScaleOptions {
        bar_spacing,
        ..TimeScaleOptions::default()
    };
    let mut time_scale = TimeScale::new(options, UtcTimeBehavior::default());
    time_scale.set_width(width).expect("width");
    time_scale
        .update_points(
            (0..count).map(|i| TimeScalePoint::new(i as f64)).collect(),
            0,
        )
        .expect("points");
    time_scale.set_base_index(Some(count as i64 - 1));
    time_scale
}

#[test]
fn half_bar_coordinate_survives_index_round_trip() {
    let time_scale = scale(500.0, 500, 1.0);
    assert_eq!(time_scale.right_offset(), 0.0);
    assert_eq!(time_scale.base_index(), 499);

    let index = time_scale.coordinate_to_index(499.5);
    assert_eq!(index, 500);
    assert_abs_diff_eq!(time_scale.index_to_coordinate(index), 499.5, epsilon = 1e-12);
}

#[test]
fn index_one_projects_to_half_pixel_and_batch_converter_agrees() {
    let time_scale = scale(500.0, 500, 1.0);
    assert_abs_diff_eq!(time_scale.index_to_coordinate(1), 0.5, epsilon = 1e-12);

    let mut values = [TimedValue { time: 1, x: 0.0 }];
    time_scale.indexes_to_coordinates(&mut values, None);
    assert_abs_diff_eq!(values[0].x, 0.5, epsilon = 1e-12);
}

#[test]
fn batch_converter_only_touches_requested_range() {
    let time_scale = scale(500.0, 500, 1.0);
    let mut values = (0..6)
        .map(|time| TimedValue { time, x: -1.0 })
        .collect::<Vec<_>>();
    time_scale.indexes_to_coordinates(&mut values, Some(2..4));

    assert_eq!(values[0].x, -1.0);
    assert_eq!(values[1].x, -1.0);
    assert_abs_diff_eq!(values[2].x, time_scale.index_to_coordinate(2), epsilon = 1e-12);
    assert_abs_diff_eq!(values[3].x, time_scale.index_to_coordinate(3), epsilon = 1e-12);
    assert_eq!(values[4].x, -1.0);

    // Out-of-bounds ranges are clamped to the slice.
    time_scale.indexes_to_coordinates(&mut values, Some(5..100));
    assert_abs_diff_eq!(values[5].x, time_scale.index_to_coordinate(5), epsilon = 1e-12);
}

#[test]
fn float_index_is_rounded_to_six_decimals() {
    let time_scale = scale(1000.0, 300, 3.0);
    let x = 1000.0 - 1.0 - 1.0 / 3.0;
    let index = time_scale.coordinate_to_float_index(x);
    assert_eq!(index, ((299.0 - 1.0 / 9.0) * 1_000_000.0_f64).round() / 1_000_000.0);
}

#[test]
fn empty_scale_projects_to_zero() {
    let mut time_scale = TimeScale::new(TimeScaleOptions::default(), UtcTimeBehavior::default());
    assert_eq!(time_scale.index_to_coordinate(42), 0.0);
    time_scale.set_width(800.0).expect("width");
    assert_eq!(time_scale.index_to_coordinate(42), 0.0);
    assert!(time_scale.visible_logical_range().is_none());
    assert!(time_scale.marks().is_none());
}

#[test]
fn right_offset_for_coordinate_counts_bars_from_the_right_edge() {
    let time_scale = scale(600.0, 100, 6.0);
    assert_abs_diff_eq!(time_scale.right_offset_for_coordinate(599.0), 0.0);
    assert_abs_diff_eq!(time_scale.right_offset_for_coordinate(539.0), 10.0);
}

#[test]
fn visible_range_follows_borders() {
    let mut time_scale = scale(600.0, 1000, 6.0);
    time_scale.set_right_offset(5.0).expect("offset");

    let logical = time_scale.visible_logical_range().expect("logical");
    assert_abs_diff_eq!(logical.right(), 999.0 + 5.0);
    assert_abs_diff_eq!(logical.left(), 999.0 + 5.0 - 100.0 + 1.0);

    let strict = time_scale.visible_strict_range().expect("strict");
    assert_eq!((strict.left(), strict.right()), (905, 1004));
}
