use approx::assert_abs_diff_eq;
use chart_scales::core::transforms::{from_log, to_log};
use chart_scales::core::{LogFormula, PriceRange, StrictRange};
use chart_scales::model::{
    PriceScale, PriceScaleMargins, PriceScaleMode, PriceScaleOptions, PriceScaleState,
    PriceScaleStateChange, SeriesBar, SeriesSource, SourceId,
};

fn manual_scale(options: PriceScaleOptions) -> PriceScale {
    let mut price_scale = PriceScale::new("right", options);
    price_scale.set_height(101.0);
    price_scale
}

fn no_margins() -> PriceScaleOptions {
    PriceScaleOptions {
        auto_scale: false,
        scale_margins: PriceScaleMargins {
            top: 0.0,
            bottom: 0.0,
        },
        ..PriceScaleOptions::default()
    }
}

fn mode_change(mode: PriceScaleMode) -> PriceScaleStateChange {
    PriceScaleStateChange {
        mode: Some(mode),
        ..PriceScaleStateChange::default()
    }
}

fn bar(index: i64, low: f64, high: f64, close: f64) -> SeriesBar {
    SeriesBar {
        index,
        low,
        high,
        close,
    }
}

#[test]
fn entering_and_leaving_log_mode_converts_the_range() {
    let mut price_scale = manual_scale(no_margins());
    price_scale.set_price_range(Some(PriceRange::new(1.0, 100.0)));

    price_scale.set_mode(mode_change(PriceScaleMode::Logarithmic));
    let formula = LogFormula::default();
    let log_range = price_scale.price_range().expect("log range");
    assert_abs_diff_eq!(log_range.min(), to_log(1.0, formula), epsilon = 1e-12);
    assert_abs_diff_eq!(log_range.max(), to_log(100.0, formula), epsilon = 1e-12);

    price_scale.set_mode(mode_change(PriceScaleMode::Normal));
    let raw = price_scale.price_range().expect("raw range");
    assert_abs_diff_eq!(raw.min(), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(raw.max(), 100.0, epsilon = 1e-9);
    assert!(!price_scale.is_auto_scale());
}

#[test]
fn unconvertible_log_range_turns_autoscale_on() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::Logarithmic,
        ..no_margins()
    };
    let mut price_scale = manual_scale(options);
    price_scale.set_price_range(Some(PriceRange::new(400.0, 500.0)));

    price_scale.set_mode(mode_change(PriceScaleMode::Normal));
    assert!(price_scale.is_auto_scale());
    assert!(!price_scale.is_log());
}

#[test]
fn relative_modes_force_autoscale_and_record_the_change() {
    let mut price_scale = manual_scale(no_margins());
    let _ = price_scale.take_mode_changes();

    price_scale.set_mode(mode_change(PriceScaleMode::Percentage));
    assert!(price_scale.is_auto_scale());
    assert!(price_scale.is_percentage());

    let changes = price_scale.take_mode_changes();
    assert_eq!(
        changes.as_slice(),
        &[(
            PriceScaleState {
                auto_scale: false,
                is_inverted: false,
                mode: PriceScaleMode::Normal,
            },
            PriceScaleState {
                auto_scale: true,
                is_inverted: false,
                mode: PriceScaleMode::Percentage,
            },
        )]
    );
    assert!(price_scale.take_mode_changes().is_empty());

    price_scale.set_mode(mode_change(PriceScaleMode::IndexedTo100));
    assert!(price_scale.is_indexed_to_100());
    assert_eq!(price_scale.take_mode_changes().len(), 1);
}

#[test]
fn unchanged_mode_records_nothing() {
    let mut price_scale = manual_scale(no_margins());
    price_scale.set_mode(PriceScaleStateChange {
        auto_scale: Some(false),
        ..PriceScaleStateChange::default()
    });
    assert!(price_scale.take_mode_changes().is_empty());
}

#[test]
fn inversion_flips_coordinates() {
    let mut price_scale = manual_scale(no_margins());
    price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));
    assert_abs_diff_eq!(price_scale.price_to_coordinate(100.0, 0.0), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(price_scale.price_to_coordinate(0.0, 0.0), 100.0, epsilon = 1e-9);

    price_scale.set_mode(PriceScaleStateChange {
        is_inverted: Some(true),
        ..PriceScaleStateChange::default()
    });
    assert!(price_scale.is_inverted());
    assert_abs_diff_eq!(price_scale.price_to_coordinate(100.0, 0.0), 100.0, epsilon = 1e-9);
    assert_abs_diff_eq!(price_scale.price_to_coordinate(0.0, 0.0), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(price_scale.coordinate_to_price(25.0, 0.0), 25.0, epsilon = 1e-9);
}

#[test]
fn percentage_autoscale_is_relative_to_first_visible_close() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::Percentage,
        ..PriceScaleOptions::default()
    };
    let mut price_scale = PriceScale::new("right", options);
    price_scale.set_height(300.0);
    let source = SeriesSource::new(vec![
        bar(0, 90.0, 110.0, 100.0),
        bar(1, 95.0, 120.0, 105.0),
    ])
    .expect("source");
    price_scale
        .add_source(SourceId::new(1), Box::new(source))
        .expect("add");
    price_scale.recalculate_price_range(StrictRange::new(0, 1).expect("bars"));

    let range = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(range.min(), -10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(range.max(), 20.0, epsilon = 1e-9);

    let first = price_scale.first_value().expect("first value");
    assert_eq!(first.index, 0);
    assert_eq!(price_scale.format_price(110.0, first.value), "10.00%");

    let y = price_scale.price_to_coordinate(110.0, first.value);
    assert_abs_diff_eq!(price_scale.coordinate_to_price(y, first.value), 110.0, epsilon = 1e-6);
}

#[test]
fn indexed_to_100_maps_first_value_to_one_hundred() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::IndexedTo100,
        ..PriceScaleOptions::default()
    };
    let mut price_scale = PriceScale::new("right", options);
    price_scale.set_height(300.0);
    let source = SeriesSource::new(vec![bar(0, 40.0, 60.0, 50.0), bar(1, 45.0, 75.0, 70.0)])
        .expect("source");
    price_scale
        .add_source(SourceId::new(1), Box::new(source))
        .expect("add");
    price_scale.recalculate_price_range(StrictRange::new(0, 1).expect("bars"));

    let range = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(range.min(), 80.0, epsilon = 1e-9);
    assert_abs_diff_eq!(range.max(), 150.0, epsilon = 1e-9);
    assert_abs_diff_eq!(price_scale.price_to_logical(50.0, 50.0), 100.0);
    assert_abs_diff_eq!(price_scale.logical_to_price(150.0, 50.0), 75.0, epsilon = 1e-9);
}

#[test]
fn log_autoscale_widens_formula_for_sub_unit_ranges() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::Logarithmic,
        ..PriceScaleOptions::default()
    };
    let mut price_scale = PriceScale::new("right", options);
    price_scale.set_height(300.0);
    let source = SeriesSource::new(vec![bar(0, 0.001, 0.005, 0.003)])
        .expect("source")
        .with_min_move(0.0001)
        .expect("min move");
    price_scale
        .add_source(SourceId::new(1), Box::new(source))
        .expect("add");
    price_scale.recalculate_price_range(StrictRange::new(0, 0).expect("bars"));

    let range = price_scale.price_range().expect("range");
    let formula = price_scale.log_formula();
    assert_abs_diff_eq!(formula.logical_offset, 7.0);
    assert_abs_diff_eq!(formula.coord_offset, 1e-7, epsilon = 1e-18);
    assert_abs_diff_eq!(from_log(range.min(), formula), 0.001, epsilon = 1e-12);
    assert_abs_diff_eq!(from_log(range.max(), formula), 0.005, epsilon = 1e-12);

    let y = price_scale.price_to_coordinate(0.002, 0.0);
    assert_abs_diff_eq!(price_scale.coordinate_to_price(y, 0.0), 0.002, epsilon = 1e-12);
}

#[test]
fn scale_gesture_disables_autoscale_and_zooms_around_center() {
    let options = PriceScaleOptions {
        auto_scale: true,
        ..no_margins()
    };
    let mut price_scale = manual_scale(options);
    price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));

    price_scale.start_scale(50.0);
    price_scale.scale_to(50.0);
    assert!(!price_scale.is_auto_scale());
    let unchanged = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(unchanged.length(), 100.0, epsilon = 1e-9);

    price_scale.scale_to(0.0);
    let zoomed = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(zoomed.length(), 100.0 * 71.0 / 121.0, epsilon = 1e-9);
    assert_abs_diff_eq!((zoomed.min() + zoomed.max()) / 2.0, 50.0, epsilon = 1e-9);
    price_scale.end_scale();

    price_scale.scale_to(80.0);
    let after_end = price_scale.price_range().expect("range");
    assert_eq!(after_end, zoomed);
}

#[test]
fn scale_gesture_follows_log_formula_change_during_autoscale() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::Logarithmic,
        auto_scale: true,
        ..no_margins()
    };
    let mut price_scale = manual_scale(options);
    let tiny = SeriesSource::new(vec![bar(0, 0.001, 0.005, 0.003)])
        .expect("source")
        .with_min_move(0.0001)
        .expect("min move");
    price_scale
        .add_source(SourceId::new(1), Box::new(tiny))
        .expect("add");
    let visible_bars = StrictRange::new(0, 0).expect("bars");
    price_scale.recalculate_price_range(visible_bars);
    let snapshot = price_scale.price_range().expect("range");
    let old_formula = price_scale.log_formula();
    assert_abs_diff_eq!(old_formula.logical_offset, 7.0);

    price_scale.start_scale(50.0);
    let large = SeriesSource::new(vec![bar(0, 10.0, 50_000.0, 30.0)])
        .expect("source")
        .with_min_move(0.0001)
        .expect("min move");
    price_scale
        .add_source(SourceId::new(1), Box::new(large))
        .expect("replace");
    price_scale.recalculate_price_range(visible_bars);
    let _ = price_scale.price_range();
    let new_formula = price_scale.log_formula();
    assert_eq!(new_formula, LogFormula::default());

    price_scale.scale_to(0.0);
    let zoomed = price_scale.price_range().expect("range");
    assert!(zoomed.min().is_finite() && zoomed.max().is_finite());

    let mut expected = PriceRange::new(
        to_log(from_log(snapshot.min(), old_formula), new_formula),
        to_log(from_log(snapshot.max(), old_formula), new_formula),
    );
    expected.scale_around_center(71.0 / 121.0);
    assert_abs_diff_eq!(zoomed.min(), expected.min(), epsilon = 1e-9);
    assert_abs_diff_eq!(zoomed.max(), expected.max(), epsilon = 1e-9);
    let coordinate = price_scale.price_to_coordinate(0.003, 0.0);
    assert_abs_diff_eq!(
        price_scale.coordinate_to_price(coordinate, 0.0),
        0.003,
        epsilon = 1e-9
    );
}

#[test]
fn scroll_gesture_needs_manual_scale_and_shifts_by_pixels() {
    let mut price_scale = manual_scale(PriceScaleOptions {
        auto_scale: true,
        ..no_margins()
    });
    price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));
    price_scale.start_scroll(10.0);
    price_scale.scroll_to(60.0);
    assert_eq!(price_scale.price_range(), Some(PriceRange::new(0.0, 100.0)));

    let mut price_scale = manual_scale(no_margins());
    price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));
    price_scale.start_scroll(10.0);
    price_scale.scroll_to(60.0);
    let shifted = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(shifted.min(), 50.0, epsilon = 1e-9);
    assert_abs_diff_eq!(shifted.max(), 150.0, epsilon = 1e-9);

    price_scale.scroll_to(10.0);
    let back = price_scale.price_range().expect("range");
    assert_abs_diff_eq!(back.min(), 0.0, epsilon = 1e-9);
    price_scale.end_scroll();
}

#[test]
fn relative_modes_ignore_scale_gestures() {
    let options = PriceScaleOptions {
        mode: PriceScaleMode::Percentage,
        ..no_margins()
    };
    let mut price_scale = manual_scale(options);
    price_scale.set_price_range(Some(PriceRange::new(-10.0, 10.0)));
    price_scale.start_scale(50.0);
    price_scale.scale_to(0.0);
    assert!(price_scale.is_auto_scale());
    assert_eq!(price_scale.price_range(), Some(PriceRange::new(-10.0, 10.0)));
}
