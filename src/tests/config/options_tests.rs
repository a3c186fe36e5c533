//! Tests for StreamOptions.

use crate::config::{DEFAULT_HIGH_WATER_MARK, StreamOptions};

#[test]
fn defaults_match_documented_values() {
    let opts = StreamOptions::default();
    assert_eq!(opts.name, None);
    assert_eq!(opts.high_water_mark, DEFAULT_HIGH_WATER_MARK);
    assert_eq!(opts.high_water_mark, 16);
    assert!(opts.half_open);
    assert_eq!(opts, StreamOptions::new());
}

#[test]
fn builder_methods_set_fields() {
    let opts = StreamOptions::new()
        .with_name("upload")
        .with_high_water_mark(4)
        .with_half_open(false);

    assert_eq!(opts.name.as_deref(), Some("upload"));
    assert_eq!(opts.high_water_mark, 4);
    assert!(!opts.half_open);
}

#[test]
fn zero_high_water_mark_is_clamped() {
    let opts = StreamOptions::new().with_high_water_mark(0);
    assert_eq!(opts.capacity(), 1);
}

#[test]
fn label_falls_back_to_kind() {
    assert_eq!(StreamOptions::new().label("readable"), "readable");
    assert_eq!(StreamOptions::new().with_name("src").label("readable"), "src");
}

#[test]
fn partial_json_keeps_defaults() {
    let opts: StreamOptions = serde_json::from_str(r#"{"high_water_mark": 2}"#).unwrap();
    assert_eq!(opts.high_water_mark, 2);
    assert!(opts.half_open);
    assert_eq!(opts.name, None);
}
