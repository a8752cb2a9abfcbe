use sessalign_core::align::{CropRegion, SearchAxis, SearchSpace};
use sessalign_core::pipeline::config::AlignConfig;
use sessalign_core::pipeline::PipelineStage;
use sessalign_core::repair::BlockDetectionConfig;

#[test]
fn test_default_config_is_valid() {
    let config = AlignConfig::default();
    config.validate().unwrap();
    assert_eq!(config.mean_frame_count, 100);
    assert!(!config.interpolate_on_export);
    assert!(config.export_repair().is_none());
}

#[test]
fn test_toml_round_trip() {
    let config = AlignConfig {
        reference_session: Some("day1.ser".into()),
        interpolate_on_export: true,
        crop: CropRegion::new(10, 12),
        ..AlignConfig::default()
    };
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: AlignConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
    assert_eq!(parsed.export_repair(), Some(BlockDetectionConfig::default()));
}

#[test]
fn test_partial_toml_uses_defaults() {
    let text = r#"
mean_frame_count = 20

[search.rotation]
enabled = true
min = -1.0
max = 1.0
step = 0.25
"#;
    let config: AlignConfig = toml::from_str(text).unwrap();
    assert_eq!(config.mean_frame_count, 20);
    assert_eq!(config.search.rotation.point_count(), 9);
    assert_eq!(config.search.shift_x, SearchSpace::default().shift_x);
    assert_eq!(config.crop, CropRegion::default());
}

#[test]
fn test_json_field_names() {
    let value = serde_json::to_value(AlignConfig::default()).unwrap();
    assert_eq!(value["mean_frame_count"], 100);
    assert_eq!(value["reference_session"], serde_json::Value::Null);
    assert_eq!(value["search"]["shift_x"]["enabled"], true);
    assert_eq!(value["search"]["rotation"]["enabled"], false);
    assert_eq!(value["crop"]["margin_x"], 32);
    assert_eq!(value["blocked_rows"]["window"], 3);
}

#[test]
fn test_validation_catches_bad_values() {
    let mut config = AlignConfig {
        mean_frame_count: 0,
        ..AlignConfig::default()
    };
    assert!(config.validate().is_err());

    config.mean_frame_count = 10;
    config.search.shift_y = SearchAxis::new(-1.0, 1.0, -0.5);
    assert!(config.validate().is_err());

    config.search = SearchSpace::default();
    config.blocked_rows = BlockDetectionConfig::new(-1.0, 2);
    assert!(config.validate().is_err());
}

#[test]
fn test_display_strings() {
    assert_eq!(SearchAxis::new(-2.0, 2.0, 1.0).to_string(), "-2 to 2 step 1 (5 points)");
    assert_eq!(SearchAxis::disabled(-2.0, 2.0, 1.0).to_string(), "fixed");
    assert_eq!(
        BlockDetectionConfig::new(100.0, 3).to_string(),
        "threshold 100, window \u{b1}3"
    );
    assert_eq!(PipelineStage::Writing.to_string(), "Writing output");
}
