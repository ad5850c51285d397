use super::*;

#[test]
fn defaults_match_editor_defaults() {
    let s = SubtitleStyle::default();
    assert_eq!(s.font_name, "Arial");
    assert_eq!(s.font_size, 24.0);
    assert_eq!(s.margin_v, 100.0);
    assert_eq!(s.highlight_gap, 16.0);
    assert_eq!(s.position, Position::Bottom);
    assert_eq!(s.display_mode, DisplayMode::Standard);
    assert_eq!(s.effect, "none");
}

#[test]
fn partial_json_fills_defaults() {
    let s: SubtitleStyle = serde_json::from_str(
        r#"{"fontName":"Inter","marginV":40,"displayMode":"single-word","position":"top"}"#,
    )
    .unwrap();
    assert_eq!(s.font_name, "Inter");
    assert_eq!(s.margin_v, 40.0);
    assert_eq!(s.display_mode, DisplayMode::SingleWord);
    assert_eq!(s.position, Position::Top);
    assert_eq!(s.outline_width, 2.0);
}

#[test]
fn block_is_an_alias_for_standard() {
    let s: SubtitleStyle = serde_json::from_str(r#"{"displayMode":"block"}"#).unwrap();
    assert_eq!(s.display_mode, DisplayMode::Standard);
}

#[test]
fn override_merges_over_base() {
    let ov: StyleOverride =
        serde_json::from_str(r##"{"primaryColor":"#FF0000","fontSize":30}"##).unwrap();
    let merged = SubtitleStyle::default().merged(&ov).unwrap();
    assert_eq!(merged.primary(), Rgba8::rgb(255, 0, 0));
    assert_eq!(merged.font_size, 30.0);
    assert_eq!(merged.font_name, "Arial");
}

#[test]
fn bad_override_is_a_validation_error() {
    let ov: StyleOverride = serde_json::from_str(r#"{"fontSize":"huge"}"#).unwrap();
    let err = SubtitleStyle::default().merged(&ov).unwrap_err();
    assert!(matches!(err, RenderError::Validation(_)));
}

#[test]
fn weights_parse() {
    let mut s = SubtitleStyle::default();
    assert_eq!(s.weight(), 400);
    s.font_weight = "bold".into();
    assert_eq!(s.weight(), 700);
    s.font_weight = "600".into();
    assert_eq!(s.weight(), 600);
    s.font_weight = "heavy-ish".into();
    assert_eq!(s.weight(), 400);
}

#[test]
fn pixel_font_size_scales_with_height() {
    let s = SubtitleStyle::default();
    assert!((s.pixel_font_size(1080) - 60.0).abs() < 1e-9);
    assert!((s.pixel_font_size(540) - 30.0).abs() < 1e-9);
}
