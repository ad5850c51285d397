use super::*;

#[test]
fn hex_colors_parse() {
    assert_eq!(Rgba8::parse_css("#FFFFFF").unwrap(), Rgba8::WHITE);
    assert_eq!(Rgba8::parse_css("#000").unwrap(), Rgba8::BLACK);
    assert_eq!(
        Rgba8::parse_css("#00000080").unwrap(),
        Rgba8 {
            r: 0,
            g: 0,
            b: 0,
            a: 0x80
        }
    );
    assert_eq!(Rgba8::parse_css("#ff0").unwrap(), Rgba8::rgb(255, 255, 0));
}

#[test]
fn functional_colors_parse() {
    assert_eq!(
        Rgba8::parse_css("rgba(0,0,0,0.5)").unwrap(),
        Rgba8 {
            r: 0,
            g: 0,
            b: 0,
            a: 128
        }
    );
    assert_eq!(
        Rgba8::parse_css("rgb(10, 20, 30)").unwrap(),
        Rgba8::rgb(10, 20, 30)
    );
}

#[test]
fn malformed_colors_are_rejected() {
    assert!(Rgba8::parse_css("#12345").is_err());
    assert!(Rgba8::parse_css("red").is_err());
    assert!(Rgba8::parse_css("rgba(1,2)").is_err());
    assert_eq!(Rgba8::parse_or("nope", Rgba8::WHITE), Rgba8::WHITE);
}

#[test]
fn alpha_multiplication_clamps() {
    assert_eq!(Rgba8::WHITE.with_alpha_mul(0.5).a, 128);
    assert_eq!(Rgba8::WHITE.with_alpha_mul(2.0).a, 255);
    assert_eq!(Rgba8::WHITE.with_alpha_mul(-1.0).a, 0);
}

#[test]
fn contain_letterboxes_wide_sources() {
    let r = fit_rect(1920, 1080, 1080, 1080, FitMode::Contain);
    assert_eq!(r.x0, 0.0);
    assert!((r.width() - 1080.0).abs() < 1e-9);
    assert!((r.height() - 607.5).abs() < 1e-9);
    assert!((r.y0 - 236.25).abs() < 1e-9);
}

#[test]
fn cover_crops_wide_sources() {
    let r = fit_rect(1920, 1080, 1080, 1080, FitMode::Cover);
    assert_eq!(r.y0, 0.0);
    assert!((r.height() - 1080.0).abs() < 1e-9);
    assert!((r.width() - 1920.0).abs() < 1e-9);
    assert!((r.x0 + 420.0).abs() < 1e-9);
}

#[test]
fn matching_aspect_fills_canvas() {
    for fit in [FitMode::Contain, FitMode::Cover] {
        let r = fit_rect(640, 360, 1280, 720, fit);
        assert!(r.x0.abs() < 1e-6 && r.y0.abs() < 1e-6);
        assert!((r.width() - 1280.0).abs() < 1e-6);
        assert!((r.height() - 720.0).abs() < 1e-6);
    }
}

#[test]
fn even_rounding() {
    assert_eq!(round_down_even(361), 360);
    assert_eq!(round_down_even(360), 360);
    assert_eq!(round_down_even(1), 0);
}
