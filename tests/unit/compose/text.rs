use super::*;

fn spec(size: f64) -> FontSpec {
    FontSpec {
        family: "Arial".into(),
        weight: 400,
        size_px: size,
    }
}

#[test]
fn empty_book_estimates_widths() {
    let mut book = FontBook::new();
    assert_eq!(book.face_count(), 0);
    let w = book.measure("abcd", &spec(20.0));
    assert!((w - 4.0 * 20.0 * FALLBACK_ADVANCE_EM).abs() < 1e-9);
    assert!(book.shape("abcd", &spec(20.0), Rgba8::WHITE).is_none());
}

#[test]
fn empty_text_has_no_shape() {
    let mut book = FontBook::system();
    assert!(book.shape("", &spec(20.0), Rgba8::WHITE).is_none());
    assert!(book.shape("x", &spec(0.0), Rgba8::WHITE).is_none());
}

#[test]
fn system_fonts_shape_wider_text_wider() {
    let mut book = FontBook::system();
    if book.face_count() == 0 {
        eprintln!("no system fonts installed, skipping");
        return;
    }
    let short = book.measure("ab", &spec(40.0));
    let long = book.measure("abababab", &spec(40.0));
    assert!(short > 0.0);
    assert!(long > short * 2.0);
}

#[test]
fn brush_converts_from_color() {
    let b = TextBrushRgba8::from(Rgba8 {
        r: 1,
        g: 2,
        b: 3,
        a: 4,
    });
    assert_eq!((b.r, b.g, b.b, b.a), (1, 2, 3, 4));
}
