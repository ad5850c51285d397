use super::*;

#[test]
fn endpoints_are_stable() {
    assert_eq!(ease_out(0.0), 0.0);
    assert_eq!(ease_out(1.0), 1.0);
    assert_eq!(spring(0.0), 0.0);
    assert_eq!(spring(1.0), 1.0);
    for ease in [Ease::Linear, Ease::EaseOut, Ease::Spring] {
        assert_eq!(ease.apply(0.0), 0.0);
        assert_eq!(ease.apply(1.0), 1.0);
    }
}

#[test]
fn ease_out_is_monotonic() {
    let mut prev = ease_out(0.0);
    for i in 1..=1000 {
        let v = ease_out(f64::from(i) / 1000.0);
        assert!(v >= prev, "ease_out decreased at step {i}");
        assert!((0.0..=1.0).contains(&v));
        prev = v;
    }
}

#[test]
fn spring_overshoots_then_settles() {
    let peak = (1..100)
        .map(|i| spring(f64::from(i) / 100.0))
        .fold(f64::MIN, f64::max);
    assert!(peak > 1.0);
    assert!((spring(0.99) - 1.0).abs() < 0.01);
}

#[test]
fn apply_clamps_input() {
    assert_eq!(Ease::EaseOut.apply(-3.0), 0.0);
    assert_eq!(Ease::Linear.apply(7.0), 1.0);
}

#[test]
fn keyframes_interpolate_piecewise() {
    let keys = [1.0, 1.3, 1.0];
    assert_eq!(interpolate_array(&keys, 0.0), 1.0);
    assert!((interpolate_array(&keys, 0.5) - 1.3).abs() < 1e-12);
    assert!((interpolate_array(&keys, 0.25) - 1.15).abs() < 1e-12);
    assert!((interpolate_array(&keys, 1.0) - 1.0).abs() < 1e-12);
    assert_eq!(interpolate_array(&[], 0.5), 0.0);
    assert_eq!(interpolate_array(&[4.0], 0.5), 4.0);
}

#[test]
fn keyframes_extrapolate_past_one_on_last_segment() {
    // Spring overshoot feeds t > 1 into keyframe arrays.
    let v = interpolate_array(&[0.0, 10.0], 1.1);
    assert!((v - 11.0).abs() < 1e-9);
}
