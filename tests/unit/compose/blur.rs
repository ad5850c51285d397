use super::*;

#[test]
fn zero_sigma_is_identity() {
    let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
    assert_eq!(blur_premul(&src, 1, 2, 0.0).unwrap(), src);
    assert_eq!(radius_for_sigma(f64::NAN), 0);
}

#[test]
fn constant_layer_is_unchanged() {
    let (w, h) = (6u32, 4u32);
    let src = [10u8, 20, 30, 40].repeat((w * h) as usize);
    assert_eq!(blur_premul(&src, w, h, 1.5).unwrap(), src);
}

#[test]
fn single_pixel_spreads_and_conserves_alpha() {
    let (w, h) = (9u32, 9u32);
    let mut src = vec![0u8; (w * h * 4) as usize];
    let center = ((4 * w + 4) * 4) as usize;
    src[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);

    let out = blur_premul(&src, w, h, 1.0).unwrap();
    let lit = out.chunks_exact(4).filter(|px| px[3] != 0).count();
    assert!(lit > 1);
    let sum: i32 = out.chunks_exact(4).map(|px| i32::from(px[3])).sum();
    assert!((sum - 255).abs() <= 16, "alpha sum {sum}");
}

#[test]
fn size_mismatch_is_rejected() {
    assert!(blur_premul(&[0u8; 7], 1, 2, 1.0).is_err());
}

#[test]
fn radius_covers_three_sigma() {
    assert_eq!(radius_for_sigma(2.0), 6);
    assert_eq!(radius_for_sigma(0.4), 2);
}
