//! Separable gaussian blur over premultiplied RGBA8 layers.

use crate::foundation::error::{RenderError, RenderResult};

const Q16_ONE: i64 = 1 << 16;

/// Kernel radius covering three standard deviations.
pub(crate) fn radius_for_sigma(sigma: f64) -> u32 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return 0;
    }
    (sigma * 3.0).ceil() as u32
}

/// Blur a premultiplied `width * height` RGBA8 buffer with standard deviation `sigma` px.
pub(crate) fn blur_premul(src: &[u8], width: u32, height: u32, sigma: f64) -> RenderResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| RenderError::validation("blur buffer size overflow"))?;
    if src.len() != expected {
        return Err(RenderError::validation(format!(
            "blur layer is {} bytes, expected {expected}",
            src.len()
        )));
    }
    let radius = radius_for_sigma(sigma);
    if radius == 0 || width == 0 || height == 0 {
        return Ok(src.to_vec());
    }

    let kernel = kernel_q16(radius, sigma);
    let mut tmp = vec![0u8; expected];
    let mut out = vec![0u8; expected];
    let (w, h) = (width as usize, height as usize);
    // rows, then columns
    convolve(src, &mut tmp, w, h, 1, w, &kernel);
    convolve(&tmp, &mut out, h, w, w, 1, &kernel);
    Ok(out)
}

fn kernel_q16(radius: u32, sigma: f64) -> Vec<u32> {
    let r = radius as i32;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    let mut q: Vec<u32> = weights
        .iter()
        .map(|w| ((w / sum) * Q16_ONE as f64).round().clamp(0.0, Q16_ONE as f64) as u32)
        .collect();
    let total: i64 = q.iter().map(|&v| i64::from(v)).sum();
    let mid = q.len() / 2;
    q[mid] = (i64::from(q[mid]) + Q16_ONE - total).clamp(0, Q16_ONE) as u32;
    q
}

/// One 1D pass. `len` samples along the blurred axis at `step` bytes/4 apart, `lines` lines
/// `line_step` pixels apart.
fn convolve(
    src: &[u8],
    dst: &mut [u8],
    len: usize,
    lines: usize,
    step: usize,
    line_step: usize,
    kernel: &[u32],
) {
    let radius = (kernel.len() / 2) as isize;
    let last = len as isize - 1;
    for line in 0..lines {
        let base = line * line_step;
        for i in 0..len {
            let mut acc = [0u64; 4];
            for (k, &kw) in kernel.iter().enumerate() {
                let j = (i as isize + k as isize - radius).clamp(0, last) as usize;
                let idx = (base + j * step) * 4;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = (base + i * step) * 4;
            for (c, a) in acc.iter().enumerate() {
                dst[out + c] = ((a + 32768) >> 16).min(255) as u8;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/blur.rs"]
mod tests;
