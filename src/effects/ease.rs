//! Easing curves and numeric interpolation used by caption animations.

use std::f64::consts::PI;

/// Named easing curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ease {
    Linear,
    /// Cubic ease-out, `1 - (1 - x)^3`.
    EaseOut,
    /// Damped sine overshoot that settles at 1.
    Spring,
}

impl Ease {
    /// Apply the curve to `t`; input is clamped to `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOut => ease_out(t),
            Self::Spring => spring(t),
        }
    }
}

pub fn ease_out(x: f64) -> f64 {
    1.0 - (1.0 - x).powi(3)
}

pub fn spring(x: f64) -> f64 {
    if x == 0.0 || x == 1.0 {
        return x;
    }
    let c4 = (2.0 * PI) / 3.0;
    2f64.powf(-10.0 * x) * ((x * 10.0 - 0.75) * c4).sin() + 1.0
}

pub fn linear(x: f64) -> f64 {
    x
}

pub fn interpolate(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

/// Piecewise-linear interpolation over equally spaced keyframes.
pub fn interpolate_array(keys: &[f64], t: f64) -> f64 {
    match keys {
        [] => 0.0,
        [only] => *only,
        _ => {
            let segment = 1.0 / (keys.len() - 1) as f64;
            let i = ((t / segment).floor().max(0.0) as usize).min(keys.len() - 2);
            let local = (t - i as f64 * segment) / segment;
            interpolate(keys[i], keys[i + 1], local)
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/ease.rs"]
mod tests;
