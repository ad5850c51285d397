use crate::foundation::error::{RenderError, RenderResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// Build an opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a CSS color: `#RGB`, `#RRGGBB`, `#RRGGBBAA`, `rgb(r,g,b)` or `rgba(r,g,b,a)`.
    pub fn parse_css(s: &str) -> RenderResult<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| RenderError::validation(format!("bad color '{s}'")));
        }
        let lower = s.to_ascii_lowercase();
        let inner = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| RenderError::validation(format!("bad color '{s}'")))?;
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(RenderError::validation(format!("bad color '{s}'")));
        }
        let channel = |p: &str| -> RenderResult<u8> {
            p.parse::<f64>()
                .map(|v| v.round().clamp(0.0, 255.0) as u8)
                .map_err(|_| RenderError::validation(format!("bad color channel '{p}'")))
        };
        let a = match parts.get(3) {
            Some(p) => p
                .parse::<f64>()
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .map_err(|_| RenderError::validation(format!("bad alpha '{p}'")))?,
            None => 255,
        };
        Ok(Self {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a,
        })
    }

    /// Parse a CSS color, logging and substituting `fallback` when it is malformed.
    pub fn parse_or(s: &str, fallback: Self) -> Self {
        match Self::parse_css(s) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(color = s, %err, "falling back to default color");
                fallback
            }
        }
    }

    /// Return this color with alpha multiplied by `factor` (clamped to `[0, 1]`).
    pub fn with_alpha_mul(self, factor: f64) -> Self {
        let a = (f64::from(self.a) * factor.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

fn parse_hex(hex: &str) -> Option<Rgba8> {
    let nibble = |c: u8| (c as char).to_digit(16).map(|v| v as u8);
    let byte = |i: usize| -> Option<u8> {
        let hi = nibble(*hex.as_bytes().get(i)?)?;
        let lo = nibble(*hex.as_bytes().get(i + 1)?)?;
        Some(hi << 4 | lo)
    };
    match hex.len() {
        3 => {
            let b = hex.as_bytes();
            let r = nibble(b[0])?;
            let g = nibble(b[1])?;
            let bl = nibble(b[2])?;
            Some(Rgba8::rgb(r * 17, g * 17, bl * 17))
        }
        6 => Some(Rgba8::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Rgba8 {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: byte(6)?,
        }),
        _ => None,
    }
}

/// How a decoded frame is fitted into the output canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Letterbox: the whole frame is visible.
    #[default]
    Contain,
    /// Crop: the canvas is fully covered.
    Cover,
}

/// Destination rectangle for a `src_w x src_h` frame drawn into a `dst_w x dst_h` canvas.
pub fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, fit: FitMode) -> Rect {
    let (tw, th) = (f64::from(dst_w), f64::from(dst_h));
    if src_w == 0 || src_h == 0 {
        return Rect::new(0.0, 0.0, tw, th);
    }
    let src_ratio = f64::from(src_w) / f64::from(src_h);
    let target_ratio = tw / th;

    let (mut w, mut h, mut x, mut y) = (tw, th, 0.0, 0.0);
    let wider = src_ratio > target_ratio;
    match (fit, wider) {
        (FitMode::Contain, true) | (FitMode::Cover, false) => {
            h = tw / src_ratio;
            y = (th - h) / 2.0;
        }
        (FitMode::Contain, false) | (FitMode::Cover, true) => {
            w = th * src_ratio;
            x = (tw - w) / 2.0;
        }
    }
    Rect::new(x, y, x + w, y + h)
}

/// Round a dimension down to the nearest even value (4:2:0 chroma subsampling).
pub fn round_down_even(v: u32) -> u32 {
    v - (v % 2)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
