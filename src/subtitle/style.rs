use crate::foundation::core::{FitMode, Rgba8};
use crate::foundation::error::{RenderError, RenderResult};

/// Vertical anchor of the caption block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Anchored `marginV` below the top edge.
    Top,
    /// Vertically centered.
    Center,
    /// Anchored `marginV` above the bottom edge.
    #[default]
    Bottom,
}

/// Whether a cue is drawn as a text block or word by word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Whole lines.
    #[default]
    #[serde(alias = "block")]
    Standard,
    /// Word-level layout with an active word.
    SingleWord,
}

/// Caption look shared by every cue of a render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtitleStyle {
    pub font_name: String,
    /// Nominal size at 1080p before the 2.5x canvas factor.
    pub font_size: f64,
    /// CSS weight: `normal`, `bold` or a number.
    pub font_weight: String,
    pub primary_color: String,
    pub outline_color: String,
    pub background_color: String,
    pub outline_width: f64,
    pub position: Position,
    pub show_bilingual: bool,
    #[serde(rename = "marginV")]
    pub margin_v: f64,
    /// Preset id or legacy effect name.
    pub effect: String,
    pub highlight_padding: f64,
    pub highlight_gap: f64,
    pub highlight_color: String,
    pub highlight_opacity: f64,
    pub shadow_color: String,
    pub shadow_blur: f64,
    pub shadow_offset_x: f64,
    pub shadow_offset_y: f64,
    pub display_mode: DisplayMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_fit: Option<FitMode>,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24.0,
            font_weight: "normal".to_string(),
            primary_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            background_color: "#00000080".to_string(),
            outline_width: 2.0,
            position: Position::Bottom,
            show_bilingual: false,
            margin_v: 100.0,
            effect: "none".to_string(),
            highlight_padding: 10.0,
            highlight_gap: 16.0,
            highlight_color: "#FFFFFF".to_string(),
            highlight_opacity: 0.25,
            shadow_color: "#000000".to_string(),
            shadow_blur: 0.0,
            shadow_offset_x: 0.0,
            shadow_offset_y: 0.0,
            display_mode: DisplayMode::Standard,
            video_fit: None,
        }
    }
}

/// Partial style attached to a single cue; keys use the same camelCase names as
/// [`SubtitleStyle`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StyleOverride(pub serde_json::Map<String, serde_json::Value>);

impl SubtitleStyle {
    /// Return a copy with `ov` applied on top.
    pub fn merged(&self, ov: &StyleOverride) -> RenderResult<Self> {
        if ov.0.is_empty() {
            return Ok(self.clone());
        }
        let mut base = serde_json::to_value(self)
            .map_err(|e| RenderError::validation(format!("style serialization failed: {e}")))?;
        if let serde_json::Value::Object(map) = &mut base {
            for (k, v) in &ov.0 {
                map.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base)
            .map_err(|e| RenderError::validation(format!("invalid style override: {e}")))
    }

    /// Numeric font weight (`normal` = 400, `bold` = 700).
    pub fn weight(&self) -> u16 {
        match self.font_weight.trim().to_ascii_lowercase().as_str() {
            "" | "normal" | "regular" => 400,
            "bold" => 700,
            "lighter" | "light" => 300,
            "bolder" => 800,
            other => other
                .parse::<u16>()
                .ok()
                .filter(|w| (1..=1000).contains(w))
                .unwrap_or(400),
        }
    }

    /// Font size in output pixels for a canvas of `height` pixels.
    pub fn pixel_font_size(&self, height: u32) -> f64 {
        let base = if self.font_size > 0.0 {
            self.font_size
        } else {
            24.0
        };
        base * canvas_scale(height) * 2.5
    }

    pub fn primary(&self) -> Rgba8 {
        Rgba8::parse_or(&self.primary_color, Rgba8::WHITE)
    }

    pub fn outline(&self) -> Rgba8 {
        Rgba8::parse_or(&self.outline_color, Rgba8::BLACK)
    }

    pub fn highlight(&self) -> Rgba8 {
        Rgba8::parse_or(&self.highlight_color, Rgba8::rgb(255, 255, 0))
    }

    pub fn shadow(&self) -> Rgba8 {
        Rgba8::parse_or(
            &self.shadow_color,
            Rgba8 {
                r: 0,
                g: 0,
                b: 0,
                a: 128,
            },
        )
    }

    /// Reject styles the compositor cannot draw.
    pub fn validate(&self) -> RenderResult<()> {
        for (name, v) in [
            ("fontSize", self.font_size),
            ("outlineWidth", self.outline_width),
            ("marginV", self.margin_v),
            ("highlightGap", self.highlight_gap),
            ("shadowBlur", self.shadow_blur),
        ] {
            if !v.is_finite() {
                return Err(RenderError::validation(format!("{name} must be finite")));
            }
        }
        if self.outline_width < 0.0 || self.shadow_blur < 0.0 {
            return Err(RenderError::validation(
                "outlineWidth and shadowBlur must be >= 0",
            ));
        }
        Ok(())
    }
}

/// Scale factor of a canvas relative to a 1080-pixel-high reference.
pub fn canvas_scale(height: u32) -> f64 {
    f64::from(height) / 1080.0
}

#[cfg(test)]
#[path = "../../tests/unit/subtitle/style.rs"]
mod tests;
