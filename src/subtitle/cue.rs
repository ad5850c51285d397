use crate::foundation::error::{RenderError, RenderResult};
use crate::subtitle::style::StyleOverride;

/// Seconds of lead-in/lead-out during which a cue is kept in the animation window.
pub const CUE_BUFFER_SECS: f64 = 1.0;

/// Spoken timing of a single word inside a cue.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WordTiming {
    /// Word text.
    #[serde(alias = "text")]
    pub word: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
}

/// A timed subtitle entry.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleCue {
    /// Identifier within the caption set.
    #[serde(default)]
    pub id: u32,
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
    /// Subtitle text; may contain line breaks.
    pub text: String,
    /// Source-language text for bilingual display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    /// Partial style merged over the default style for this cue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_override: Option<StyleOverride>,
    /// Per-word timing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTiming>>,
    /// Validation problems on this cue were dismissed by the user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_problems: bool,
}

impl SubtitleCue {
    /// Build a plain cue.
    pub fn new(id: u32, start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach per-word timing.
    pub fn with_words(mut self, words: Vec<WordTiming>) -> Self {
        self.words = Some(words);
        self
    }

    /// `end - start` in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// `true` while `t` is inside the ±1s animation window.
    pub fn is_buffered(&self, t: f64) -> bool {
        t >= self.start_time - CUE_BUFFER_SECS && t < self.end_time + CUE_BUFFER_SECS
    }

    /// `true` while `start <= t < end`.
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.start_time && t < self.end_time
    }

    /// Fraction of the cue elapsed at `t`, clamped to `[0, 1]`.
    pub fn progress(&self, t: f64) -> f64 {
        let d = self.duration();
        if d <= 0.0 {
            return 1.0;
        }
        ((t - self.start_time) / d).clamp(0.0, 1.0)
    }

    /// Reject cues with non-finite times or `start >= end`.
    pub fn validate(&self) -> RenderResult<()> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(RenderError::validation(format!(
                "cue {} has non-finite timing",
                self.id
            )));
        }
        if self.start_time >= self.end_time {
            return Err(RenderError::validation(format!(
                "cue {} must start before it ends ({} >= {})",
                self.id, self.start_time, self.end_time
            )));
        }
        Ok(())
    }
}

/// Editor caption document: cues plus the default style.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionData {
    /// Schema version.
    #[serde(default = "caption_data_version")]
    pub version: u32,
    /// Cues in the set.
    pub cues: Vec<SubtitleCue>,
    /// Style applied to every cue.
    #[serde(default)]
    pub default_style: crate::subtitle::style::SubtitleStyle,
    /// Video fit requested by the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_fit: Option<crate::foundation::core::FitMode>,
}

fn caption_data_version() -> u32 {
    1
}
