use std::time::Duration;

use crate::codec::negotiate::CodecPreference;
use crate::codec::{ExtractOptions, TruncationPolicy};
use crate::foundation::core::FitMode;
use crate::foundation::error::{RenderError, RenderResult};

/// Preview side channel settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewOptions {
    /// Emit a preview every `every_frames` processed frames. `0` disables previews.
    pub every_frames: u32,
    /// Previews are `1 / scale_divisor` of the output size.
    pub scale_divisor: u32,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            every_frames: 30,
            scale_divisor: 4,
            jpeg_quality: 50,
        }
    }
}

/// Output settings of one render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Output width; the source video width when unset.
    pub width: Option<u32>,
    /// Output height; the source video height when unset.
    pub height: Option<u32>,
    pub framerate: f64,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    pub keyframe_interval: u32,
    pub codec_preference: CodecPreference,
    pub fit: FitMode,
    pub preview: PreviewOptions,
    /// Longest wait for the next demuxed sample, in milliseconds.
    pub stall_timeout_ms: u64,
    pub truncation: TruncationPolicy,
    /// Bound of every channel between pipeline stages.
    pub channel_capacity: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            framerate: 30.0,
            bitrate: 5_000_000,
            keyframe_interval: 60,
            codec_preference: CodecPreference::Auto,
            fit: FitMode::Contain,
            preview: PreviewOptions::default(),
            stall_timeout_ms: 5_000,
            truncation: TruncationPolicy::Warn,
            channel_capacity: 16,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> RenderResult<()> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(RenderError::validation("output width/height must be non-zero"));
        }
        if !self.framerate.is_finite() || self.framerate <= 0.0 {
            return Err(RenderError::validation("framerate must be positive"));
        }
        if self.bitrate == 0 {
            return Err(RenderError::validation("bitrate must be non-zero"));
        }
        if self.keyframe_interval == 0 {
            return Err(RenderError::validation("keyframe interval must be non-zero"));
        }
        if self.channel_capacity == 0 {
            return Err(RenderError::validation("channel capacity must be non-zero"));
        }
        if self.preview.every_frames > 0
            && (self.preview.scale_divisor == 0 || !(1..=100).contains(&self.preview.jpeg_quality))
        {
            return Err(RenderError::validation(
                "preview needs a non-zero scale divisor and a JPEG quality in 1..=100",
            ));
        }
        Ok(())
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            stall_timeout: Duration::from_millis(self.stall_timeout_ms),
            truncation: self.truncation,
            channel_capacity: self.channel_capacity,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/options.rs"]
mod tests;
