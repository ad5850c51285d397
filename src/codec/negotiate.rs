//! Encoder configuration negotiation against the local encode capability.

use std::fmt;
use std::str::FromStr;

use crate::codec::{EncodeProbe, EncoderConfig};
use crate::foundation::core::round_down_even;
use crate::foundation::error::{RenderError, RenderResult};

const H264_BASELINE: &[&str] = &["avc1.42001f", "avc1.42001e"];
const H264_MAIN: &[&str] = &["avc1.4d0028", "avc1.4d0029"];
const H264_HIGH: &[&str] = &["avc1.640028", "avc1.640029"];
const HEVC_MAIN: &[&str] = &["hvc1.1.6.L93.B0"];

/// Which codec family the output should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecPreference {
    /// Broadest compatibility first, the source codec last.
    #[default]
    Auto,
    /// The source codec first, then the compatibility ladder.
    Source,
    H264Baseline,
    H264Main,
    H264High,
    Hevc,
}

impl CodecPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Source => "source",
            Self::H264Baseline => "h264-baseline",
            Self::H264Main => "h264-main",
            Self::H264High => "h264-high",
            Self::Hevc => "hevc",
        }
    }
}

impl fmt::Display for CodecPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecPreference {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "source" => Self::Source,
            "h264-baseline" => Self::H264Baseline,
            "h264-main" => Self::H264Main,
            "h264-high" => Self::H264High,
            "hevc" => Self::Hevc,
            other => {
                return Err(RenderError::validation(format!(
                    "unknown codec preference '{other}'"
                )));
            }
        })
    }
}

/// Ordered codec strings probed for `mode`. `preferred` is the source track's codec.
pub fn candidate_codecs(preferred: Option<&str>, mode: CodecPreference) -> Vec<String> {
    let preferred = preferred.filter(|c| !c.is_empty());
    let ladder = [H264_BASELINE, H264_MAIN, H264_HIGH, HEVC_MAIN];
    let owned = |list: &[&str]| list.iter().map(|c| (*c).to_owned()).collect::<Vec<_>>();

    match mode {
        CodecPreference::H264Baseline => owned(H264_BASELINE),
        CodecPreference::H264Main => owned(H264_MAIN),
        CodecPreference::H264High => owned(H264_HIGH),
        CodecPreference::Hevc => owned(HEVC_MAIN),
        CodecPreference::Source => preferred
            .map(str::to_owned)
            .into_iter()
            .chain(ladder.iter().flat_map(|l| owned(l)))
            .collect(),
        CodecPreference::Auto => ladder
            .iter()
            .flat_map(|l| owned(l))
            .chain(preferred.map(str::to_owned))
            .collect(),
    }
}

/// Pick the first candidate the probe accepts.
///
/// Width and height of `base` are rounded down to even before probing; its `codec` is
/// replaced by the winning candidate.
#[tracing::instrument(level = "debug", skip(base, probe), fields(width = base.width, height = base.height))]
pub fn select_config(
    base: &EncoderConfig,
    preferred: Option<&str>,
    mode: CodecPreference,
    probe: &dyn EncodeProbe,
) -> RenderResult<EncoderConfig> {
    let width = round_down_even(base.width);
    let height = round_down_even(base.height);
    if width == 0 || height == 0 {
        return Err(RenderError::validation(format!(
            "output size {}x{} is too small to encode",
            base.width, base.height
        )));
    }

    for codec in candidate_codecs(preferred, mode) {
        let candidate = EncoderConfig {
            codec,
            width,
            height,
            ..base.clone()
        };
        let supported = probe.is_config_supported(&candidate);
        tracing::debug!(codec = %candidate.codec, supported, "probed encoder candidate");
        if supported {
            tracing::info!(codec = %candidate.codec, width, height, "selected encoder config");
            return Ok(candidate);
        }
    }

    Err(RenderError::unsupported_codec(format!(
        "No supported video encoding format found for {width}x{height} using {mode}"
    )))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

impl H264Profile {
    pub fn name(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Main => "main",
            Self::High => "high",
        }
    }
}

/// Encoder settings implied by an RFC 6381 codec string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncoderSettings {
    H264 { profile: H264Profile, level: String },
    Hevc { level: String },
}

impl EncoderSettings {
    /// Parse `avc1.PPCCLL` or `hvc1.P.C.Lnn.*` (also `avc3`/`hev1`).
    pub fn from_codec(codec: &str) -> RenderResult<Self> {
        let unsupported = || RenderError::unsupported_codec(format!("cannot encode '{codec}'"));
        let mut parts = codec.split('.');
        match parts.next() {
            Some("avc1" | "avc3") => {
                let hex = parts.next().filter(|h| h.len() == 6).ok_or_else(unsupported)?;
                let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| unsupported());
                let profile = match byte(0)? {
                    0x42 => H264Profile::Baseline,
                    0x4d => H264Profile::Main,
                    0x64 => H264Profile::High,
                    _ => return Err(unsupported()),
                };
                let level = byte(4)?;
                Ok(Self::H264 {
                    profile,
                    level: format!("{}.{}", level / 10, level % 10),
                })
            }
            Some("hvc1" | "hev1") => {
                let level = parts
                    .find_map(|p| p.strip_prefix('L').or_else(|| p.strip_prefix('H')))
                    .and_then(|l| l.parse::<u32>().ok())
                    .ok_or_else(unsupported)?;
                let tenths = level * 10 / 30;
                Ok(Self::Hevc {
                    level: format!("{}.{}", tenths / 10, tenths % 10),
                })
            }
            _ => Err(unsupported()),
        }
    }

    pub fn is_hevc(&self) -> bool {
        matches!(self, Self::Hevc { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/negotiate.rs"]
mod tests;
