use std::collections::BTreeMap;

use crate::effects::ease::{interpolate, interpolate_array};
use crate::foundation::error::{RenderError, RenderResult};

const BUILTIN_PRESETS: &str = include_str!("presets.json");

/// Transition duration used when a preset does not carry one.
pub const DEFAULT_TRANSITION_SECS: f64 = 0.3;

/// A property that is either a single target value or a keyframe list.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Animatable {
    Value(f64),
    Keys(Vec<f64>),
}

impl Animatable {
    /// Sample at `t`. A single value is approached from `identity`; keyframes are
    /// interpolated piecewise.
    pub fn sample(&self, identity: f64, t: f64) -> f64 {
        match self {
            Self::Value(v) => interpolate(identity, *v, t),
            Self::Keys(keys) => interpolate_array(keys, t),
        }
    }

    /// The starting value: the scalar itself or the first keyframe.
    pub fn first(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Keys(keys) => keys.first().copied().unwrap_or(0.0),
        }
    }
}

/// CSS-style `filter` value, only `blur(Npx)` is interpreted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    One(String),
    Keys(Vec<String>),
}

impl FilterSpec {
    /// Blur radius in px of a single filter, `None` when it is not a blur.
    pub fn blur_px(&self) -> Option<f64> {
        match self {
            Self::One(s) => parse_blur(s),
            Self::Keys(keys) => keys.first().and_then(|s| parse_blur(s)),
        }
    }

    /// Blur keyframes as numbers, `None` when no keyframe is a blur.
    pub fn blur_keys(&self) -> Option<Vec<f64>> {
        match self {
            Self::One(s) => parse_blur(s).map(|v| vec![v]),
            Self::Keys(keys) => {
                let parsed: Vec<f64> = keys.iter().filter_map(|s| parse_blur(s)).collect();
                (!parsed.is_empty()).then_some(parsed)
            }
        }
    }
}

fn parse_blur(s: &str) -> Option<f64> {
    if !s.contains("blur") {
        return None;
    }
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Some(digits.parse::<f64>().unwrap_or(0.0))
}

/// Animated property targets of a motion state.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<Animatable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ease: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Payload of `lineMotion` and `wordMotion` descriptors.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<AnimationProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animate: Option<AnimationProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipDirection {
    Ltr,
    Rtl,
    Ttb,
    Btt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillDirection {
    Ltr,
    Rtl,
    Center,
    Btt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressDecorKind {
    Underline,
    Overline,
    Strike,
    Marker,
    BoxFill,
    ShimmerText,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecorKind {
    PillBehind,
    BoxBehind,
    Halo,
    Brackets,
    Quotes,
    CaretDown,
    ArrowLeft,
    Tape,
    ShadowPop,
    Outline,
    UnderlineStatic,
    OverlineStatic,
    StrikeStatic,
    BackdropBlurChip,
    DimOthers,
}

/// Geometry knobs shared by decor descriptors; all values are at 1080p scale.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_em: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_opacity: Option<f64>,
}

/// Closed set of effect descriptor kinds, tagged by `type` in JSON.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MotionKind {
    LineMotion(MotionConfig),
    LineClipReveal {
        direction: ClipDirection,
        duration: f64,
    },
    WordMotion(MotionConfig),
    WordProgressFill {
        direction: FillDirection,
    },
    WordProgressDecor {
        decor: ProgressDecorKind,
        #[serde(flatten)]
        params: DecorParams,
    },
    WordDecorToggle {
        decor: DecorKind,
        #[serde(flatten)]
        params: DecorParams,
    },
}

impl MotionKind {
    /// Seconds the descriptor spends on an entry or exit transition.
    pub fn transition_secs(&self) -> f64 {
        match self {
            Self::LineMotion(m) | Self::WordMotion(m) => m
                .transition
                .as_ref()
                .and_then(|t| t.duration)
                .filter(|d| *d > 0.0)
                .unwrap_or(DEFAULT_TRANSITION_SECS),
            Self::LineClipReveal { duration, .. } if *duration > 0.0 => *duration,
            _ => DEFAULT_TRANSITION_SECS,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LineMotion(_) => "lineMotion",
            Self::LineClipReveal { .. } => "lineClipReveal",
            Self::WordMotion(_) => "wordMotion",
            Self::WordProgressFill { .. } => "wordProgressFill",
            Self::WordProgressDecor { .. } => "wordProgressDecor",
            Self::WordDecorToggle { .. } => "wordDecorToggle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Line,
    Word,
}

/// How much of a line's text is visible while its cue is up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reveal {
    #[default]
    Whole,
    /// Characters appear in proportion to cue progress.
    Typewriter,
}

impl Reveal {
    fn is_whole(&self) -> bool {
        *self == Reveal::Whole
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Cinematic,
}

/// A declarative caption animation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectPreset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<MotionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<MotionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<MotionKind>,
    /// Idle state of non-active words.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive: Option<AnimationProps>,
    #[serde(default, skip_serializing_if = "Reveal::is_whole")]
    pub reveal: Reveal,
}

impl EffectPreset {
    /// Presets that dim every word except the active one.
    pub fn dims_others(&self) -> Option<f64> {
        match &self.active {
            Some(MotionKind::WordDecorToggle {
                decor: DecorKind::DimOthers,
                params,
            }) => Some(params.inactive_opacity.unwrap_or(0.5)),
            _ => None,
        }
    }

    /// Whether cues using this preset are laid out word by word.
    pub fn is_word_level(&self) -> bool {
        self.scope == Scope::Word || self.dims_others().is_some()
    }
}

#[derive(serde::Deserialize)]
struct Catalogue {
    aliases: BTreeMap<String, String>,
    presets: Vec<EffectPreset>,
}

/// Lookup table of effect presets plus the legacy effect-name aliases.
#[derive(Clone, Debug)]
pub struct PresetRegistry {
    presets: BTreeMap<String, EffectPreset>,
    aliases: BTreeMap<String, String>,
}

impl PresetRegistry {
    /// The built-in catalogue.
    pub fn builtin() -> RenderResult<Self> {
        Self::from_json(BUILTIN_PRESETS)
    }

    /// Load a catalogue of the form `{"aliases": {...}, "presets": [...]}`.
    pub fn from_json(json: &str) -> RenderResult<Self> {
        let cat: Catalogue = serde_json::from_str(json)
            .map_err(|e| RenderError::validation(format!("invalid preset catalogue: {e}")))?;
        let mut presets = BTreeMap::new();
        for p in cat.presets {
            if presets.insert(p.id.clone(), p).is_some() {
                return Err(RenderError::validation("duplicate preset id in catalogue"));
            }
        }
        Ok(Self {
            presets,
            aliases: cat.aliases,
        })
    }

    /// Map a legacy effect name onto its preset id; other names pass through.
    pub fn resolve_id<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Look up a preset by id or legacy name.
    pub fn get(&self, name: &str) -> Option<&EffectPreset> {
        self.presets.get(self.resolve_id(name))
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, preset: EffectPreset) {
        self.presets.insert(preset.id.clone(), preset);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectPreset> {
        self.presets.values()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/preset.rs"]
mod tests;
