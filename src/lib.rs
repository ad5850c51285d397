//! Subburn burns animated subtitles into MP4 videos.
//!
//! A render reads an MP4 container, decodes its video track, composites caption overlays
//! driven by declarative effect presets, re-encodes the result and muxes it together with
//! the untouched source audio:
//!
//! - Parse cues from JSON or SRT into [`SubtitleCue`]s and check them with [`validate_all_cues`]
//! - Configure a [`SubtitleStyle`] and [`RenderOptions`]
//! - Run a [`Renderer`] against a [`MediaBackend`] such as [`FfmpegBackend`]
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod codec;
pub(crate) mod compose;
pub(crate) mod effects;
pub(crate) mod render;
pub(crate) mod subtitle;

pub use crate::foundation::core::{
    Affine, FitMode, Point, Rect, Rgba8, Vec2, fit_rect, round_down_even,
};
pub use crate::foundation::error::{RenderError, RenderResult};

pub use crate::subtitle::cue::{CUE_BUFFER_SECS, CaptionData, SubtitleCue, WordTiming};
pub use crate::subtitle::srt::{format_timestamp, generate_srt, parse_srt, validate_srt_content};
pub use crate::subtitle::style::{
    DisplayMode, Position, StyleOverride, SubtitleStyle, canvas_scale,
};
pub use crate::subtitle::validate::{
    CueProblem, CueStats, MAX_CHARS_PER_LINE, MAX_CHARS_PER_SECOND, MAX_DURATION_SECS, MAX_LINES,
    ProblemKind, auto_wrap_lines, cue_stats, detect_overlaps, fix_overlap, problem_summary,
    validate_all_cues, validate_cue,
};

pub use crate::effects::ease::{Ease, ease_out, interpolate, interpolate_array, linear, spring};
pub use crate::effects::preset::{
    Animatable, AnimationProps, ClipDirection, DEFAULT_TRANSITION_SECS, DecorKind, DecorParams,
    EffectPreset, FillDirection, FilterSpec, MotionConfig, MotionKind, PresetRegistry,
    ProgressDecorKind, Reveal, Scope, Tier, Transition,
};

pub use crate::compose::cpu::{CpuCompositor, VideoFrame};
pub use crate::compose::plan::{
    ClipRegion, DrawKind, DrawOp, DrawState, FontSpec, FrameGeometry, TextMeasurer, TextRun,
    TextShadow, TextStroke, active_cues, active_word_index, karaoke_fill_fraction, plan_frame,
    word_window,
};
pub use crate::compose::text::{FontBook, ShapedText, TextBrushRgba8};

pub use crate::codec::ffmpeg::{
    FfmpegBackend, FfmpegDecoder, FfmpegEncoder, FfmpegProbe, is_ffmpeg_on_path,
};
pub use crate::codec::mp4::demux::Mp4Demuxer;
pub use crate::codec::mp4::mux::Mp4Muxer;
pub use crate::codec::nal::{
    AvcConfig, HevcConfig, NalCodec, annexb_nals, length_prefixed_nals, length_prefixed_to_annexb,
    to_length_prefixed,
};
pub use crate::codec::negotiate::{
    CodecPreference, EncoderSettings, H264Profile, candidate_codecs, select_config,
};
pub use crate::codec::{
    ContainerInfo, DecodedFrame, Decoder, DecoderConfigRecord, DecoderSetup, Demuxer,
    EncodeFrame, EncodeProbe, EncodedChunk, Encoder, EncoderConfig, ExtractOptions,
    ExtractionReport, MediaBackend, MuxSample, Muxer, Sample, SampleSink, TrackConfig,
    TrackDelivery, TrackInfo, TrackKind, TruncationPolicy,
};

pub use crate::render::options::{PreviewOptions, RenderOptions};
pub use crate::render::pipeline::{
    CancelHandle, FrameCallback, ProgressCallback, RenderCallbacks, RenderState, RenderedVideo,
    Renderer, STATUS_ANALYZING, STATUS_CANCELLED, STATUS_DONE, STATUS_FLUSHING,
    STATUS_INITIALIZING, STATUS_RENDERING, StatusCallback, probe_container,
};
pub use crate::render::preview::{PreviewFrame, encode_preview};
