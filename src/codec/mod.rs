//! Codec layer: container and codec traits plus the native MP4 and ffmpeg backends.

pub(crate) mod ffmpeg;
pub(crate) mod mp4;
pub(crate) mod nal;
pub(crate) mod negotiate;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crate::foundation::error::RenderResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// Per-track metadata of a parsed container.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub id: u32,
    pub kind: TrackKind,
    /// RFC 6381 codec string, e.g. `avc1.64001f` or `mp4a.40.2`.
    pub codec: String,
    pub timescale: u32,
    /// Media duration in `timescale` units.
    pub duration: u64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl TrackInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / f64::from(self.timescale)
    }
}

/// Parsed container metadata. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// Movie duration in `timescale` units.
    pub duration: u64,
    pub timescale: u32,
    pub tracks: Vec<TrackInfo>,
}

impl ContainerInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / f64::from(self.timescale)
    }

    pub fn track(&self, id: u32) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// First video track.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    /// First audio track.
    pub fn audio_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }
}

/// One encoded sample as stored in the container. Times are in the track's timescale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub track_id: u32,
    pub data: Vec<u8>,
    pub dts: u64,
    pub cts: u64,
    pub duration: u32,
    pub is_sync: bool,
    pub timescale: u32,
}

/// Codec-specific initialization bytes (`avcC`, `hvcC` or an AudioSpecificConfig).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfigRecord(pub Vec<u8>);

impl DecoderConfigRecord {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// What happens when a track stops short of its declared sample count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Log a warning and continue with the samples delivered so far.
    #[default]
    Warn,
    /// Fail with a parse error.
    Error,
}

/// Sample extraction knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractOptions {
    /// Longest wait for the next sample before extraction is declared stalled.
    pub stall_timeout: Duration,
    pub truncation: TruncationPolicy,
    /// Bound of the producer channel.
    pub channel_capacity: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(5),
            truncation: TruncationPolicy::Warn,
            channel_capacity: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDelivery {
    pub track_id: u32,
    pub delivered: u32,
    pub expected: u32,
}

/// Outcome of [`Demuxer::extract_samples`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub tracks: Vec<TrackDelivery>,
    /// Some track ended before its declared sample count.
    pub truncated: bool,
    /// The consumer asked to stop early.
    pub stopped: bool,
}

impl ExtractionReport {
    pub fn delivered(&self, track_id: u32) -> u32 {
        self.tracks
            .iter()
            .find(|t| t.track_id == track_id)
            .map_or(0, |t| t.delivered)
    }
}

/// Receives samples during extraction. `Break` stops extraction early.
pub type SampleSink<'a> = dyn FnMut(Sample) -> RenderResult<ControlFlow<()>> + 'a;

pub trait Demuxer: Send {
    fn info(&self) -> &ContainerInfo;

    /// Decoder configuration of a track, `None` when its sample entry carries none.
    fn extract_track_config(&self, track_id: u32) -> RenderResult<Option<DecoderConfigRecord>>;

    /// Stream the samples of `track_ids` in storage order.
    ///
    /// Returns once every track delivered its declared count, the sink breaks, or the
    /// stall timeout fires.
    fn extract_samples(
        &mut self,
        track_ids: &[u32],
        options: &ExtractOptions,
        sink: &mut SampleSink<'_>,
    ) -> RenderResult<ExtractionReport>;
}

/// Decoder initialization.
#[derive(Clone, Debug, PartialEq)]
pub struct DecoderSetup {
    pub codec: String,
    pub config: Option<DecoderConfigRecord>,
    pub coded_width: u32,
    pub coded_height: u32,
}

/// A decoded frame, straight-alpha RGBA8. Times are in the source track's timescale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub pts: u64,
    pub duration: u32,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub trait Decoder: Send {
    fn configure(&mut self, setup: &DecoderSetup) -> RenderResult<()>;

    /// Queue a sample. Returns the frames that became ready, in presentation order.
    fn decode(&mut self, sample: Sample) -> RenderResult<Vec<DecodedFrame>>;

    /// Drain every frame still in flight.
    fn flush(&mut self) -> RenderResult<Vec<DecodedFrame>>;
}

/// Negotiated encoder configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub framerate: f64,
    pub keyframe_interval: u32,
}

/// A composited frame handed to the encoder.
#[derive(Clone, Copy, Debug)]
pub struct EncodeFrame<'a> {
    pub rgba: &'a [u8],
    pub pts: u64,
    pub duration: u32,
}

/// One encoded access unit, length-prefixed. Times are in the encoder's timescale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub pts: u64,
    pub duration: u32,
    pub is_key: bool,
    /// Present on the first chunk once the encoder knows its parameter sets.
    pub config: Option<DecoderConfigRecord>,
}

pub trait Encoder: Send {
    /// `timescale` is the unit of every frame and chunk time.
    fn configure(&mut self, config: &EncoderConfig, timescale: u32) -> RenderResult<()>;

    fn encode(&mut self, frame: EncodeFrame<'_>) -> RenderResult<Vec<EncodedChunk>>;

    fn flush(&mut self) -> RenderResult<Vec<EncodedChunk>>;
}

/// Output track description.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackConfig {
    pub kind: TrackKind,
    pub codec: String,
    pub timescale: u32,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub config: Option<DecoderConfigRecord>,
}

impl TrackConfig {
    /// Output track mirroring a source track.
    pub fn from_track(track: &TrackInfo, config: Option<DecoderConfigRecord>) -> Self {
        Self {
            kind: track.kind,
            codec: track.codec.clone(),
            timescale: track.timescale,
            width: track.width,
            height: track.height,
            sample_rate: track.sample_rate,
            channels: track.channels,
            config,
        }
    }
}

/// Sample timing handed to the muxer, in the track's timescale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxSample {
    pub data: Vec<u8>,
    pub dts: u64,
    pub cts: u64,
    pub duration: u32,
    pub is_sync: bool,
}

impl From<Sample> for MuxSample {
    fn from(s: Sample) -> Self {
        Self {
            data: s.data,
            dts: s.dts,
            cts: s.cts,
            duration: s.duration,
            is_sync: s.is_sync,
        }
    }
}

pub trait Muxer: Send {
    /// Returns the new track id.
    fn add_track(&mut self, config: TrackConfig) -> RenderResult<u32>;

    fn add_sample(&mut self, track_id: u32, sample: MuxSample) -> RenderResult<()>;

    fn track_count(&self) -> usize;

    /// Finalize into container bytes. Fails when no track was added.
    fn flush(&mut self) -> RenderResult<Vec<u8>>;
}

/// Local encode capability check.
pub trait EncodeProbe: Send + Sync {
    fn is_config_supported(&self, config: &EncoderConfig) -> bool;
}

impl<F> EncodeProbe for F
where
    F: Fn(&EncoderConfig) -> bool + Send + Sync,
{
    fn is_config_supported(&self, config: &EncoderConfig) -> bool {
        self(config)
    }
}

/// Factory for every codec component of one render.
pub trait MediaBackend: Send + Sync {
    fn open_demuxer(&self, source: Arc<[u8]>) -> RenderResult<Box<dyn Demuxer>>;

    fn create_decoder(&self) -> RenderResult<Box<dyn Decoder>>;

    fn create_encoder(&self) -> RenderResult<Box<dyn Encoder>>;

    fn create_muxer(&self) -> RenderResult<Box<dyn Muxer>>;

    fn probe(&self) -> &dyn EncodeProbe;
}
