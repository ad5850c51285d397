//! Render orchestrator: demux, decode, composite, encode and mux one video.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use crossbeam_channel::{Receiver, Sender};

use crate::codec::negotiate::select_config;
use crate::codec::{
    ContainerInfo, DecodedFrame, DecoderSetup, EncodeFrame, EncodedChunk, Encoder, EncoderConfig,
    ExtractionReport, MediaBackend, MuxSample, Muxer, Sample, TrackConfig, TrackInfo, TrackKind,
};
use crate::compose::cpu::{CpuCompositor, VideoFrame};
use crate::compose::text::FontBook;
use crate::effects::preset::PresetRegistry;
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::options::RenderOptions;
use crate::render::preview::{self, PreviewFrame, PreviewRequest};
use crate::subtitle::cue::SubtitleCue;
use crate::subtitle::style::SubtitleStyle;

pub const STATUS_ANALYZING: &str = "Starting Analysis...";
pub const STATUS_INITIALIZING: &str = "Initializing Pipeline...";
pub const STATUS_RENDERING: &str = "Rendering...";
pub const STATUS_FLUSHING: &str = "Flushing...";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_CANCELLED: &str = "Cancelled";

/// Lifecycle of a [`Renderer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    #[default]
    Idle,
    Analyzing,
    Initializing,
    Rendering,
    Flushing,
    Done,
    Failed,
}

/// Cooperative cancellation flag shared with a running render.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;
pub type StatusCallback = Box<dyn FnMut(&str) + Send>;
pub type FrameCallback = Box<dyn FnMut(PreviewFrame) + Send>;

/// Observer hooks. Progress and status run on the calling thread, previews on a side thread.
#[derive(Default)]
pub struct RenderCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_status: Option<StatusCallback>,
    pub on_frame: Option<FrameCallback>,
}

impl RenderCallbacks {
    fn progress(&mut self, ratio: f64) {
        if let Some(cb) = self.on_progress.as_mut() {
            cb(ratio);
        }
    }

    fn status(&mut self, text: &str) {
        tracing::info!(status = text, "render status");
        if let Some(cb) = self.on_status.as_mut() {
            cb(text);
        }
    }
}

/// Finished output container.
#[derive(Clone, Debug)]
pub struct RenderedVideo {
    bytes: Vec<u8>,
    /// The render stopped early at the caller's request; the container is still valid.
    pub cancelled: bool,
    /// Video samples written to the output.
    pub frames_encoded: u64,
    /// Audio samples copied from the source.
    pub audio_samples: u64,
    pub encoder: EncoderConfig,
    pub extraction: ExtractionReport,
}

impl RenderedVideo {
    pub fn buffer(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the container to `path`, creating parent directories.
    pub fn download(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        Ok(())
    }
}

/// Burns `cues` into the video track of `source`, passing audio through.
pub struct Renderer<'b> {
    backend: &'b dyn MediaBackend,
    source: Arc<[u8]>,
    cues: Vec<SubtitleCue>,
    style: SubtitleStyle,
    options: RenderOptions,
    callbacks: RenderCallbacks,
    fonts: Option<FontBook>,
    presets: Option<PresetRegistry>,
    cancel: CancelHandle,
    state: RenderState,
}

impl<'b> Renderer<'b> {
    pub fn new(
        backend: &'b dyn MediaBackend,
        source: impl Into<Arc<[u8]>>,
        cues: Vec<SubtitleCue>,
        style: SubtitleStyle,
        options: RenderOptions,
    ) -> Self {
        Self {
            backend,
            source: source.into(),
            cues,
            style,
            options,
            callbacks: RenderCallbacks::default(),
            fonts: None,
            presets: None,
            cancel: CancelHandle::default(),
            state: RenderState::Idle,
        }
    }

    pub fn with_callbacks(mut self, callbacks: RenderCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.callbacks.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_status(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.callbacks.on_status = Some(Box::new(f));
        self
    }

    pub fn on_frame(mut self, f: impl FnMut(PreviewFrame) + Send + 'static) -> Self {
        self.callbacks.on_frame = Some(Box::new(f));
        self
    }

    /// Fonts used for captions. Defaults to the system fonts.
    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = Some(fonts);
        self
    }

    /// Effect presets. Defaults to the built-in catalogue.
    pub fn with_presets(mut self, presets: PresetRegistry) -> Self {
        self.presets = Some(presets);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation; checked once per decoded frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Run the whole pipeline. Cancellation yields a shorter but valid container.
    #[tracing::instrument(skip_all, fields(bytes = self.source.len(), cues = self.cues.len()))]
    pub fn start(&mut self) -> RenderResult<RenderedVideo> {
        if self.state != RenderState::Idle {
            return Err(RenderError::validation("renderer can only be started once"));
        }
        match self.run() {
            Ok(out) => {
                self.state = RenderState::Done;
                let status = if out.cancelled {
                    STATUS_CANCELLED
                } else {
                    STATUS_DONE
                };
                self.callbacks.status(status);
                Ok(out)
            }
            Err(e) => {
                tracing::error!(error = %e, state = ?self.state, "render failed");
                self.state = RenderState::Failed;
                Err(e)
            }
        }
    }

    fn enter(&mut self, state: RenderState, status: &str) {
        tracing::debug!(from = ?self.state, to = ?state, "render state");
        self.state = state;
        self.callbacks.status(status);
    }

    fn run(&mut self) -> RenderResult<RenderedVideo> {
        self.enter(RenderState::Analyzing, STATUS_ANALYZING);
        self.options.validate()?;
        self.style.validate()?;
        for cue in &self.cues {
            cue.validate()?;
        }
        let mut demuxer = self.backend.open_demuxer(Arc::clone(&self.source))?;
        let info = demuxer.info().clone();
        let video = info
            .video_track()
            .cloned()
            .ok_or_else(|| RenderError::missing_track("No video track found"))?;
        let audio = info.audio_track().cloned();
        tracing::info!(
            video_track = video.id,
            codec = %video.codec,
            width = video.width,
            height = video.height,
            samples = video.sample_count,
            audio = audio.is_some(),
            "analyzed source"
        );

        self.enter(RenderState::Initializing, STATUS_INITIALIZING);
        let base = EncoderConfig {
            codec: String::new(),
            width: self.options.width.unwrap_or(video.width),
            height: self.options.height.unwrap_or(video.height),
            bitrate: self.options.bitrate,
            framerate: self.options.framerate,
            keyframe_interval: self.options.keyframe_interval,
        };
        let enc_cfg = select_config(
            &base,
            Some(video.codec.as_str()),
            self.options.codec_preference,
            self.backend.probe(),
        )?;

        let fonts = self.fonts.take().unwrap_or_else(FontBook::system);
        let presets = match self.presets.take() {
            Some(p) => p,
            None => PresetRegistry::builtin()?,
        };
        let mut compositor =
            CpuCompositor::new(enc_cfg.width, enc_cfg.height, fonts)?
            .with_fit(self.style.video_fit.unwrap_or(self.options.fit));

        let mut muxer = self.backend.create_muxer()?;
        let audio_out = match audio.as_ref() {
            Some(a) => {
                let config = demuxer.extract_track_config(a.id)?;
                Some(muxer.add_track(TrackConfig::from_track(a, config))?)
            }
            None => None,
        };

        let mut encoder = self.backend.create_encoder()?;
        encoder.configure(&enc_cfg, video.timescale)?;

        let mut decoder = self.backend.create_decoder()?;
        decoder.configure(&DecoderSetup {
            codec: video.codec.clone(),
            config: demuxer.extract_track_config(video.id)?,
            coded_width: video.width,
            coded_height: video.height,
        })?;

        self.enter(RenderState::Rendering, STATUS_RENDERING);
        let mut track_ids = vec![video.id];
        track_ids.extend(audio.as_ref().map(|a| a.id));
        let extract_opts = self.options.extract_options();
        let cap = self.options.channel_capacity.max(1);
        let preview_opts = self.options.preview.clone();
        let cancel = self.cancel.clone();
        let mut on_frame = self.callbacks.on_frame.take();

        let sink_ctx = EncodeSink {
            encoder,
            muxer,
            config: enc_cfg.clone(),
            timescale: video.timescale,
            video_out: None,
            audio_out,
            frames_encoded: 0,
            audio_samples: 0,
            dropped_chunks: 0,
            cancel: cancel.clone(),
        };

        let outcome = std::thread::scope(|scope| -> RenderResult<PipelineOutcome> {
            let (job_tx, job_rx) = crossbeam_channel::bounded::<MuxJob>(cap);
            let enc = scope.spawn(move || sink_ctx.run(job_rx));

            let (preview_tx, preview_worker) = match on_frame.as_mut() {
                Some(cb) if preview_opts.every_frames > 0 => {
                    let (tx, rx) = crossbeam_channel::bounded::<PreviewRequest>(1);
                    let opts = &preview_opts;
                    let handle = scope.spawn(move || preview::run_worker(rx, opts, cb.as_mut()));
                    (Some(tx), Some(handle))
                }
                _ => (None, None),
            };

            let mut stage = FrameStage {
                compositor: &mut compositor,
                cues: &self.cues,
                style: &self.style,
                presets: &presets,
                callbacks: &mut self.callbacks,
                jobs: &job_tx,
                preview: preview_tx.as_ref(),
                preview_every: preview_opts.every_frames,
                timescale: video.timescale,
                duration_secs: info.duration_secs(),
                frames_seen: 0,
                cancel: &cancel,
            };

            let produced = stage.pump(
                demuxer.as_mut(),
                decoder.as_mut(),
                &track_ids,
                &extract_opts,
                &video,
                audio.as_ref(),
            );
            let flushed = match produced {
                Ok(report) => {
                    self.state = RenderState::Flushing;
                    stage.callbacks.status(STATUS_FLUSHING);
                    stage.flush(decoder.as_mut()).map(|()| report)
                }
                Err(e) => Err(e),
            };

            drop(stage);
            drop(job_tx);
            drop(preview_tx);
            let enc_res = enc
                .join()
                .map_err(|_| anyhow::anyhow!("encoder thread panicked"))?;
            if let Some(handle) = preview_worker
                && handle.join().is_err()
            {
                tracing::warn!("preview thread panicked");
            }

            // a dead encoder thread surfaces here as a send failure, so its error wins
            let sink = enc_res?;
            let extraction = flushed?;
            Ok(PipelineOutcome { extraction, sink })
        })?;

        let cancelled = cancel.is_cancelled();
        let mut sink = outcome.sink;
        let bytes = sink.muxer.flush()?;
        tracing::info!(
            frames = sink.frames_encoded,
            audio_samples = sink.audio_samples,
            dropped_chunks = sink.dropped_chunks,
            bytes = bytes.len(),
            cancelled,
            "render finished"
        );
        Ok(RenderedVideo {
            bytes,
            cancelled,
            frames_encoded: sink.frames_encoded,
            audio_samples: sink.audio_samples,
            encoder: enc_cfg,
            extraction: outcome.extraction,
        })
    }
}

struct PipelineOutcome {
    extraction: ExtractionReport,
    sink: EncodeSink,
}

/// Work for the encode and mux thread.
enum MuxJob {
    Frame {
        rgba: Vec<u8>,
        pts: u64,
        duration: u32,
    },
    Audio(Sample),
}

/// Decode-side stage: runs on the calling thread, composites decoded frames and feeds
/// the encode thread.
struct FrameStage<'a> {
    compositor: &'a mut CpuCompositor,
    cues: &'a [SubtitleCue],
    style: &'a SubtitleStyle,
    presets: &'a PresetRegistry,
    callbacks: &'a mut RenderCallbacks,
    jobs: &'a Sender<MuxJob>,
    preview: Option<&'a Sender<PreviewRequest>>,
    preview_every: u32,
    timescale: u32,
    duration_secs: f64,
    frames_seen: u64,
    cancel: &'a CancelHandle,
}

impl FrameStage<'_> {
    fn send(&self, job: MuxJob) -> RenderResult<()> {
        self.jobs
            .send(job)
            .map_err(|_| RenderError::encode("encoder thread is not accepting frames"))
    }

    fn pump(
        &mut self,
        demuxer: &mut dyn crate::codec::Demuxer,
        decoder: &mut dyn crate::codec::Decoder,
        track_ids: &[u32],
        opts: &crate::codec::ExtractOptions,
        video: &TrackInfo,
        audio: Option<&TrackInfo>,
    ) -> RenderResult<ExtractionReport> {
        let audio_id = audio.map(|a| a.id);
        let report = demuxer.extract_samples(track_ids, opts, &mut |sample: Sample| {
            if sample.track_id == video.id {
                for frame in decoder.decode(sample)? {
                    if self.cancel.is_cancelled() {
                        tracing::info!(pts = frame.pts, "render cancelled");
                        return Ok(ControlFlow::Break(()));
                    }
                    self.composite(frame)?;
                }
                if self.cancel.is_cancelled() {
                    return Ok(ControlFlow::Break(()));
                }
            } else if Some(sample.track_id) == audio_id {
                self.send(MuxJob::Audio(sample))?;
            }
            Ok(ControlFlow::Continue(()))
        })?;
        tracing::info!(
            video = report.delivered(video.id),
            audio = audio_id.map_or(0, |id| report.delivered(id)),
            stopped = report.stopped,
            "extraction finished"
        );
        Ok(report)
    }

    fn flush(&mut self, decoder: &mut dyn crate::codec::Decoder) -> RenderResult<()> {
        if self.cancel.is_cancelled() {
            // in-flight decoder frames are closed without encoding
            return Ok(());
        }
        for frame in decoder.flush()? {
            if self.cancel.is_cancelled() {
                break;
            }
            self.composite(frame)?;
        }
        Ok(())
    }

    fn composite(&mut self, frame: DecodedFrame) -> RenderResult<()> {
        let time = frame.pts as f64 / f64::from(self.timescale.max(1));
        let rgba = self
            .compositor
            .render_frame(
                Some(VideoFrame {
                    width: frame.width,
                    height: frame.height,
                    rgba: &frame.rgba,
                }),
                time,
                self.cues,
                self.style,
                self.presets,
            )?
            .to_vec();

        if let Some(tx) = self.preview
            && self.frames_seen.is_multiple_of(u64::from(self.preview_every.max(1)))
        {
            let (width, height) = self.compositor.size();
            preview::offer(
                tx,
                PreviewRequest {
                    time,
                    width,
                    height,
                    rgba: rgba.clone(),
                },
            );
        }
        self.frames_seen += 1;

        self.send(MuxJob::Frame {
            rgba,
            pts: frame.pts,
            duration: frame.duration,
        })?;

        if self.duration_secs > 0.0 {
            self.callbacks
                .progress((time / self.duration_secs).clamp(0.0, 1.0));
        }
        Ok(())
    }
}

/// Encode-side stage: owns the encoder and the muxer on the encode thread.
struct EncodeSink {
    encoder: Box<dyn Encoder>,
    muxer: Box<dyn Muxer>,
    config: EncoderConfig,
    timescale: u32,
    video_out: Option<u32>,
    audio_out: Option<u32>,
    frames_encoded: u64,
    audio_samples: u64,
    dropped_chunks: u64,
    cancel: CancelHandle,
}

impl EncodeSink {
    fn run(mut self, jobs: Receiver<MuxJob>) -> RenderResult<Self> {
        for job in jobs {
            match job {
                MuxJob::Frame { rgba, pts, duration } => {
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    let chunks = self.encoder.encode(EncodeFrame {
                        rgba: &rgba,
                        pts,
                        duration,
                    })?;
                    self.write_chunks(chunks)?;
                }
                MuxJob::Audio(sample) => {
                    if let Some(id) = self.audio_out {
                        self.muxer.add_sample(id, MuxSample::from(sample))?;
                        self.audio_samples += 1;
                    }
                }
            }
        }
        let tail = self.encoder.flush()?;
        self.write_chunks(tail)?;
        Ok(self)
    }

    fn write_chunks(&mut self, chunks: Vec<EncodedChunk>) -> RenderResult<()> {
        for chunk in chunks {
            if self.video_out.is_none() {
                let Some(record) = chunk.config.clone() else {
                    self.dropped_chunks += 1;
                    tracing::warn!(
                        pts = chunk.pts,
                        "dropping encoded chunk, output track not initialized yet"
                    );
                    continue;
                };
                let id = self.muxer.add_track(TrackConfig {
                    kind: TrackKind::Video,
                    codec: self.config.codec.clone(),
                    timescale: self.timescale,
                    width: self.config.width,
                    height: self.config.height,
                    sample_rate: 0,
                    channels: 0,
                    config: Some(record),
                })?;
                tracing::info!(track_id = id, codec = %self.config.codec, "created output video track");
                self.video_out = Some(id);
            }
            if let Some(id) = self.video_out {
                self.muxer.add_sample(
                    id,
                    MuxSample {
                        data: chunk.data,
                        dts: chunk.pts,
                        cts: chunk.pts,
                        duration: chunk.duration,
                        is_sync: chunk.is_key,
                    },
                )?;
                self.frames_encoded += 1;
            }
        }
        Ok(())
    }
}

/// Container summary without rendering, e.g. for `probe`.
pub fn probe_container(backend: &dyn MediaBackend, source: Arc<[u8]>) -> RenderResult<ContainerInfo> {
    Ok(backend.open_demuxer(source)?.info().clone())
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
