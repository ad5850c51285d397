use std::collections::BTreeMap;

use crate::codec::ffmpeg::FfmpegProcess;
use crate::codec::nal::{
    AvcConfig, HevcConfig, NalCodec, length_prefixed_to_annexb, parameter_sets_annexb,
};
use crate::codec::{DecodedFrame, Decoder, DecoderSetup, Sample};
use crate::foundation::error::{RenderError, RenderResult};

struct Session {
    process: FfmpegProcess,
    length_size: usize,
    /// Annex-B VPS/SPS/PPS, repeated before every sync sample.
    parameter_sets: Vec<u8>,
    width: u32,
    height: u32,
}

impl Session {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// H.264/HEVC decoder: length-prefixed samples in, straight RGBA frames out.
///
/// Samples are rewritten to Annex-B and piped into `ffmpeg`. Frames come back in
/// presentation order and are matched to the smallest outstanding composition time.
#[derive(Default)]
pub struct FfmpegDecoder {
    session: Option<Session>,
    /// cts -> duration of every sample not yet matched to a frame
    pending: BTreeMap<u64, u32>,
    output: Vec<u8>,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cut complete frames off the front of `output`, pairing each with the earliest pending cts.
fn split_frames(
    output: &mut Vec<u8>,
    pending: &mut BTreeMap<u64, u32>,
    width: u32,
    height: u32,
) -> Vec<DecodedFrame> {
    let frame_len = width as usize * height as usize * 4;
    let mut frames = Vec::new();
    let mut consumed = 0;
    while output.len() - consumed >= frame_len {
        let Some((pts, duration)) = pending.pop_first() else {
            tracing::warn!("decoder produced more frames than samples, dropping extra");
            consumed = output.len();
            break;
        };
        frames.push(DecodedFrame {
            pts,
            duration,
            width,
            height,
            rgba: output[consumed..consumed + frame_len].to_vec(),
        });
        consumed += frame_len;
    }
    output.drain(..consumed);
    frames
}

fn decoder_args(codec: NalCodec, width: u32, height: u32) -> Vec<String> {
    let demuxer = match codec {
        NalCodec::Avc => "h264",
        NalCodec::Hevc => "hevc",
    };
    let scale = format!("scale={width}:{height}");
    [
        "-loglevel",
        "error",
        "-f",
        demuxer,
        "-i",
        "pipe:0",
        "-an",
        "-fps_mode",
        "passthrough",
        "-vf",
        scale.as_str(),
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

impl Decoder for FfmpegDecoder {
    fn configure(&mut self, setup: &DecoderSetup) -> RenderResult<()> {
        let codec = NalCodec::from_codec_string(&setup.codec).ok_or_else(|| {
            RenderError::unsupported_codec(format!("cannot decode '{}'", setup.codec))
        })?;
        if setup.coded_width == 0 || setup.coded_height == 0 {
            return Err(RenderError::decode("decoder needs non-zero coded dimensions"));
        }

        let (length_size, parameter_sets) = match (codec, setup.config.as_ref()) {
            (NalCodec::Avc, Some(record)) => {
                let cfg = AvcConfig::parse(record.as_bytes())?;
                (cfg.length_size, parameter_sets_annexb(cfg.parameter_sets()))
            }
            (NalCodec::Hevc, Some(record)) => {
                let cfg = HevcConfig::parse(record.as_bytes())?;
                (cfg.length_size, parameter_sets_annexb(cfg.parameter_sets()))
            }
            // avc3/hev1 streams carry their parameter sets in-band
            (_, None) => (4, Vec::new()),
        };

        let process = FfmpegProcess::spawn(
            "decoder",
            &decoder_args(codec, setup.coded_width, setup.coded_height),
        )?;
        tracing::debug!(
            codec = %setup.codec,
            width = setup.coded_width,
            height = setup.coded_height,
            "decoder configured"
        );
        self.session = Some(Session {
            process,
            length_size: usize::from(length_size),
            parameter_sets,
            width: setup.coded_width,
            height: setup.coded_height,
        });
        self.pending.clear();
        self.output.clear();
        Ok(())
    }

    fn decode(&mut self, sample: Sample) -> RenderResult<Vec<DecodedFrame>> {
        let s = self
            .session
            .as_mut()
            .ok_or_else(|| RenderError::decode("decoder used before configure"))?;
        let mut annexb = length_prefixed_to_annexb(&sample.data, s.length_size)?;
        if sample.is_sync && !s.parameter_sets.is_empty() {
            annexb.splice(0..0, s.parameter_sets.iter().copied());
        }
        s.process.write(&annexb)?;
        self.pending.insert(sample.cts, sample.duration);

        s.process.drain_output(&mut self.output);
        if self.output.len() < s.frame_len() {
            return Ok(Vec::new());
        }
        Ok(split_frames(
            &mut self.output,
            &mut self.pending,
            s.width,
            s.height,
        ))
    }

    fn flush(&mut self) -> RenderResult<Vec<DecodedFrame>> {
        let Some(session) = self.session.take() else {
            return Ok(Vec::new());
        };
        let (width, height) = (session.width, session.height);
        session
            .process
            .finish(&mut self.output)
            .map_err(|e| RenderError::decode(e.to_string()))?;

        let frames = split_frames(&mut self.output, &mut self.pending, width, height);
        if !self.pending.is_empty() {
            tracing::warn!(
                missing = self.pending.len(),
                "decoder returned fewer frames than samples"
            );
        }
        self.pending.clear();
        self.output.clear();
        Ok(frames)
    }
}
