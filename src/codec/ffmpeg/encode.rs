use std::collections::VecDeque;

use crate::codec::ffmpeg::FfmpegProcess;
use crate::codec::negotiate::{EncoderSettings, H264Profile};
use crate::codec::nal::{AvcConfig, HevcConfig, NalCodec, annexb_nals, to_length_prefixed};
use crate::codec::{DecoderConfigRecord, EncodeFrame, EncodedChunk, Encoder, EncoderConfig};
use crate::foundation::error::{RenderError, RenderResult};

/// `ffmpeg` output arguments for an encoder configuration, shared with the probe.
///
/// B-frames are disabled so access units come out in input order, and every access
/// unit starts with a delimiter so the byte stream can be split without parsing slices.
pub(crate) fn encoder_args(config: &EncoderConfig) -> RenderResult<Vec<String>> {
    let settings = EncoderSettings::from_codec(&config.codec)?;
    let gop = config.keyframe_interval.max(1).to_string();
    let mut args: Vec<String> = vec!["-an".into(), "-pix_fmt".into(), "yuv420p".into()];
    match &settings {
        EncoderSettings::H264 { profile, level } => {
            args.extend(
                [
                    "-c:v",
                    "libx264",
                    "-profile:v",
                    profile.name(),
                    "-level:v",
                    level.as_str(),
                    "-bf",
                    "0",
                    "-g",
                    gop.as_str(),
                    "-keyint_min",
                    gop.as_str(),
                    "-sc_threshold",
                    "0",
                    "-x264-params",
                    "aud=1",
                ]
                .map(str::to_owned),
            );
            if *profile == H264Profile::Baseline {
                args.extend(["-coder".to_owned(), "0".to_owned()]);
            }
        }
        EncoderSettings::Hevc { level } => {
            let x265_params =
                format!(
                "aud=1:bframes=0:keyint={gop}:min-keyint={gop}:scenecut=0:level-idc={level}:log-level=error"
            );
            args.extend(
                [
                    "-c:v",
                    "libx265",
                    "-profile:v",
                    "main",
                    "-x265-params",
                    x265_params.as_str(),
                ]
                .map(str::to_owned),
            );
        }
    }
    args.extend(["-b:v".to_owned(), config.bitrate.to_string()]);
    Ok(args)
}

pub(crate) fn raw_input_args(config: &EncoderConfig) -> Vec<String> {
    let size = format!("{}x{}", config.width, config.height);
    let rate = format_rate(config.framerate);
    [
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        size.as_str(),
        "-r",
        rate.as_str(),
        "-i",
        "pipe:0",
    ]
    .map(str::to_owned)
    .to_vec()
}

fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{fps:.3}")
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingTime {
    pts: u64,
    duration: u32,
}

struct Session {
    process: FfmpegProcess,
    codec: NalCodec,
    fourcc: &'static str,
    frame_len: usize,
}

/// H.264/HEVC encoder: RGBA frames in, length-prefixed access units out.
///
/// Frame times are queued in submission order and attached to access units as they
/// come back. The first chunk carrying parameter sets also carries the `avcC`/`hvcC`
/// record.
#[derive(Default)]
pub struct FfmpegEncoder {
    session: Option<Session>,
    times: VecDeque<PendingTime>,
    annexb: Vec<u8>,
    config_sent: bool,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn buffered Annex-B bytes into chunks. Without `final_unit` the last access unit
    /// stays buffered because its end is not known yet.
    fn split_access_units(
        &mut self,
        codec: NalCodec,
        fourcc: &'static str,
        final_unit: bool,
    ) -> RenderResult<Vec<EncodedChunk>> {
        let data = std::mem::take(&mut self.annexb);
        let mut bounds = access_unit_starts(&data, codec);
        // bytes before the first delimiter belong to the first unit
        if let Some(first) = bounds.first_mut() {
            *first = 0;
        }
        let keep_from = if final_unit {
            if !data.is_empty() {
                if bounds.is_empty() {
                    bounds.push(0);
                }
                bounds.push(data.len());
            }
            data.len()
        } else {
            bounds.last().copied().unwrap_or(0)
        };

        let mut chunks = Vec::new();
        for pair in bounds.windows(2) {
            if let Some(chunk) = self.build_chunk(&data[pair[0]..pair[1]], codec, fourcc)? {
                chunks.push(chunk);
            }
        }
        self.annexb = data[keep_from..].to_vec();
        Ok(chunks)
    }

    fn build_chunk(
        &mut self,
        au: &[u8],
        codec: NalCodec,
        fourcc: &str,
    ) -> RenderResult<Option<EncodedChunk>> {
        let nals = annexb_nals(au);
        let (sets, payload): (Vec<&[u8]>, Vec<&[u8]>) = nals
            .into_iter()
            .filter(|n| codec.nal_type(n) != Some(codec.aud_type()))
            .partition(|n| codec.is_parameter_set(n));
        if payload.is_empty() {
            return Ok(None);
        }

        let time = self.times.pop_front().ok_or_else(|| {
            RenderError::encode("encoder produced more access units than frames")
        })?;
        let is_key = payload.iter().any(|n| codec.is_key_nal(n));
        let config = if !self.config_sent && !sets.is_empty() {
            self.config_sent = true;
            Some(config_record(codec, &sets)?)
        } else {
            None
        };
        if let Some(cfg) = config.as_ref() {
            tracing::debug!(fourcc, bytes = cfg.as_bytes().len(), "encoder config record ready");
        }
        Ok(Some(EncodedChunk {
            data: to_length_prefixed(payload),
            pts: time.pts,
            duration: time.duration,
            is_key,
            config,
        }))
    }
}

fn config_record(codec: NalCodec, sets: &[&[u8]]) -> RenderResult<DecoderConfigRecord> {
    let bytes = match codec {
        NalCodec::Avc => {
            let of_type = |t: u8| {
                sets.iter()
                    .filter(|n| codec.nal_type(n) == Some(t))
                    .map(|n| n.to_vec())
                    .collect::<Vec<_>>()
            };
            AvcConfig::from_parameter_sets(of_type(7), of_type(8))?.to_bytes()
        }
        NalCodec::Hevc => HevcConfig::from_parameter_sets(sets)?.to_bytes(),
    };
    Ok(DecoderConfigRecord(bytes))
}

/// Byte offsets of every access unit delimiter's start code.
pub(crate) fn access_unit_starts(data: &[u8], codec: NalCodec) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if codec.nal_type(&data[i + 3..]) == Some(codec.aud_type()) {
                let start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
                starts.push(start);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    starts
}

impl Encoder for FfmpegEncoder {
    fn configure(&mut self, config: &EncoderConfig, timescale: u32) -> RenderResult<()> {
        if config.width == 0 || config.height == 0 {
            return Err(RenderError::encode("encoder width/height must be non-zero"));
        }
        if !config.width.is_multiple_of(2) || !config.height.is_multiple_of(2) {
            return Err(RenderError::encode(
                "encoder width/height must be even (required for yuv420p output)",
            ));
        }
        if config.framerate.is_nan() || config.framerate <= 0.0 {
            return Err(RenderError::encode("encoder framerate must be positive"));
        }
        let (codec, fourcc, format) = match EncoderSettings::from_codec(&config.codec)? {
            EncoderSettings::H264 { .. } => (NalCodec::Avc, "avc1", "h264"),
            EncoderSettings::Hevc { .. } => (NalCodec::Hevc, "hvc1", "hevc"),
        };

        let mut args = raw_input_args(config);
        args.extend(encoder_args(config)?);
        args.extend(["-f".to_owned(), format.to_owned(), "pipe:1".to_owned()]);
        let process = FfmpegProcess::spawn("encoder", &args)?;
        tracing::info!(
            codec = %config.codec,
            width = config.width,
            height = config.height,
            bitrate = config.bitrate,
            timescale,
            "encoder configured"
        );

        self.session = Some(Session {
            process,
            codec,
            fourcc,
            frame_len: config.width as usize * config.height as usize * 4,
        });
        self.times.clear();
        self.annexb.clear();
        self.config_sent = false;
        Ok(())
    }

    fn encode(&mut self, frame: EncodeFrame<'_>) -> RenderResult<Vec<EncodedChunk>> {
        let s = self
            .session
            .as_mut()
            .ok_or_else(|| RenderError::encode("encoder used before configure"))?;
        if frame.rgba.len() != s.frame_len {
            return Err(RenderError::encode(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.rgba.len(),
                s.frame_len
            )));
        }
        s.process.write(frame.rgba)?;
        self.times.push_back(PendingTime {
            pts: frame.pts,
            duration: frame.duration,
        });
        s.process.drain_output(&mut self.annexb);
        let (codec, fourcc) = (s.codec, s.fourcc);
        self.split_access_units(codec, fourcc, false)
    }

    fn flush(&mut self) -> RenderResult<Vec<EncodedChunk>> {
        let Some(session) = self.session.take() else {
            return Ok(Vec::new());
        };
        session
            .process
            .finish(&mut self.annexb)
            .map_err(|e| RenderError::encode(e.to_string()))?;

        let chunks = self.split_access_units(session.codec, session.fourcc, true)?;
        if !self.times.is_empty() {
            tracing::warn!(
                missing = self.times.len(),
                "encoder returned fewer access units than frames"
            );
            self.times.clear();
        }
        Ok(chunks)
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/codec/encode.rs"]
mod tests;
