use super::*;
use crate::codec::{DecoderSetup, EncodeFrame, EncoderConfig, Sample};

fn h264_config(width: u32, height: u32) -> EncoderConfig {
    EncoderConfig {
        codec: "avc1.42001f".into(),
        width,
        height,
        bitrate: 500_000,
        framerate: 30.0,
        keyframe_interval: 10,
    }
}

fn gradient(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            rgba.extend_from_slice(&[shade, (x * 4) as u8, (y * 4) as u8, 255]);
        }
    }
    rgba
}

#[test]
fn encode_then_decode_through_ffmpeg() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let backend = FfmpegBackend::new();
    let cfg = h264_config(64, 48);
    if !backend.probe().is_config_supported(&cfg) {
        return;
    }

    let mut encoder = backend.create_encoder().unwrap();
    encoder.configure(&cfg, 30).unwrap();
    let mut chunks = Vec::new();
    for i in 0..6u8 {
        let rgba = gradient(64, 48, i * 40);
        chunks.extend(
            encoder
                .encode(EncodeFrame {
                    rgba: &rgba,
                    pts: u64::from(i),
                    duration: 1,
                })
                .unwrap(),
        );
    }
    chunks.extend(encoder.flush().unwrap());
    assert_eq!(chunks.len(), 6);
    assert!(chunks[0].is_key);
    let config = chunks[0].config.clone().expect("first chunk carries avcC");
    assert!(chunks[1..].iter().all(|c| c.config.is_none()));
    assert_eq!(
        chunks.iter().map(|c| c.pts).collect::<Vec<_>>(),
        [0, 1, 2, 3, 4, 5]
    );

    let mut decoder = backend.create_decoder().unwrap();
    decoder
        .configure(&DecoderSetup {
            codec: "avc1.42001f".into(),
            config: Some(config),
            coded_width: 64,
            coded_height: 48,
        })
        .unwrap();
    let mut frames = Vec::new();
    for c in chunks {
        frames.extend(
            decoder
                .decode(Sample {
                    track_id: 1,
                    data: c.data,
                    dts: c.pts,
                    cts: c.pts,
                    duration: c.duration,
                    is_sync: c.is_key,
                    timescale: 30,
                })
                .unwrap(),
        );
    }
    frames.extend(decoder.flush().unwrap());
    assert_eq!(frames.len(), 6);
    assert_eq!(frames[5].pts, 5);
    assert_eq!(frames[0].rgba.len(), 64 * 48 * 4);
}

#[test]
fn probe_rejects_unknown_codecs() {
    let probe = FfmpegProbe::new();
    let mut cfg = h264_config(64, 48);
    cfg.codec = "vp09.00.10.08".into();
    assert!(!probe.is_config_supported(&cfg));
}

#[test]
fn backend_opens_native_containers() {
    let backend = FfmpegBackend::new();
    assert!(matches!(
        backend.open_demuxer(std::sync::Arc::from(Vec::new())),
        Err(RenderError::Parse(_))
    ));
    let mut muxer = backend.create_muxer().unwrap();
    assert_eq!(muxer.track_count(), 0);
    assert!(muxer.flush().is_err());
}

#[test]
fn process_reports_nonzero_exit() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let args: Vec<String> = ["-loglevel", "error", "-f", "nosuchformat", "-i", "pipe:0"]
        .map(str::to_owned)
        .to_vec();
    let process = FfmpegProcess::spawn("test", &args).unwrap();
    let mut out = Vec::new();
    let err = process.finish(&mut out).unwrap_err();
    assert!(err.to_string().contains("exited with status"));
}
