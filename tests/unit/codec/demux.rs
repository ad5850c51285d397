use std::time::Duration;

use super::*;
use crate::codec::mp4::mux::Mp4Muxer;
use crate::codec::nal::AvcConfig;
use crate::codec::{MuxSample, Muxer, TrackConfig};

fn two_track_file(video_samples: u8) -> Vec<u8> {
    let avc = AvcConfig::from_parameter_sets(
        vec![vec![0x67, 0x4d, 0x00, 0x28, 0x01]],
        vec![vec![0x68, 0xCE]],
    )
    .unwrap();
    let mut m = Mp4Muxer::new();
    let v = m
        .add_track(TrackConfig {
            kind: TrackKind::Video,
            codec: "avc1.4d0028".into(),
            timescale: 30_000,
            width: 640,
            height: 360,
            sample_rate: 0,
            channels: 0,
            config: Some(DecoderConfigRecord(avc.to_bytes())),
        })
        .unwrap();
    let a = m
        .add_track(TrackConfig {
            kind: TrackKind::Audio,
            codec: "mp4a.40.2".into(),
            timescale: 44_100,
            width: 0,
            height: 0,
            sample_rate: 44_100,
            channels: 1,
            config: Some(DecoderConfigRecord(vec![0x12, 0x08])),
        })
        .unwrap();
    for i in 0..video_samples {
        m.add_sample(
            v,
            MuxSample {
                data: vec![i; 4],
                dts: u64::from(i) * 1001,
                cts: u64::from(i) * 1001,
                duration: 1001,
                is_sync: i == 0,
            },
        )
        .unwrap();
    }
    m.add_sample(
        a,
        MuxSample {
            data: vec![0xA0; 6],
            dts: 0,
            cts: 0,
            duration: 1024,
            is_sync: true,
        },
    )
    .unwrap();
    m.flush().unwrap()
}

fn collect_all(demux: &mut Mp4Demuxer, ids: &[u32], opts: &ExtractOptions) -> RenderResult<(Vec<Sample>, ExtractionReport)> {
    let mut got = Vec::new();
    let report = demux.extract_samples(ids, opts, &mut |s| {
        got.push(s);
        Ok(ControlFlow::Continue(()))
    })?;
    Ok((got, report))
}

/// Rewrites the size of the last `stsz` entry so the sample runs past the end of the file.
fn oversize_last_video_sample(bytes: &mut [u8]) {
    let pos = bytes
        .windows(4)
        .position(|w| w == b"stsz")
        .expect("stsz box");
    let count = u32::from_be_bytes(bytes[pos + 12..pos + 16].try_into().unwrap()) as usize;
    let entry = pos + 16 + 4 * (count - 1);
    bytes[entry..entry + 4].copy_from_slice(&0x00FF_FFFFu32.to_be_bytes());
}

#[test]
fn parses_track_metadata() {
    let demux = Mp4Demuxer::parse(Arc::from(two_track_file(3))).unwrap();
    let info = demux.info();
    let v = info.video_track().unwrap();
    assert_eq!(v.codec, "avc1.4d0028");
    assert_eq!(v.sample_count, 3);
    assert_eq!(v.duration, 3003);
    assert!((v.duration_secs() - 0.1001).abs() < 1e-9);
    let a = info.audio_track().unwrap();
    assert_eq!(a.codec, "mp4a.40.2");
    assert_eq!(a.channels, 1);
    assert_eq!(info.timescale, 1000);
}

#[test]
fn delivers_every_sample_in_storage_order() {
    let mut demux = Mp4Demuxer::parse(Arc::from(two_track_file(4))).unwrap();
    let v = demux.info().video_track().unwrap().id;
    let a = demux.info().audio_track().unwrap().id;
    let (got, report) = collect_all(&mut demux, &[a, v], &ExtractOptions::default()).unwrap();
    assert_eq!(got.len(), 5);
    assert_eq!(report.delivered(v), 4);
    assert_eq!(report.delivered(a), 1);
    assert!(!report.truncated && !report.stopped);
    // video samples are written first
    assert!(got[..4].iter().all(|s| s.track_id == v));
    assert_eq!(got[4].data, vec![0xA0; 6]);
    assert_eq!(got[2].timescale, 30_000);
}

#[test]
fn break_stops_extraction() {
    let mut demux = Mp4Demuxer::parse(Arc::from(two_track_file(6))).unwrap();
    let v = demux.info().video_track().unwrap().id;
    let mut seen = 0;
    let report = demux
        .extract_samples(&[v], &ExtractOptions::default(), &mut |_| {
            seen += 1;
            Ok(if seen == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .unwrap();
    assert_eq!(seen, 2);
    assert!(report.stopped);
    assert!(!report.truncated);
}

#[test]
fn sink_errors_propagate() {
    let mut demux = Mp4Demuxer::parse(Arc::from(two_track_file(2))).unwrap();
    let v = demux.info().video_track().unwrap().id;
    let err = demux
        .extract_samples(&[v], &ExtractOptions::default(), &mut |_| {
            Err(RenderError::decode("boom"))
        })
        .unwrap_err();
    assert!(matches!(err, RenderError::Decode(_)));
}

#[test]
fn truncated_track_warns_or_fails_per_policy() {
    let mut bytes = two_track_file(3);
    oversize_last_video_sample(&mut bytes);
    let source: Arc<[u8]> = Arc::from(bytes);

    let mut demux = Mp4Demuxer::parse(Arc::clone(&source)).unwrap();
    let v = demux.info().video_track().unwrap().id;
    let (got, report) = collect_all(&mut demux, &[v], &ExtractOptions::default()).unwrap();
    assert_eq!(got.len(), 2);
    assert!(report.truncated);

    let strict = ExtractOptions {
        truncation: TruncationPolicy::Error,
        ..ExtractOptions::default()
    };
    let mut demux = Mp4Demuxer::parse(source).unwrap();
    assert!(matches!(
        collect_all(&mut demux, &[v], &strict),
        Err(RenderError::Parse(_))
    ));
}

#[test]
fn unknown_track_id_is_missing_track() {
    let mut demux = Mp4Demuxer::parse(Arc::from(two_track_file(1))).unwrap();
    assert!(matches!(
        demux.extract_track_config(99),
        Err(RenderError::MissingTrack(_))
    ));
    assert!(matches!(
        collect_all(&mut demux, &[99], &ExtractOptions::default()),
        Err(RenderError::MissingTrack(_))
    ));
}

#[test]
fn rejects_empty_and_moovless_input() {
    assert!(matches!(
        Mp4Demuxer::parse(Arc::from(Vec::new())),
        Err(RenderError::Parse(_))
    ));
    let mut only_ftyp = Vec::new();
    crate::codec::mp4::write_box(&mut only_ftyp, b"ftyp", |out| out.extend_from_slice(b"isom"));
    assert!(matches!(
        Mp4Demuxer::parse(Arc::from(only_ftyp)),
        Err(RenderError::Parse(_))
    ));
}

/// Overwrites the `stsz` header fields of the first track.
fn patch_stsz(bytes: &mut [u8], fixed: u32, count: u32) {
    let pos = bytes
        .windows(4)
        .position(|w| w == b"stsz")
        .expect("stsz box");
    bytes[pos + 8..pos + 12].copy_from_slice(&fixed.to_be_bytes());
    bytes[pos + 12..pos + 16].copy_from_slice(&count.to_be_bytes());
}

#[test]
fn fixed_sample_size_larger_than_the_file_is_rejected() {
    let mut bytes = two_track_file(1);
    patch_stsz(&mut bytes, 1, u32::MAX);
    assert!(matches!(
        Mp4Demuxer::parse(Arc::from(bytes)),
        Err(RenderError::Parse(_))
    ));
}

#[test]
fn sample_counts_beyond_the_box_payload_are_rejected() {
    let mut bytes = two_track_file(1);
    patch_stsz(&mut bytes, 0, u32::MAX);
    assert!(matches!(
        Mp4Demuxer::parse(Arc::from(bytes)),
        Err(RenderError::Parse(_))
    ));

    let mut bytes = two_track_file(2);
    let pos = bytes
        .windows(4)
        .position(|w| w == b"stco")
        .expect("stco box");
    bytes[pos + 8..pos + 12].copy_from_slice(&0x4000_0000u32.to_be_bytes());
    assert!(matches!(
        Mp4Demuxer::parse(Arc::from(bytes)),
        Err(RenderError::Parse(_))
    ));
}

#[test]
fn oversized_time_to_sample_runs_are_clamped() {
    let mut bytes = two_track_file(2);
    let pos = bytes
        .windows(4)
        .position(|w| w == b"stts")
        .expect("stts box");
    // single run: count at +12, delta at +16
    bytes[pos + 12..pos + 16].copy_from_slice(&u32::MAX.to_be_bytes());
    let demux = Mp4Demuxer::parse(Arc::from(bytes)).unwrap();
    assert_eq!(demux.info().video_track().unwrap().sample_count, 2);
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn stalled_reader_truncates_or_fails_per_policy() {
    let source: Arc<[u8]> = Arc::from(two_track_file(3));
    let opts = ExtractOptions {
        stall_timeout: Duration::from_millis(20),
        ..ExtractOptions::default()
    };

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .finish();
    let (got, report) = tracing::subscriber::with_default(subscriber, || {
        let mut demux = Mp4Demuxer::parse(Arc::clone(&source)).unwrap();
        demux.read_delay = Duration::from_millis(300);
        let v = demux.info().video_track().unwrap().id;
        collect_all(&mut demux, &[v], &opts).unwrap()
    });
    assert!(got.len() < 3);
    assert!(report.truncated);
    assert!(!report.stopped);
    let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("sample extraction stalled"));

    let strict = ExtractOptions {
        truncation: TruncationPolicy::Error,
        ..opts
    };
    let mut demux = Mp4Demuxer::parse(source).unwrap();
    demux.read_delay = Duration::from_millis(300);
    let v = demux.info().video_track().unwrap().id;
    assert!(matches!(
        collect_all(&mut demux, &[v], &strict),
        Err(RenderError::Parse(_))
    ));
}

#[test]
fn leading_empty_edit_delays_every_sample() {
    let mut m = Mp4Muxer::new();
    let a = m
        .add_track(TrackConfig {
            kind: TrackKind::Audio,
            codec: "mp4a.40.2".into(),
            timescale: 48_000,
            width: 0,
            height: 0,
            sample_rate: 48_000,
            channels: 2,
            config: Some(DecoderConfigRecord(vec![0x11, 0x90])),
        })
        .unwrap();
    for dts in [5000u64, 6024, 7048] {
        m.add_sample(
            a,
            MuxSample {
                data: vec![1; 4],
                dts,
                cts: dts,
                duration: 1024,
                is_sync: true,
            },
        )
        .unwrap();
    }
    let bytes = m.flush().unwrap();
    let mut demux = Mp4Demuxer::parse(Arc::from(bytes)).unwrap();
    let (got, _) = collect_all(&mut demux, &[a], &ExtractOptions::default()).unwrap();
    assert_eq!(
        got.iter().map(|s| (s.dts, s.cts)).collect::<Vec<_>>(),
        [(5000, 5000), (6024, 6024), (7048, 7048)]
    );
}
