use std::sync::Mutex;

use super::*;
use crate::codec::mp4::mux::Mp4Muxer;
use crate::codec::DecoderConfigRecord;

/// Emits one chunk per frame; chunks before `config_from` carry no config record.
struct ScriptedEncoder {
    config_from: usize,
    seen: usize,
    pts: Arc<Mutex<Vec<u64>>>,
}

impl Encoder for ScriptedEncoder {
    fn configure(&mut self, _config: &EncoderConfig, _timescale: u32) -> RenderResult<()> {
        Ok(())
    }

    fn encode(&mut self, frame: EncodeFrame<'_>) -> RenderResult<Vec<EncodedChunk>> {
        self.pts.lock().unwrap().push(frame.pts);
        let config = (self.seen >= self.config_from)
            .then(|| DecoderConfigRecord(vec![1, 0x42, 0, 0x1f, 0xFF, 0xE0, 0]));
        self.seen += 1;
        Ok(vec![EncodedChunk {
            data: vec![0, 0, 0, 1, 0x65],
            pts: frame.pts,
            duration: frame.duration,
            is_key: self.seen == 1,
            config,
        }])
    }

    fn flush(&mut self) -> RenderResult<Vec<EncodedChunk>> {
        Ok(Vec::new())
    }
}

fn sink(config_from: usize) -> (EncodeSink, Arc<Mutex<Vec<u64>>>) {
    let pts = Arc::new(Mutex::new(Vec::new()));
    let sink = EncodeSink {
        encoder: Box::new(ScriptedEncoder {
            config_from,
            seen: 0,
            pts: Arc::clone(&pts),
        }),
        muxer: Box::new(Mp4Muxer::new()),
        config: EncoderConfig {
            codec: "avc1.42001f".into(),
            width: 4,
            height: 2,
            bitrate: 1_000,
            framerate: 30.0,
            keyframe_interval: 60,
        },
        timescale: 30,
        video_out: None,
        audio_out: None,
        frames_encoded: 0,
        audio_samples: 0,
        dropped_chunks: 0,
        cancel: CancelHandle::default(),
    };
    (sink, pts)
}

fn frame_jobs(n: u64) -> Receiver<MuxJob> {
    let (tx, rx) = crossbeam_channel::unbounded();
    for i in 0..n {
        tx.send(MuxJob::Frame {
            rgba: vec![0; 4 * 2 * 4],
            pts: i,
            duration: 1,
        })
        .unwrap();
    }
    rx
}

#[test]
fn chunks_before_the_config_record_are_dropped() {
    let (sink, _) = sink(2);
    let done = sink.run(frame_jobs(5)).unwrap();
    assert_eq!(done.dropped_chunks, 2);
    assert_eq!(done.frames_encoded, 3);
    assert_eq!(done.video_out, Some(1));
    assert_eq!(done.muxer.track_count(), 1);
}

#[test]
fn frames_reach_the_encoder_in_order() {
    let (sink, pts) = sink(0);
    let done = sink.run(frame_jobs(7)).unwrap();
    assert_eq!(*pts.lock().unwrap(), (0..7).collect::<Vec<u64>>());
    assert_eq!(done.frames_encoded, 7);
}

#[test]
fn cancelled_sink_skips_queued_frames() {
    let (sink, pts) = sink(0);
    sink.cancel.cancel();
    let done = sink.run(frame_jobs(4)).unwrap();
    assert_eq!(done.frames_encoded, 0);
    assert!(pts.lock().unwrap().is_empty());
}

#[test]
fn audio_without_output_track_is_ignored() {
    let (sink, _) = sink(0);
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(MuxJob::Audio(Sample {
        track_id: 2,
        data: vec![1, 2, 3],
        dts: 0,
        cts: 0,
        duration: 1024,
        is_sync: true,
        timescale: 44_100,
    }))
    .unwrap();
    drop(tx);
    let done = sink.run(rx).unwrap();
    assert_eq!(done.audio_samples, 0);
}

#[test]
fn cancel_handle_is_shared() {
    let a = CancelHandle::default();
    let b = a.clone();
    assert!(!b.is_cancelled());
    a.cancel();
    assert!(b.is_cancelled());
}

#[test]
fn download_creates_parent_directories() {
    let dir = std::env::temp_dir().join(format!("subburn-download-{}", std::process::id()));
    let path = dir.join("nested").join("out.mp4");
    let video = RenderedVideo {
        bytes: vec![1, 2, 3],
        cancelled: false,
        frames_encoded: 0,
        audio_samples: 0,
        encoder: EncoderConfig {
            codec: "avc1.42001f".into(),
            width: 2,
            height: 2,
            bitrate: 1,
            framerate: 30.0,
            keyframe_interval: 1,
        },
        extraction: ExtractionReport::default(),
    };
    video.download(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    assert_eq!(video.buffer(), &[1, 2, 3]);
    std::fs::remove_dir_all(&dir).unwrap();
}
