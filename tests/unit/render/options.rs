use super::*;

#[test]
fn defaults_are_valid() {
    let opts = RenderOptions::default();
    assert!(opts.validate().is_ok());
    assert_eq!(opts.codec_preference, CodecPreference::Auto);
    assert_eq!(opts.preview.every_frames, 30);
    assert_eq!(opts.channel_capacity, 16);
}

#[test]
fn deserializes_camel_case_with_defaults() {
    let opts: RenderOptions = serde_json::from_str(
        r#"{"width":1280,"height":720,"codecPreference":"h264-main","keyframeInterval":30,"preview":{"everyFrames":0}}"#,
    )
    .unwrap();
    assert_eq!(opts.width, Some(1280));
    assert_eq!(opts.height, Some(720));
    assert_eq!(opts.codec_preference, CodecPreference::H264Main);
    assert_eq!(opts.keyframe_interval, 30);
    assert_eq!(opts.preview.every_frames, 0);
    assert_eq!(opts.preview.scale_divisor, 4);
    assert_eq!(opts.bitrate, 5_000_000);
    assert_eq!(opts.truncation, TruncationPolicy::Warn);
}

#[test]
fn validate_rejects_bad_values() {
    let cases = [
        RenderOptions {
            width: Some(0),
            ..RenderOptions::default()
        },
        RenderOptions {
            framerate: f64::NAN,
            ..RenderOptions::default()
        },
        RenderOptions {
            framerate: 0.0,
            ..RenderOptions::default()
        },
        RenderOptions {
            bitrate: 0,
            ..RenderOptions::default()
        },
        RenderOptions {
            keyframe_interval: 0,
            ..RenderOptions::default()
        },
        RenderOptions {
            channel_capacity: 0,
            ..RenderOptions::default()
        },
        RenderOptions {
            preview: PreviewOptions {
                jpeg_quality: 0,
                ..PreviewOptions::default()
            },
            ..RenderOptions::default()
        },
    ];
    for opts in cases {
        assert!(
            matches!(opts.validate(), Err(RenderError::Validation(_))),
            "{opts:?}"
        );
    }
}

#[test]
fn disabled_preview_skips_preview_checks() {
    let opts = RenderOptions {
        preview: PreviewOptions {
            every_frames: 0,
            scale_divisor: 0,
            jpeg_quality: 0,
        },
        ..RenderOptions::default()
    };
    assert!(opts.validate().is_ok());
}

#[test]
fn extract_options_carry_stall_and_truncation() {
    let opts = RenderOptions {
        stall_timeout_ms: 250,
        truncation: TruncationPolicy::Error,
        channel_capacity: 3,
        ..RenderOptions::default()
    };
    let ex = opts.extract_options();
    assert_eq!(ex.stall_timeout, Duration::from_millis(250));
    assert_eq!(ex.truncation, TruncationPolicy::Error);
    assert_eq!(ex.channel_capacity, 3);
}
