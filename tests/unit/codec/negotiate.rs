use std::sync::Mutex;

use super::*;

fn base(width: u32, height: u32) -> EncoderConfig {
    EncoderConfig {
        codec: String::new(),
        width,
        height,
        bitrate: 5_000_000,
        framerate: 30.0,
        keyframe_interval: 60,
    }
}

#[test]
fn auto_picks_the_only_accepted_candidate() {
    let probe = |c: &EncoderConfig| c.codec == "avc1.4d0028";
    for preferred in [None, Some("hvc1.1.6.L93.B0"), Some("avc1.640033")] {
        let cfg = select_config(&base(1280, 720), preferred, CodecPreference::Auto, &probe).unwrap();
        assert_eq!(cfg.codec, "avc1.4d0028");
    }
}

#[test]
fn dimensions_round_down_to_even_before_probing() {
    let seen = Mutex::new(Vec::new());
    let probe = |c: &EncoderConfig| {
        seen.lock().unwrap().push((c.width, c.height));
        true
    };
    let cfg = select_config(&base(361, 203), None, CodecPreference::Auto, &probe).unwrap();
    assert_eq!((cfg.width, cfg.height), (360, 202));
    assert_eq!(seen.lock().unwrap()[0], (360, 202));
    assert_eq!(cfg.bitrate, 5_000_000);
}

#[test]
fn candidate_order_follows_mode() {
    let src = Some("avc1.64002a");
    assert_eq!(
        candidate_codecs(src, CodecPreference::Auto),
        [
            "avc1.42001f",
            "avc1.42001e",
            "avc1.4d0028",
            "avc1.4d0029",
            "avc1.640028",
            "avc1.640029",
            "hvc1.1.6.L93.B0",
            "avc1.64002a",
        ]
    );
    let source = candidate_codecs(src, CodecPreference::Source);
    assert_eq!(source[0], "avc1.64002a");
    assert_eq!(source.len(), 8);
    assert_eq!(
        candidate_codecs(src, CodecPreference::H264High),
        ["avc1.640028", "avc1.640029"]
    );
    assert_eq!(candidate_codecs(None, CodecPreference::Hevc), ["hvc1.1.6.L93.B0"]);
    assert_eq!(candidate_codecs(Some(""), CodecPreference::Source).len(), 7);
}

#[test]
fn nothing_accepted_is_unsupported_codec() {
    let probe = |_: &EncoderConfig| false;
    let err = select_config(&base(640, 480), None, CodecPreference::Hevc, &probe).unwrap_err();
    assert!(matches!(err, RenderError::UnsupportedCodec(_)));
    assert!(err.to_string().contains("640x480 using hevc"));
}

#[test]
fn preference_parses_from_kebab_case() {
    assert_eq!("h264-main".parse::<CodecPreference>().unwrap(), CodecPreference::H264Main);
    assert_eq!(
        serde_json::from_str::<CodecPreference>("\"h264-baseline\"").unwrap(),
        CodecPreference::H264Baseline
    );
    assert_eq!(CodecPreference::default().to_string(), "auto");
    assert!("vp9".parse::<CodecPreference>().is_err());
}

#[test]
fn codec_strings_map_to_encoder_settings() {
    assert_eq!(
        EncoderSettings::from_codec("avc1.42001f").unwrap(),
        EncoderSettings::H264 {
            profile: H264Profile::Baseline,
            level: "3.1".into()
        }
    );
    assert_eq!(
        EncoderSettings::from_codec("avc1.640029").unwrap(),
        EncoderSettings::H264 {
            profile: H264Profile::High,
            level: "4.1".into()
        }
    );
    assert_eq!(
        EncoderSettings::from_codec("hvc1.1.6.L93.B0").unwrap(),
        EncoderSettings::Hevc { level: "3.1".into() }
    );
    assert!(EncoderSettings::from_codec("vp09.00.10.08").is_err());
    assert!(EncoderSettings::from_codec("avc1.58001f").is_err());
}
