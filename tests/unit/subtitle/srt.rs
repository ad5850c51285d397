use super::*;

const SAMPLE: &str = "\u{FEFF}1\r\n00:00:00,000 --> 00:00:02,500\r\nFirst line\r\nSecond line\r\n\r\n2\r\n00:00:03.000 --> 00:00:05,000\r\nNext subtitle\r\n";

#[test]
fn parses_bom_crlf_and_dot_separator() {
    let cues = parse_srt(SAMPLE);
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].id, 1);
    assert_eq!(cues[0].start_time, 0.0);
    assert_eq!(cues[0].end_time, 2.5);
    assert_eq!(cues[0].text, "First line\nSecond line");
    assert_eq!(cues[1].start_time, 3.0);
    assert_eq!(cues[1].text, "Next subtitle");
}

#[test]
fn skips_malformed_blocks() {
    let src = "x\n00:00:00,000 --> 00:00:01,000\nbad index\n\n2\nnot a timecode\ntext\n\n3\n00:00:01,000 --> 00:00:02,000\n\n\n4\n01:02:03,004 --> 01:02:04,000\nok\n";
    let cues = parse_srt(src);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].id, 4);
    assert!((cues[0].start_time - 3723.004).abs() < 1e-9);
}

#[test]
fn timestamps_format_with_padding() {
    assert_eq!(format_timestamp(0.0), "00:00:00,000");
    assert_eq!(format_timestamp(3723.004), "01:02:03,004");
    assert_eq!(format_timestamp(59.9996), "00:01:00,000");
}

#[test]
fn generate_sorts_and_reindexes() {
    let cues = vec![
        SubtitleCue::new(7, 3.0, 4.0, "second"),
        SubtitleCue::new(9, 1.0, 2.0, "first"),
    ];
    let out = generate_srt(&cues);
    assert_eq!(
        out,
        "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\n2\n00:00:03,000 --> 00:00:04,000\nsecond\n"
    );
    let back = parse_srt(&out);
    assert_eq!(back.len(), 2);
    assert_eq!(back[1].text, "second");
}

#[test]
fn content_validation_messages() {
    assert_eq!(validate_srt_content("   "), Some("Empty SRT content"));
    assert_eq!(
        validate_srt_content("hello"),
        Some("No valid subtitle cues found")
    );
    assert_eq!(validate_srt_content(SAMPLE), None);
}
