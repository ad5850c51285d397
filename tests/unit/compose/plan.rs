use super::*;
use crate::subtitle::cue::WordTiming;
use crate::subtitle::style::StyleOverride;

/// Ten pixels per character, independent of the font.
struct FixedWidth;

impl TextMeasurer for FixedWidth {
    fn measure(&mut self, text: &str, _font: &FontSpec) -> f64 {
        text.chars().count() as f64 * 10.0
    }
}

fn hd(time: f64) -> FrameGeometry {
    FrameGeometry {
        width: 1920,
        height: 1080,
        time,
    }
}

fn plan(time: f64, cues: &[SubtitleCue], style: &SubtitleStyle) -> Vec<DrawOp> {
    let presets = PresetRegistry::builtin().unwrap();
    plan_frame(hd(time), cues, style, &presets, &mut FixedWidth).unwrap()
}

fn style_with(effect: &str) -> SubtitleStyle {
    SubtitleStyle {
        effect: effect.to_string(),
        ..SubtitleStyle::default()
    }
}

fn texts(ops: &[DrawOp]) -> Vec<&str> {
    ops.iter().filter_map(DrawOp::text).collect()
}

fn run(op: &DrawOp) -> &TextRun {
    match &op.kind {
        DrawKind::Text(run) => run,
        other => panic!("expected text op, got {other:?}"),
    }
}

fn timed_cue() -> SubtitleCue {
    SubtitleCue::new(1, 2.0, 3.0, "hello world").with_words(vec![
        WordTiming {
            word: "hello".into(),
            start: 2.0,
            end: 2.5,
        },
        WordTiming {
            word: "world".into(),
            start: 2.5,
            end: 3.0,
        },
    ])
}

#[test]
fn cue_is_drawn_only_inside_its_interval() {
    let cues = [SubtitleCue::new(1, 1.0, 3.0, "Hello")];
    let style = SubtitleStyle::default();
    assert!(plan(0.5, &cues, &style).is_empty());
    assert_eq!(texts(&plan(2.0, &cues, &style)), ["Hello"]);
    assert!(plan(3.5, &cues, &style).is_empty());
    assert!(plan(3.0, &cues, &style).is_empty());
}

#[test]
fn bottom_line_sits_above_margin() {
    let cues = [SubtitleCue::new(1, 0.0, 2.0, "Hi")];
    let ops = plan(1.0, &cues, &SubtitleStyle::default());
    let r = run(&ops[0]);
    assert_eq!(r.center, Point::new(960.0, 980.0));
    assert_eq!(r.font.size_px, 60.0);
    assert_eq!(r.font.family, "Arial");
    let stroke = r.stroke.as_ref().unwrap();
    assert_eq!(stroke.width, SubtitleStyle::default().outline_width * 2.0);
}

#[test]
fn bilingual_original_is_stacked_above() {
    let mut cue = SubtitleCue::new(1, 0.0, 2.0, "Bonjour");
    cue.original_text = Some("Hello".into());
    let style = SubtitleStyle {
        show_bilingual: true,
        ..SubtitleStyle::default()
    };
    let ops = plan(1.0, &[cue], &style);
    assert_eq!(texts(&ops), ["Hello", "Bonjour"]);
    assert_eq!(run(&ops[1]).center.y, 980.0);
    assert!((run(&ops[0]).center.y - (980.0 - 72.0)).abs() < 1e-9);
}

#[test]
fn typewriter_reveals_by_progress() {
    let cues = [SubtitleCue::new(1, 0.0, 4.0, "abcd")];
    let ops = plan(2.0, &cues, &style_with("typewriter"));
    assert_eq!(texts(&ops), ["ab"]);
    assert!(plan(0.5, &cues, &style_with("typewriter")).is_empty());
}

#[test]
fn typewriter_follows_the_resolved_preset() {
    let json = r#"{
        "aliases": {"type-on": "keys"},
        "presets": [
            {"id": "keys", "scope": "line", "reveal": "typewriter"},
            {"id": "typewriter", "scope": "line"}
        ]
    }"#;
    let presets = PresetRegistry::from_json(json).unwrap();
    let cues = [SubtitleCue::new(1, 0.0, 4.0, "abcd")];
    let at = |effect: &str| {
        plan_frame(hd(2.0), &cues, &style_with(effect), &presets, &mut FixedWidth).unwrap()
    };
    assert_eq!(texts(&at("type-on")), ["ab"]);
    assert_eq!(texts(&at("keys")), ["ab"]);
    assert_eq!(texts(&at("typewriter")), ["abcd"]);
}

#[test]
fn fade_ramps_opacity_on_entry() {
    let cues = [SubtitleCue::new(1, 0.0, 3.0, "Fade")];
    let style = style_with("fade");
    let early = plan(0.15, &cues, &style);
    let op = early[0].state.opacity;
    assert!(op > 0.0 && op < 1.0, "opacity {op}");
    let mid = plan(1.5, &cues, &style);
    assert_eq!(mid[0].state.opacity, 1.0);
}

#[test]
fn wipe_clips_with_its_own_duration() {
    let cues = [SubtitleCue::new(1, 0.0, 3.0, "Wipe")];
    let ops = plan(0.25, &cues, &style_with("wipe"));
    let clip = &ops[0].state.clips[0];
    assert!((clip.rect.width() - 1920.0 * 0.5).abs() < 1e-9);
    assert!(plan(1.5, &cues, &style_with("wipe"))[0].state.clips.is_empty());
}

#[test]
fn karaoke_fill_fraction_follows_word_window() {
    assert_eq!(karaoke_fill_fraction(2.0, 2.5, 2.0), 0.0);
    assert!((karaoke_fill_fraction(2.0, 2.5, 2.25) - 0.5).abs() < 1e-12);
    assert_eq!(karaoke_fill_fraction(2.0, 2.5, 2.5), 1.0);
    assert_eq!(karaoke_fill_fraction(2.0, 2.5, 2.75), 1.0);
    assert_eq!(karaoke_fill_fraction(2.0, 2.0, 2.0), 1.0);
}

#[test]
fn karaoke_clips_active_word_highlight() {
    let style = style_with("karaoke");
    let ops = plan(2.25, &[timed_cue()], &style);
    assert_eq!(texts(&ops), ["hello", "hello", "world"]);
    let overlay = &ops[1];
    assert_eq!(overlay.state.clips.len(), 1);
    assert!((overlay.state.clips[0].rect.width() - 25.0).abs() < 1e-9);
    let r = run(overlay);
    assert_eq!(r.fill, style.highlight());
    assert!(r.stroke.is_none());
    assert!(r.shadow.is_none());
}

#[test]
fn karaoke_fills_finished_words() {
    let ops = plan(2.75, &[timed_cue()], &style_with("karaoke"));
    assert_eq!(texts(&ops), ["hello", "hello", "world", "world"]);
    assert!(ops[1].state.clips.is_empty());
    assert_eq!(ops[3].state.clips.len(), 1);
}

#[test]
fn words_are_laid_out_around_center() {
    let ops = plan(2.25, &[timed_cue()], &style_with("karaoke"));
    // 50 + 16 + 50 wide, centered on 960
    assert_eq!(run(&ops[0]).center.x, 960.0 - 58.0 + 25.0);
    assert_eq!(run(&ops[2]).center.x, 960.0 + 58.0 - 25.0);
}

#[test]
fn active_word_index_without_timing_uses_progress() {
    let cue = SubtitleCue::new(1, 0.0, 1.0, "a b c d");
    assert_eq!(active_word_index(&cue, 4, 0.6), Some(2));
    assert_eq!(active_word_index(&cue, 4, 1.0), None);
    assert_eq!(active_word_index(&timed_cue(), 2, 2.7), Some(1));
    assert_eq!(active_word_index(&timed_cue(), 2, 1.0), None);
}

#[test]
fn synthesized_word_windows_split_duration() {
    let cue = SubtitleCue::new(1, 1.0, 3.0, "a b c d");
    assert_eq!(word_window(&cue, 1, 4), Some((1.5, 2.0)));
    assert_eq!(word_window(&cue, 4, 4), None);
}

#[test]
fn box_decor_is_drawn_behind_active_word() {
    let ops = plan(2.25, &[timed_cue()], &style_with("highlight"));
    assert!(matches!(ops[0].kind, DrawKind::RoundRect { .. }));
    assert_eq!(texts(&ops), ["hello", "world"]);
    assert_eq!(
        ops.iter()
            .filter(|o| matches!(o.kind, DrawKind::RoundRect { .. }))
            .count(),
        1
    );
}

#[test]
fn progress_underline_grows_with_word() {
    let ops = plan(2.25, &[timed_cue()], &style_with("prog_underline"));
    let DrawKind::RoundRect { rect, .. } = &ops[0].kind else {
        panic!("expected bar first");
    };
    assert!((rect.width() - 25.0).abs() < 1e-9);
}

#[test]
fn pop_scales_active_word_and_dims_others() {
    let ops = plan(2.25, &[timed_cue()], &style_with("pop-in"));
    let active = &ops[0];
    let idle = &ops[1];
    assert_ne!(active.state.transform, Affine::IDENTITY);
    assert!((idle.state.opacity - 0.75).abs() < 1e-9);
}

#[test]
fn single_word_mode_lays_out_words() {
    let style = SubtitleStyle {
        display_mode: DisplayMode::SingleWord,
        ..SubtitleStyle::default()
    };
    let ops = plan(2.25, &[timed_cue()], &style);
    assert_eq!(texts(&ops), ["hello", "world"]);
}

#[test]
fn cue_override_changes_fill() {
    let mut cue = SubtitleCue::new(1, 0.0, 2.0, "Red");
    cue.style_override =
        Some(serde_json::from_str::<StyleOverride>(r##"{"primaryColor":"#FF0000"}"##).unwrap());
    let ops = plan(1.0, &[cue], &SubtitleStyle::default());
    assert_eq!(run(&ops[0]).fill, Rgba8::rgb(255, 0, 0));
}
