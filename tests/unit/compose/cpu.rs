use super::*;
use crate::compose::plan::{ClipRegion, DrawState};

fn compositor(w: u32, h: u32) -> CpuCompositor {
    CpuCompositor::new(w, h, FontBook::new()).unwrap()
}

fn px(buf: &[u8], w: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * w + x) * 4) as usize;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

fn white_rect(rect: Rect, state: DrawState) -> DrawOp {
    DrawOp {
        state,
        kind: DrawKind::RoundRect {
            rect,
            radius: 0.0,
            color: Rgba8::WHITE,
        },
    }
}

#[test]
fn empty_frame_is_opaque_black() {
    let mut c = compositor(8, 4);
    let out = c.paint(None, &[]).unwrap();
    assert_eq!(out.len(), 8 * 4 * 4);
    assert!(out.chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
}

#[test]
fn video_is_letterboxed_with_contain() {
    let red = [255u8, 0, 0, 255].repeat(2);
    let mut c = compositor(4, 4);
    let out = c
        .paint(
            Some(VideoFrame {
                width: 2,
                height: 1,
                rgba: &red,
            }),
            &[],
        )
        .unwrap();
    assert_eq!(px(out, 4, 2, 0), [0, 0, 0, 255]);
    assert_eq!(px(out, 4, 2, 3), [0, 0, 0, 255]);
    let mid = px(out, 4, 2, 2);
    assert!(mid[0] > 200 && mid[1] < 40, "{mid:?}");
}

#[test]
fn round_rect_covers_canvas() {
    let mut c = compositor(4, 4);
    let op = white_rect(Rect::new(0.0, 0.0, 4.0, 4.0), DrawState::default());
    let out = c.paint(None, &[op]).unwrap();
    assert!(out.chunks_exact(4).all(|p| p == [255, 255, 255, 255]));
}

#[test]
fn opacity_blends_with_background() {
    let mut c = compositor(4, 4);
    let op = white_rect(
        Rect::new(0.0, 0.0, 4.0, 4.0),
        DrawState {
            opacity: 0.5,
            ..DrawState::default()
        },
    );
    let out = c.paint(None, &[op]).unwrap();
    let p = px(out, 4, 1, 1);
    assert!((120..=136).contains(&p[0]), "{p:?}");
}

#[test]
fn clip_limits_drawing() {
    let mut c = compositor(4, 4);
    let op = white_rect(
        Rect::new(0.0, 0.0, 4.0, 4.0),
        DrawState {
            clips: vec![ClipRegion {
                rect: Rect::new(0.0, 0.0, 2.0, 4.0),
                transform: Affine::IDENTITY,
            }],
            ..DrawState::default()
        },
    );
    let out = c.paint(None, &[op]).unwrap();
    assert_eq!(px(out, 4, 0, 1), [255, 255, 255, 255]);
    assert_eq!(px(out, 4, 3, 1), [0, 0, 0, 255]);
}

#[test]
fn blur_softens_edges() {
    let mut c = compositor(16, 16);
    let rect = Rect::new(4.0, 4.0, 12.0, 12.0);
    let sharp = c
        .paint(None, &[white_rect(rect, DrawState::default())])
        .unwrap()
        .to_vec();
    let blurred = c
        .paint(
            None,
            &[white_rect(
                rect,
                DrawState {
                    blur_px: 2.0,
                    ..DrawState::default()
                },
            )],
        )
        .unwrap()
        .to_vec();
    assert_eq!(px(&sharp, 16, 2, 8)[0], 0);
    assert!(px(&blurred, 16, 2, 8)[0] > 0);
    assert!(px(&blurred, 16, 4, 8)[0] < 255);
}

#[test]
fn oversized_canvas_is_rejected() {
    assert!(CpuCompositor::new(70_000, 10, FontBook::new()).is_err());
    assert!(CpuCompositor::new(0, 10, FontBook::new()).is_err());
}

#[test]
fn short_frame_is_a_decode_error() {
    let Err(err) = straight_rgba_to_pixmap(&[0u8; 12], 2, 2) else {
        panic!("short frame accepted");
    };
    assert!(matches!(err, RenderError::Decode(_)));
}

#[test]
fn premultiply_keeps_opaque_pixels() {
    assert_eq!(premul_rgba8(10, 20, 30, 255), [10, 20, 30, 255]);
    assert_eq!(premul_rgba8(255, 255, 255, 0), [0, 0, 0, 0]);
}

#[test]
fn render_frame_without_fonts_still_produces_output() {
    let mut c = compositor(64, 36);
    let cues = [SubtitleCue::new(1, 0.0, 2.0, "hello")];
    let presets = PresetRegistry::builtin().unwrap();
    let out = c
        .render_frame(None, 1.0, &cues, &SubtitleStyle::default(), &presets)
        .unwrap();
    assert_eq!(out.len(), 64 * 36 * 4);
}
