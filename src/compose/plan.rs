//! Frame planning: turns cues, style and presets into a flat list of draw operations.
//!
//! Planning is pure. It mirrors a 2D canvas state machine (save/restore, transforms, global
//! alpha, filter blur and clip rectangles) and records every draw call together with the
//! state it was issued under. The CPU painter executes the resulting ops.

use crate::effects::ease::{ease_out, interpolate, interpolate_array, spring};
use crate::effects::preset::{
    Animatable, AnimationProps, ClipDirection, DecorKind, DecorParams, EffectPreset, FillDirection,
    MotionKind, PresetRegistry, ProgressDecorKind, Reveal, Scope,
};
use crate::foundation::core::{Affine, Point, Rect, Rgba8, Vec2};
use crate::foundation::error::RenderResult;
use crate::subtitle::cue::SubtitleCue;
use crate::subtitle::style::{DisplayMode, Position, SubtitleStyle, canvas_scale};

/// Line height of stacked block text, relative to the font size.
const LINE_HEIGHT: f64 = 1.2;
/// Opacity an active word animates from when its motion targets a single opacity value.
const WORD_OPACITY_FROM: f64 = 0.7;
const INACTIVE_WORD_OPACITY: f64 = 0.7;

/// Font selection for a text run.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub weight: u16,
    pub size_px: f64,
}

/// Width measurement of single-line text.
pub trait TextMeasurer {
    /// Advance width of `text` in pixels.
    fn measure(&mut self, text: &str, font: &FontSpec) -> f64;
}

/// A rectangular clip, in the coordinate space given by `transform`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipRegion {
    pub rect: Rect,
    pub transform: Affine,
}

/// Canvas state captured for a single draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawState {
    pub transform: Affine,
    pub opacity: f64,
    pub blur_px: f64,
    pub clips: Vec<ClipRegion>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            opacity: 1.0,
            blur_px: 0.0,
            clips: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextStroke {
    pub color: Rgba8,
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextShadow {
    pub color: Rgba8,
    pub blur: f64,
    pub offset: Vec2,
}

/// Single-line text centered horizontally and vertically on `center`.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub center: Point,
    pub font: FontSpec,
    pub fill: Rgba8,
    pub stroke: Option<TextStroke>,
    pub shadow: Option<TextShadow>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawKind {
    Text(TextRun),
    RoundRect {
        rect: Rect,
        radius: f64,
        color: Rgba8,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawOp {
    pub state: DrawState,
    pub kind: DrawKind,
}

impl DrawOp {
    /// Text of a text op, `None` for shapes.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            DrawKind::Text(run) => Some(&run.text),
            DrawKind::RoundRect { .. } => None,
        }
    }
}

#[derive(Default)]
struct PlanCanvas {
    state: DrawState,
    stack: Vec<DrawState>,
    ops: Vec<DrawOp>,
}

impl PlanCanvas {
    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(s) = self.stack.pop() {
            self.state = s;
        }
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.state.transform *= Affine::translate((x, y));
    }

    fn rotate_deg(&mut self, deg: f64) {
        self.state.transform *= Affine::rotate(deg.to_radians());
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform *= Affine::scale_non_uniform(sx, sy);
    }

    fn mul_alpha(&mut self, a: f64) {
        self.state.opacity *= a;
    }

    fn set_blur(&mut self, px: f64) {
        self.state.blur_px = px.max(0.0);
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.state.clips.push(ClipRegion {
            rect,
            transform: self.state.transform,
        });
    }

    fn draw(&mut self, kind: DrawKind) {
        self.ops.push(DrawOp {
            state: self.state.clone(),
            kind,
        });
    }
}

/// Start/end of the spoken window of word `index` out of `count`.
///
/// Explicit per-word timing wins; without it the cue duration is split evenly, which is
/// consistent with [`active_word_index`].
pub fn word_window(cue: &SubtitleCue, index: usize, count: usize) -> Option<(f64, f64)> {
    match &cue.words {
        Some(words) => words.get(index).map(|w| (w.start, w.end)),
        None if count > 0 && index < count => {
            let slot = cue.duration() / count as f64;
            let start = cue.start_time + slot * index as f64;
            Some((start, start + slot))
        }
        None => None,
    }
}

/// Index of the word being spoken at `t`.
pub fn active_word_index(cue: &SubtitleCue, word_count: usize, t: f64) -> Option<usize> {
    match &cue.words {
        Some(words) => words.iter().position(|w| t >= w.start && t <= w.end),
        None => {
            let idx = (cue.progress(t) * word_count as f64).floor() as usize;
            (idx < word_count).then_some(idx)
        }
    }
}

/// Karaoke fill fraction of a word spoken over `[start, end]` at time `t`.
pub fn karaoke_fill_fraction(start: f64, end: f64, t: f64) -> f64 {
    if end <= start {
        return if t >= start { 1.0 } else { 0.0 };
    }
    ((t - start) / (end - start)).clamp(0.0, 1.0)
}

/// Cues that are drawn at `t`: inside the ±1s buffer window and strictly active.
pub fn active_cues(cues: &[SubtitleCue], t: f64) -> impl Iterator<Item = &SubtitleCue> {
    cues.iter()
        .filter(move |c| c.is_buffered(t))
        .filter(move |c| c.is_active(t))
}

/// Canvas geometry and time of the frame being planned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Presentation time in seconds.
    pub time: f64,
}

/// Plan the subtitle overlay of one frame.
pub fn plan_frame(
    frame: FrameGeometry,
    cues: &[SubtitleCue],
    style: &SubtitleStyle,
    presets: &PresetRegistry,
    measurer: &mut dyn TextMeasurer,
) -> RenderResult<Vec<DrawOp>> {
    let mut canvas = PlanCanvas::default();
    for cue in active_cues(cues, frame.time) {
        let effective;
        let style = match &cue.style_override {
            Some(ov) => {
                effective = style.merged(ov)?;
                &effective
            }
            None => style,
        };
        let mut planner = CuePlanner {
            canvas: &mut canvas,
            measurer: &mut *measurer,
            style,
            preset: presets.get(&style.effect),
            cue,
            frame,
            scale: canvas_scale(frame.height),
            font: FontSpec {
                family: style.font_name.clone(),
                weight: style.weight(),
                size_px: style.pixel_font_size(frame.height),
            },
        };
        planner.plan();
    }
    Ok(canvas.ops)
}

struct CuePlanner<'a> {
    canvas: &'a mut PlanCanvas,
    measurer: &'a mut dyn TextMeasurer,
    style: &'a SubtitleStyle,
    preset: Option<&'a EffectPreset>,
    cue: &'a SubtitleCue,
    frame: FrameGeometry,
    scale: f64,
    font: FontSpec,
}

impl CuePlanner<'_> {
    fn plan(&mut self) {
        let t = self.frame.time;
        let duration = self.cue.duration();
        let elapsed = t - self.cue.start_time;
        let progress = self.cue.progress(t);

        self.canvas.save();

        if let Some(preset) = self.preset.filter(|p| p.scope == Scope::Line) {
            self.apply_line_motion(preset, elapsed, duration);
        }

        let (w, h) = (f64::from(self.frame.width), f64::from(self.frame.height));
        let x = w / 2.0;
        let y = match self.style.position {
            Position::Bottom => h - self.style.margin_v * self.scale,
            Position::Top => self.style.margin_v * self.scale + self.font.size_px,
            Position::Center => h / 2.0,
        };

        let word_level = self.preset.is_some_and(EffectPreset::is_word_level)
            || self.style.display_mode == DisplayMode::SingleWord;

        if word_level {
            let words: Vec<&str> = self.cue.text.split_whitespace().collect();
            let active = active_word_index(self.cue, words.len(), t);
            self.draw_words(&words, active, x, y);
        } else if self.preset.is_some_and(|p| p.reveal == Reveal::Typewriter) {
            let total = self.cue.text.chars().count();
            let visible = (progress * total as f64).floor() as usize;
            let shown: String = self.cue.text.chars().take(visible).collect();
            self.draw_block(&shown, x, y);
        } else {
            let text = match (&self.cue.original_text, self.style.show_bilingual) {
                (Some(orig), true) if !orig.trim().is_empty() => {
                    format!("{}\n{}", orig.trim(), self.cue.text)
                }
                _ => self.cue.text.clone(),
            };
            self.draw_block(&text, x, y);
        }

        self.canvas.restore();
    }

    fn apply_line_motion(&mut self, preset: &EffectPreset, elapsed: f64, duration: f64) {
        let entry_dur = preset.entry.as_ref().map_or(0.3, MotionKind::transition_secs);
        let exit_dur = preset.exit.as_ref().map_or(0.3, MotionKind::transition_secs);
        let in_entry = elapsed < entry_dur;
        let in_exit = !in_entry && elapsed > duration - exit_dur;

        let mut alpha = 1.0;
        let (mut tx, mut ty, mut ts, mut tr) = (0.0, 0.0, 1.0, 0.0);
        let mut blur = 0.0;

        let motion = match (&preset.entry, &preset.exit) {
            (Some(MotionKind::LineMotion(m)), _) if in_entry => {
                Some((m.initial.clone(), ease_out(elapsed / entry_dur)))
            }
            (_, Some(MotionKind::LineMotion(m))) if in_exit => {
                Some((m.animate.clone(), ease_out((duration - elapsed) / exit_dur)))
            }
            _ => None,
        };
        if let Some((from, t)) = motion {
            let from = from.unwrap_or_else(|| AnimationProps {
                opacity: Some(Animatable::Value(0.0)),
                ..AnimationProps::default()
            });
            let first = |a: &Option<Animatable>, default: f64| {
                a.as_ref().map_or(default, |v| v.first())
            };
            alpha = interpolate(first(&from.opacity, 0.0), 1.0, t);
            ty = interpolate(first(&from.y, 0.0), 0.0, t) * self.scale;
            tx = interpolate(first(&from.x, 0.0), 0.0, t) * self.scale;
            ts = interpolate(first(&from.scale, 1.0), 1.0, t);
            let r = first(&from.rotate, 0.0);
            if r != 0.0 {
                tr = interpolate(r, 0.0, t);
            }
            if let Some(b) = from.filter.as_ref().and_then(|f| f.blur_px()) {
                blur = interpolate(b, 0.0, t);
            }
        }

        let (w, h) = (f64::from(self.frame.width), f64::from(self.frame.height));
        match (&preset.entry, &preset.exit) {
            (Some(MotionKind::LineClipReveal { direction, .. }), _) if in_entry => {
                self.canvas
                    .clip_rect(reveal_rect(*direction, elapsed / entry_dur, w, h));
            }
            (_, Some(MotionKind::LineClipReveal { direction, .. })) if in_exit => {
                self.canvas.clip_rect(reveal_rect(
                    *direction,
                    (duration - elapsed) / exit_dur,
                    w,
                    h,
                ));
            }
            _ => {}
        }

        self.canvas.mul_alpha(alpha);
        self.canvas.set_blur(blur);
        self.canvas.translate(w / 2.0 + tx, h / 2.0 + ty);
        self.canvas.rotate_deg(tr);
        self.canvas.scale(ts, ts);
        self.canvas.translate(-w / 2.0, -h / 2.0);
    }

    fn draw_block(&mut self, text: &str, x: f64, y: f64) {
        let lines: Vec<&str> = text.split('\n').collect();
        let n = lines.len() as f64;
        let lh = self.font.size_px * LINE_HEIGHT;
        for (i, line) in lines.iter().enumerate() {
            let i = i as f64;
            let ly = match self.style.position {
                Position::Bottom => y - (n - 1.0 - i) * lh,
                Position::Top => y + i * lh,
                Position::Center => y + (i - (n - 1.0) / 2.0) * lh,
            };
            self.draw_text_line(line, x, ly, TextPass::Normal);
        }
    }

    fn draw_words(&mut self, words: &[&str], active: Option<usize>, center_x: f64, y: f64) {
        let gap = self.style.highlight_gap * self.scale;
        let widths: Vec<f64> = words
            .iter()
            .map(|w| self.measurer.measure(w, &self.font))
            .collect();
        let total: f64 = widths.iter().sum::<f64>() + words.len().saturating_sub(1) as f64 * gap;
        let mut current_x = center_x - total / 2.0;
        let active_kind = self.preset.and_then(|p| p.active.as_ref());

        for (i, word) in words.iter().enumerate() {
            let is_active = active == Some(i);
            let w = widths[i];
            let mid_x = current_x + w / 2.0;

            self.canvas.save();

            match self.preset {
                Some(p) if p.scope == Scope::Word && p.active.is_some() => {
                    self.apply_word_animation(p, is_active, i, words.len(), mid_x, y);
                }
                Some(p) => {
                    if let Some(dim) = p.dims_others() {
                        self.canvas.mul_alpha(if is_active { 1.0 } else { dim });
                    }
                }
                None => {}
            }

            match active_kind {
                Some(MotionKind::WordDecorToggle { decor, params }) if is_active => {
                    self.draw_word_decor(*decor, params, mid_x, y, w);
                }
                Some(MotionKind::WordProgressDecor { decor, params }) => {
                    let fill = self.word_fill(is_active, i, words.len());
                    if fill > 0.0 {
                        self.draw_progress_decor(*decor, params, current_x, y, w, fill);
                    }
                }
                _ => {}
            }

            match active_kind {
                Some(MotionKind::WordProgressFill { direction }) => {
                    self.draw_karaoke_word(word, current_x, y, w, is_active, i, words.len(), *direction);
                }
                _ => self.draw_text_line(word, mid_x, y, TextPass::Normal),
            }

            self.canvas.restore();
            current_x += w + gap;
        }
    }

    /// Fill fraction of word `i` for progress-driven effects: partial while active,
    /// full once its window has passed, empty before.
    fn word_fill(&self, is_active: bool, i: usize, count: usize) -> f64 {
        let t = self.frame.time;
        match word_window(self.cue, i, count) {
            Some((start, end)) if is_active => karaoke_fill_fraction(start, end, t),
            Some((_, end)) if t > end => 1.0,
            _ => 0.0,
        }
    }

    fn apply_word_animation(
        &mut self,
        preset: &EffectPreset,
        is_active: bool,
        index: usize,
        count: usize,
        x: f64,
        y: f64,
    ) {
        match (&preset.active, &preset.inactive) {
            (Some(MotionKind::WordMotion(motion)), _) if is_active => {
                let (Some((start, end)), Some(anim)) =
                    (word_window(self.cue, index, count), motion.animate.as_ref())
                else {
                    return;
                };
                let dur = end - start;
                let raw = if dur > 0.0 {
                    (self.frame.time - start) / dur
                } else {
                    1.0
                };
                let t = spring(raw.clamp(0.0, 1.0));

                if anim.scale.is_some()
                    || anim.scale_x.is_some()
                    || anim.scale_y.is_some()
                    || anim.rotate.is_some()
                {
                    let s = anim.scale.as_ref().map_or(1.0, |a| a.sample(1.0, t));
                    let sx = anim.scale_x.as_ref().map_or(s, |a| a.sample(1.0, t));
                    let sy = anim.scale_y.as_ref().map_or(s, |a| a.sample(1.0, t));
                    let r = anim.rotate.as_ref().map_or(0.0, |a| a.sample(0.0, t));
                    self.canvas.translate(x, y);
                    self.canvas.rotate_deg(r);
                    self.canvas.scale(sx, sy);
                    self.canvas.translate(-x, -y);
                }
                if anim.x.is_some() || anim.y.is_some() {
                    let ty = anim.y.as_ref().map_or(0.0, |a| a.sample(0.0, t)) * self.scale;
                    let tx = anim.x.as_ref().map_or(0.0, |a| a.sample(0.0, t)) * self.scale;
                    self.canvas.translate(tx, ty);
                }
                if let Some(op) = &anim.opacity {
                    self.canvas.mul_alpha(op.sample(WORD_OPACITY_FROM, t));
                }
                if let Some(keys) = anim.filter.as_ref().and_then(|f| f.blur_keys()) {
                    let blur = match keys.as_slice() {
                        [single] => interpolate(*single, 0.0, t),
                        many => interpolate_array(many, t),
                    };
                    self.canvas.set_blur(blur);
                }
            }
            (_, Some(inactive)) if !is_active => {
                let opacity = inactive
                    .opacity
                    .as_ref()
                    .map_or(INACTIVE_WORD_OPACITY, |a| a.first());
                self.canvas.mul_alpha(opacity);
                if let Some(s) = inactive.scale.as_ref().map(|a| a.first()).filter(|s| *s != 0.0) {
                    self.canvas.translate(x, y);
                    self.canvas.scale(s, s);
                    self.canvas.translate(-x, -y);
                }
            }
            _ => {}
        }
    }

    fn draw_word_decor(&mut self, decor: DecorKind, params: &DecorParams, x: f64, y: f64, w: f64) {
        let h = self.font.size_px;
        let color = self
            .style
            .highlight()
            .with_alpha_mul(params.opacity.unwrap_or(1.0));
        let rect = match decor {
            DecorKind::PillBehind
            | DecorKind::BoxBehind
            | DecorKind::Halo
            | DecorKind::Tape
            | DecorKind::BackdropBlurChip => {
                let px = params.padding_x.unwrap_or(4.0) * self.scale;
                let py = params.padding_y.unwrap_or(0.0) * self.scale;
                Rect::new(x - w / 2.0 - px, y - h / 2.0 - py, x + w / 2.0 + px, y + h / 2.0 + py)
            }
            DecorKind::UnderlineStatic | DecorKind::OverlineStatic | DecorKind::StrikeStatic => {
                let anchor = match decor {
                    DecorKind::UnderlineStatic => y + h / 2.0,
                    DecorKind::OverlineStatic => y - h / 2.0,
                    _ => y,
                };
                bar_rect(x - w / 2.0, w, anchor, params, self.scale)
            }
            _ => return,
        };
        let radius = params.radius.unwrap_or(4.0) * self.scale;
        self.push_round_rect(rect, radius, color);
    }

    fn draw_progress_decor(
        &mut self,
        decor: ProgressDecorKind,
        params: &DecorParams,
        left: f64,
        y: f64,
        w: f64,
        fill: f64,
    ) {
        let h = self.font.size_px;
        let color = self
            .style
            .highlight()
            .with_alpha_mul(params.opacity.unwrap_or(1.0));
        let fw = w * fill;
        let rect = match decor {
            ProgressDecorKind::Underline => bar_rect(left, fw, y + h / 2.0, params, self.scale),
            ProgressDecorKind::Overline => bar_rect(left, fw, y - h / 2.0, params, self.scale),
            ProgressDecorKind::Strike => bar_rect(left, fw, y, params, self.scale),
            ProgressDecorKind::Marker => {
                let mh = params.height_em.unwrap_or(0.6) * h;
                Rect::new(left, y - mh / 2.0, left + fw, y + mh / 2.0)
            }
            ProgressDecorKind::BoxFill => {
                let px = params.padding_x.unwrap_or(0.0) * self.scale;
                let py = params.padding_y.unwrap_or(0.0) * self.scale;
                Rect::new(left - px, y - h / 2.0 - py, left - px + (w + 2.0 * px) * fill, y + h / 2.0 + py)
            }
            ProgressDecorKind::ShimmerText => return,
        };
        let radius = params.radius.unwrap_or(0.0) * self.scale;
        self.push_round_rect(rect, radius, color);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_karaoke_word(
        &mut self,
        word: &str,
        left: f64,
        y: f64,
        w: f64,
        is_active: bool,
        index: usize,
        count: usize,
        direction: FillDirection,
    ) {
        let mid_x = left + w / 2.0;
        self.draw_text_line(word, mid_x, y, TextPass::Normal);

        let fill = self.word_fill(is_active, index, count);
        if is_active {
            let half = self.font.size_px;
            let clip = match direction {
                FillDirection::Ltr => Rect::new(left, y - half, left + w * fill, y + half),
                FillDirection::Rtl => Rect::new(left + w * (1.0 - fill), y - half, left + w, y + half),
                FillDirection::Center => {
                    Rect::new(mid_x - w * fill / 2.0, y - half, mid_x + w * fill / 2.0, y + half)
                }
                FillDirection::Btt => {
                    Rect::new(left, y + half - 2.0 * half * fill, left + w, y + half)
                }
            };
            self.canvas.save();
            self.canvas.clip_rect(clip);
            self.draw_text_line(word, mid_x, y, TextPass::Highlight);
            self.canvas.restore();
        } else if fill >= 1.0 {
            self.draw_text_line(word, mid_x, y, TextPass::Highlight);
        }
    }

    fn draw_text_line(&mut self, text: &str, x: f64, y: f64, pass: TextPass) {
        if text.is_empty() {
            return;
        }
        let style = self.style;
        let highlight = pass == TextPass::Highlight;
        let stroke = (!highlight && style.outline_width > 0.0).then(|| TextStroke {
            color: style.outline(),
            width: style.outline_width * self.scale * 2.0,
        });
        let shadow = (!highlight && style.shadow_blur > 0.0).then(|| TextShadow {
            color: style.shadow(),
            blur: style.shadow_blur * self.scale,
            offset: Vec2::new(
                style.shadow_offset_x * self.scale,
                style.shadow_offset_y * self.scale,
            ),
        });
        let fill = if highlight {
            style.highlight()
        } else {
            style.primary()
        };
        self.canvas.draw(DrawKind::Text(TextRun {
            text: text.to_string(),
            center: Point::new(x, y),
            font: self.font.clone(),
            fill,
            stroke,
            shadow,
        }));
    }

    fn push_round_rect(&mut self, rect: Rect, radius: f64, color: Rgba8) {
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return;
        }
        let radius = radius.min(rect.width() / 2.0).min(rect.height() / 2.0).max(0.0);
        self.canvas.draw(DrawKind::RoundRect {
            rect,
            radius,
            color,
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TextPass {
    Normal,
    /// Karaoke overlay: highlight fill, no stroke, no shadow.
    Highlight,
}

fn reveal_rect(direction: ClipDirection, t: f64, w: f64, h: f64) -> Rect {
    match direction {
        ClipDirection::Ltr => Rect::new(0.0, 0.0, w * t, h),
        ClipDirection::Rtl => Rect::new(w * (1.0 - t), 0.0, w, h),
        ClipDirection::Btt => Rect::new(0.0, h * (1.0 - t), w, h),
        ClipDirection::Ttb => Rect::new(0.0, 0.0, w, h * t),
    }
}

fn bar_rect(left: f64, width: f64, anchor_y: f64, params: &DecorParams, scale: f64) -> Rect {
    let bh = params.height.unwrap_or(4.0) * scale;
    let cy = anchor_y + params.offset_y.unwrap_or(0.0) * scale;
    Rect::new(left, cy - bh / 2.0, left + width, cy + bh / 2.0)
}

#[cfg(test)]
#[path = "../../tests/unit/compose/plan.rs"]
mod tests;
