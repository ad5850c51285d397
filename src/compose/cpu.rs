//! CPU painter: draws the video frame and planned caption ops with `vello_cpu`.

use std::sync::Arc;

use kurbo::Shape;

use crate::compose::blur::{blur_premul, radius_for_sigma};
use crate::compose::plan::{
    DrawKind, DrawOp, FrameGeometry, TextMeasurer, TextRun, TextShadow, plan_frame,
};
use crate::compose::text::{FontBook, ShapedText};
use crate::effects::preset::PresetRegistry;
use crate::foundation::core::{Affine, FitMode, Rect, Rgba8, fit_rect};
use crate::foundation::error::{RenderError, RenderResult};
use crate::subtitle::cue::SubtitleCue;
use crate::subtitle::style::SubtitleStyle;

/// Borrowed straight-alpha RGBA8 video frame.
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
}

/// Composites caption overlays onto video frames at a fixed output size.
pub struct CpuCompositor {
    width: u16,
    height: u16,
    fit: FitMode,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    fonts: FontBook,
}

impl CpuCompositor {
    pub fn new(width: u32, height: u32, fonts: FontBook) -> RenderResult<Self> {
        let w: u16 = width
            .try_into()
            .map_err(|_| RenderError::validation("output width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| RenderError::validation("output height exceeds u16"))?;
        if w == 0 || h == 0 {
            return Err(RenderError::validation("output size must be non-zero"));
        }
        Ok(Self {
            width: w,
            height: h,
            fit: FitMode::default(),
            ctx: vello_cpu::RenderContext::new(w, h),
            pixmap: vello_cpu::Pixmap::new(w, h),
            fonts,
        })
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    /// Plan and paint the frame at `time`. Returns straight RGBA8 bytes of the output canvas.
    pub fn render_frame(
        &mut self,
        video: Option<VideoFrame<'_>>,
        time: f64,
        cues: &[SubtitleCue],
        style: &SubtitleStyle,
        presets: &PresetRegistry,
    ) -> RenderResult<&[u8]> {
        let geometry = FrameGeometry {
            width: u32::from(self.width),
            height: u32::from(self.height),
            time,
        };
        let measurer: &mut dyn TextMeasurer = &mut self.fonts;
        let ops = plan_frame(geometry, cues, style, presets, measurer)?;
        self.paint(video, &ops)
    }

    /// Paint a black canvas, the fitted video frame, then `ops` in order.
    pub fn paint(&mut self, video: Option<VideoFrame<'_>>, ops: &[DrawOp]) -> RenderResult<&[u8]> {
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let ctx = &mut self.ctx;
        ctx.reset();
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

        if let Some(frame) = video {
            draw_video(ctx, frame, self.fit, self.width, self.height)?;
        }

        let bounds = Rect::new(0.0, 0.0, w, h);
        for op in ops {
            paint_op(ctx, &mut self.fonts, op, bounds)?;
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut self.pixmap);
        // The canvas starts opaque, so premultiplied and straight bytes coincide.
        Ok(self.pixmap.data_as_u8_slice())
    }
}

fn draw_video(
    ctx: &mut vello_cpu::RenderContext,
    frame: VideoFrame<'_>,
    fit: FitMode,
    out_w: u16,
    out_h: u16,
) -> RenderResult<()> {
    let pixmap = straight_rgba_to_pixmap(frame.rgba, frame.width, frame.height)?;
    let (fw, fh) = (f64::from(frame.width), f64::from(frame.height));
    let dst = fit_rect(frame.width, frame.height, u32::from(out_w), u32::from(out_h), fit);
    let t = Affine::translate((dst.x0, dst.y0))
        * Affine::scale_non_uniform(dst.width() / fw, dst.height() / fh);

    ctx.set_transform(affine_to_cpu(t));
    ctx.set_paint(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    });
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, fw, fh));
    Ok(())
}

fn paint_op(
    ctx: &mut vello_cpu::RenderContext,
    fonts: &mut FontBook,
    op: &DrawOp,
    bounds: Rect,
) -> RenderResult<()> {
    let state = &op.state;
    if state.opacity <= 0.0 {
        return Ok(());
    }
    let shaped = match &op.kind {
        DrawKind::Text(run) => match fonts.shape(&run.text, &run.font, run.fill) {
            Some(s) => Some(s),
            None => return Ok(()),
        },
        DrawKind::RoundRect { .. } => None,
    };

    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    for clip in &state.clips {
        ctx.set_transform(affine_to_cpu(clip.transform));
        ctx.push_clip_layer(&shape_to_cpu(&clip.rect));
    }
    let faded = state.opacity < 1.0;
    if faded {
        ctx.push_opacity_layer(state.opacity as f32);
    }

    if state.blur_px > 0.0 {
        let local = local_bounds(&op.kind, shaped.as_ref());
        let pad = f64::from(radius_for_sigma(state.blur_px)) + shadow_extent(&op.kind);
        let device = state.transform.transform_rect_bbox(local).inflate(pad, pad);
        composite_blurred(ctx, device.intersect(bounds), state.blur_px, |layer, origin, size| {
            draw_content(layer, origin * state.transform, &op.kind, shaped.as_ref(), size)
        })?;
    } else {
        draw_content(ctx, state.transform, &op.kind, shaped.as_ref(), bounds)?;
    }

    if faded {
        ctx.pop_layer();
    }
    for _ in &state.clips {
        ctx.pop_layer();
    }
    Ok(())
}

fn draw_content(
    ctx: &mut vello_cpu::RenderContext,
    transform: Affine,
    kind: &DrawKind,
    shaped: Option<&ShapedText>,
    bounds: Rect,
) -> RenderResult<()> {
    match (kind, shaped) {
        (DrawKind::RoundRect { rect, radius, color }, _) => {
            ctx.set_transform(affine_to_cpu(transform));
            ctx.set_paint(color_to_cpu(*color));
            ctx.fill_path(&shape_to_cpu(&kurbo::RoundedRect::from_rect(*rect, *radius)));
            Ok(())
        }
        (DrawKind::Text(run), Some(shaped)) => draw_text(ctx, transform, run, shaped, bounds),
        (DrawKind::Text(_), None) => Ok(()),
    }
}

/// Stroke, then shadow, then fill.
fn draw_text(
    ctx: &mut vello_cpu::RenderContext,
    transform: Affine,
    run: &TextRun,
    shaped: &ShapedText,
    bounds: Rect,
) -> RenderResult<()> {
    let origin = transform
        * Affine::translate((run.center.x - shaped.width / 2.0, run.center.y - shaped.middle));

    if let Some(stroke) = &run.stroke {
        ctx.set_stroke(
            vello_cpu::kurbo::Stroke::new(stroke.width).with_join(vello_cpu::kurbo::Join::Round),
        );
        draw_glyphs(ctx, origin, shaped, stroke.color, true);
    }

    if let Some(shadow) = &run.shadow {
        draw_shadow(ctx, origin, run, shaped, shadow, bounds)?;
    }

    draw_glyphs(ctx, origin, shaped, run.fill, false);
    Ok(())
}

fn draw_shadow(
    ctx: &mut vello_cpu::RenderContext,
    origin: Affine,
    run: &TextRun,
    shaped: &ShapedText,
    shadow: &TextShadow,
    bounds: Rect,
) -> RenderResult<()> {
    let shifted = Affine::translate(shadow.offset) * origin;
    // Canvas shadow blur is twice the gaussian standard deviation.
    let sigma = shadow.blur / 2.0;
    if sigma <= 0.0 {
        draw_glyphs(ctx, shifted, shaped, shadow.color, false);
        return Ok(());
    }
    let local = Rect::new(0.0, 0.0, shaped.width, shaped.height);
    let pad = f64::from(radius_for_sigma(sigma)) + run.stroke.as_ref().map_or(0.0, |s| s.width);
    let device = shifted.transform_rect_bbox(local).inflate(pad, pad);
    composite_blurred(ctx, device.intersect(bounds), sigma, |layer, layer_origin, _| {
        draw_glyphs(layer, layer_origin * shifted, shaped, shadow.color, false);
        Ok(())
    })
}

fn draw_glyphs(
    ctx: &mut vello_cpu::RenderContext,
    transform: Affine,
    shaped: &ShapedText,
    color: Rgba8,
    stroke: bool,
) {
    ctx.set_transform(affine_to_cpu(transform));
    ctx.set_paint(color_to_cpu(color));
    for line in shaped.layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            let builder = ctx
                .glyph_run(&shaped.font)
                .font_size(run.run().font_size());
            if stroke {
                builder.stroke_glyphs(glyphs);
            } else {
                builder.fill_glyphs(glyphs);
            }
        }
    }
}

/// Render `draw` into an offscreen layer covering `device`, blur it and composite it back.
///
/// `draw` receives the layer context, the device-to-layer transform and the layer bounds.
fn composite_blurred(
    ctx: &mut vello_cpu::RenderContext,
    device: Rect,
    sigma: f64,
    draw: impl FnOnce(&mut vello_cpu::RenderContext, Affine, Rect) -> RenderResult<()>,
) -> RenderResult<()> {
    let (x0, y0) = (device.x0.floor(), device.y0.floor());
    let (x1, y1) = (device.x1.ceil(), device.y1.ceil());
    if !(x1 > x0 && y1 > y0) {
        return Ok(());
    }
    let lw = (x1 - x0).min(f64::from(u16::MAX)) as u16;
    let lh = (y1 - y0).min(f64::from(u16::MAX)) as u16;

    let mut layer = vello_cpu::RenderContext::new(lw, lh);
    layer.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    let size = Rect::new(0.0, 0.0, f64::from(lw), f64::from(lh));
    draw(&mut layer, Affine::translate((-x0, -y0)), size)?;
    layer.flush();

    let mut pixmap = vello_cpu::Pixmap::new(lw, lh);
    layer.render_to_pixmap(&mut pixmap);
    let blurred = blur_premul(pixmap.data_as_u8_slice(), u32::from(lw), u32::from(lh), sigma)?;
    pixmap.data_as_u8_slice_mut().copy_from_slice(&blurred);

    ctx.set_transform(affine_to_cpu(Affine::translate((x0, y0))));
    ctx.set_paint(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    });
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(lw), f64::from(lh)));
    Ok(())
}

fn local_bounds(kind: &DrawKind, shaped: Option<&ShapedText>) -> Rect {
    match (kind, shaped) {
        (DrawKind::RoundRect { rect, .. }, _) => *rect,
        (DrawKind::Text(run), Some(s)) => {
            let stroke = run.stroke.as_ref().map_or(0.0, |s| s.width);
            Rect::from_center_size(run.center, (s.width, s.height)).inflate(stroke, stroke)
        }
        (DrawKind::Text(run), None) => Rect::from_center_size(run.center, (0.0, 0.0)),
    }
}

fn shadow_extent(kind: &DrawKind) -> f64 {
    match kind {
        DrawKind::Text(TextRun {
            shadow: Some(s), ..
        }) => s.offset.x.abs() + s.offset.y.abs() + f64::from(radius_for_sigma(s.blur / 2.0)),
        _ => 0.0,
    }
}

fn straight_rgba_to_pixmap(rgba: &[u8], width: u32, height: u32) -> RenderResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| RenderError::validation("frame width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| RenderError::validation("frame height exceeds u16"))?;
    if rgba.len() != width as usize * height as usize * 4 {
        return Err(RenderError::decode(format!(
            "frame is {} bytes, expected {}x{} rgba",
            rgba.len(),
            width,
            height
        )));
    }

    let mut may_have_opacities = false;
    let pixels = rgba
        .chunks_exact(4)
        .map(|px| {
            let [r, g, b, a] = premul_rgba8(px[0], px[1], px[2], px[3]);
            may_have_opacities |= a != 255;
            vello_cpu::peniko::color::PremulRgba8 { r, g, b, a }
        })
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    if a == 255 {
        return [r, g, b, a];
    }
    let af = u16::from(a) + 1;
    let premul = |c: u8| -> u8 { ((u16::from(c) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

fn color_to_cpu(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn shape_to_cpu(shape: &impl Shape) -> vello_cpu::kurbo::BezPath {
    let mut p = vello_cpu::kurbo::BezPath::new();
    for el in shape.path_elements(0.1) {
        p.push(el);
    }
    p
}

#[cfg(test)]
#[path = "../../tests/unit/compose/cpu.rs"]
mod tests;
