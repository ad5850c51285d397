//! Low-resolution JPEG previews, produced off the main pipeline.

use crossbeam_channel::{Receiver, TrySendError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::foundation::error::{RenderError, RenderResult};
use crate::render::options::PreviewOptions;

/// One encoded preview image.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewFrame {
    /// Presentation time of the source frame, in seconds.
    pub time: f64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

pub(crate) struct PreviewRequest {
    pub time: f64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Downscale `rgba` by `divisor` and JPEG-encode it.
pub fn encode_preview(
    rgba: &[u8],
    width: u32,
    height: u32,
    divisor: u32,
    quality: u8,
) -> RenderResult<(u32, u32, Vec<u8>)> {
    let img = image::RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| RenderError::validation("preview buffer does not match its size"))?;
    let pw = (width / divisor.max(1)).max(1);
    let ph = (height / divisor.max(1)).max(1);
    let small = image::imageops::resize(&img, pw, ph, FilterType::Triangle);
    let rgb = image::DynamicImage::ImageRgba8(small).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| anyhow::anyhow!("preview jpeg encode failed: {e}"))?;
    Ok((pw, ph, jpeg))
}

/// Offer a frame to the preview worker. Busy workers make the frame get skipped.
pub(crate) fn offer(tx: &crossbeam_channel::Sender<PreviewRequest>, req: PreviewRequest) -> bool {
    match tx.try_send(req) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::trace!("preview worker busy, skipping frame");
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Preview worker loop: runs until the sender side is dropped.
pub(crate) fn run_worker(
    rx: Receiver<PreviewRequest>,
    opts: &PreviewOptions,
    on_frame: &mut (dyn FnMut(PreviewFrame) + Send),
) {
    for req in rx {
        match encode_preview(
            &req.rgba,
            req.width,
            req.height,
            opts.scale_divisor,
            opts.jpeg_quality,
        ) {
            Ok((width, height, jpeg)) => on_frame(PreviewFrame {
                time: req.time,
                width,
                height,
                jpeg,
            }),
            Err(e) => tracing::warn!(error = %e, "dropping preview frame"),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/preview.rs"]
mod tests;
