//! Font lookup and single-line shaping.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::compose::plan::{FontSpec, TextMeasurer};
use crate::foundation::core::Rgba8;

/// Average advance of a glyph relative to the font size, used when no face is available.
const FALLBACK_ADVANCE_EM: f64 = 0.55;

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<Rgba8> for TextBrushRgba8 {
    fn from(c: Rgba8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

/// A resolved font face: raw bytes registered with Parley plus the paint-side handle.
pub(crate) struct LoadedFace {
    family: String,
    weight: u16,
    pub(crate) font: vello_cpu::peniko::FontData,
}

/// Shaped single-line text.
pub struct ShapedText {
    pub layout: parley::Layout<TextBrushRgba8>,
    pub(crate) font: vello_cpu::peniko::FontData,
    /// Advance width in pixels.
    pub width: f64,
    /// Distance from the layout top to the middle of the em box.
    pub middle: f64,
    /// Line height in pixels.
    pub height: f64,
}

/// System and user fonts, resolved by family name and weight.
pub struct FontBook {
    db: usvg::fontdb::Database,
    faces: HashMap<(String, u16), Option<Arc<LoadedFace>>>,
    warned: HashSet<String>,
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    /// An empty book. Text falls back to estimated widths and is not painted.
    pub fn new() -> Self {
        Self {
            db: usvg::fontdb::Database::new(),
            faces: HashMap::new(),
            warned: HashSet::new(),
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// A book seeded with the fonts installed on this machine.
    pub fn system() -> Self {
        let mut book = Self::new();
        book.db.load_system_fonts();
        tracing::debug!(faces = book.db.len(), "loaded system fonts");
        book
    }

    /// Add every `.ttf`, `.otf` and `.ttc` file found directly in `dir`.
    pub fn load_font_dir(&mut self, dir: &Path) {
        let Ok(rd) = std::fs::read_dir(dir) else {
            tracing::warn!(dir = %dir.display(), "font directory is not readable");
            return;
        };
        for entry in rd.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if ext != "ttf" && ext != "otf" && ext != "ttc" {
                continue;
            }
            if let Err(e) = self.db.load_font_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable font");
            }
        }
        self.faces.clear();
    }

    /// Add a font from memory.
    pub fn load_font_data(&mut self, bytes: Vec<u8>) {
        self.db.load_font_data(bytes);
        self.faces.clear();
    }

    /// Number of faces known to the book.
    pub fn face_count(&self) -> usize {
        self.db.len()
    }

    pub(crate) fn face(&mut self, family: &str, weight: u16) -> Option<Arc<LoadedFace>> {
        let key = (family.to_string(), weight);
        if let Some(cached) = self.faces.get(&key) {
            return cached.clone();
        }
        let loaded = self.load_face(family, weight).map(Arc::new);
        if loaded.is_none() && self.warned.insert(family.to_string()) {
            tracing::warn!(family, weight, "no font face available, text will not be drawn");
        }
        self.faces.insert(key, loaded.clone());
        loaded
    }

    fn load_face(&mut self, family: &str, weight: u16) -> Option<LoadedFace> {
        use usvg::fontdb::{Family, Query, Stretch, Style, Weight};

        let families = [Family::Name(family), Family::SansSerif];
        let query = Query {
            families: &families,
            weight: Weight(weight),
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self
            .db
            .query(&query)
            .or_else(|| self.db.faces().next().map(|f| f.id))?;
        let face_weight = self.db.face(id).map_or(weight, |f| f.weight.0);
        let (bytes, index) = self
            .db
            .with_face_data(id, |data, index| (data.to_vec(), index))?;

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id)?;
        let registered = self.font_ctx.collection.family_name(family_id)?.to_string();
        tracing::debug!(requested = family, resolved = %registered, weight = face_weight, "resolved font face");

        Some(LoadedFace {
            family: registered,
            weight: face_weight,
            font: vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), index),
        })
    }

    /// Shape `text` on a single line. `None` when no face can be resolved.
    pub fn shape(&mut self, text: &str, font: &FontSpec, brush: Rgba8) -> Option<ShapedText> {
        if text.is_empty() || !font.size_px.is_finite() || font.size_px <= 0.0 {
            return None;
        }
        let face = self.face(&font.family, font.weight)?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(face.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(f32::from(face.weight)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font.size_px as f32));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrushRgba8::from(brush)));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);

        let (middle, height) = layout
            .lines()
            .next()
            .map(|line| {
                let m = line.metrics();
                (
                    f64::from(m.baseline) - f64::from(m.ascent - m.descent) / 2.0,
                    f64::from(m.line_height),
                )
            })
            .unwrap_or((font.size_px / 2.0, font.size_px));

        Some(ShapedText {
            width: f64::from(layout.width()),
            layout,
            font: face.font.clone(),
            middle,
            height,
        })
    }
}

impl TextMeasurer for FontBook {
    fn measure(&mut self, text: &str, font: &FontSpec) -> f64 {
        match self.shape(text, font, Rgba8::WHITE) {
            Some(shaped) => shaped.width,
            None => text.chars().count() as f64 * font.size_px * FALLBACK_ADVANCE_EM,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/text.rs"]
mod tests;
