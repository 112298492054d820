use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use string_cache::DefaultAtom as Atom;
use tiny_skia::{ColorU8, Pixmap};

/// Upper bound on cached label pixmaps. Info lines change every frame.
const MAX_CACHED_TEXT: usize = 512;

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("parsing font {}", path.display()))
}

/// Rasterizes one line of text into a tightly cropped, premultiplied pixmap.
///
/// Returns `None` when the text has no visible glyphs.
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: [u8; 4]) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Layout with baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov.min(1.0) * color[3] as f32) as u8;
            // Overlapping glyph edges keep the stronger coverage
            if a > dst[i].alpha() {
                dst[i] = ColorU8::from_rgba(color[0], color[1], color[2], a).premultiply();
            }
        });
    }

    Some(pm)
}

/// Rendered labels keyed by interned text, pixel size and color.
pub struct TextCache {
    font: FontVec,
    map: HashMap<(Atom, u32, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontVec) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    pub fn get_or_render(&mut self, text: &str, size_px: f32, color: [u8; 4]) -> Option<Arc<Pixmap>> {
        let key = (Atom::from(text), size_px.to_bits(), color);
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, size_px, &self.font, color)?);
        if self.map.len() >= MAX_CACHED_TEXT {
            self.map.clear();
        }
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
