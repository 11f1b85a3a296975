use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use string_cache::DefaultAtom as Atom;
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// Rasterises a single line of text into a tight transparent pixmap.
///
/// Returns `None` for text without any visible glyph.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: [u8; 4],
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // baseline at ascent
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
    let (min_x, min_y, max_x, max_y) = outlines.iter().map(|o| o.px_bounds()).fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), b| (x0.min(b.min.x), y0.min(b.min.y), x1.max(b.max.x), y1.max(b.max.y)),
    );
    if outlines.is_empty() {
        return None;
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

            // premultiplied source-over
            let a = (cov * color[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let inv = 1.0 - a;
            let bg = dst[i];
            let blend = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let r = blend(color[0], bg.red());
            let g = blend(color[1], bg.green());
            let bl = blend(color[2], bg.blue());
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            // rounding can push a channel past alpha
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }
    Some(pm)
}

/// Rendered text lines keyed by interned string.
pub struct TextCache {
    font: Option<FontVec>,
    size_px: f32,
    color: [u8; 4],
    map: HashMap<Atom, Option<Arc<Pixmap>>>,
}

impl TextCache {
    pub fn new(font: Option<FontVec>, size_px: f32, color: [u8; 4]) -> Self {
        Self {
            font,
            size_px,
            color,
            map: HashMap::new(),
        }
    }

    /// Loads the font at `path`. A missing or invalid font disables text.
    pub fn load(path: Option<&Path>, size_px: f32, color: [u8; 4]) -> Self {
        let font = path.and_then(|p| {
            let bytes = match std::fs::read(p) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(path = %p.display(), %err, "font unreadable, text disabled");
                    return None;
                }
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(err) => {
                    tracing::warn!(path = %p.display(), %err, "invalid font, text disabled");
                    None
                }
            }
        });
        Self::new(font, size_px, color)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn get_or_render(&mut self, text: &str) -> Option<Arc<Pixmap>> {
        let font = self.font.as_ref()?;
        let atom = Atom::from(text);
        if let Some(p) = self.map.get(&atom) {
            return p.clone();
        }
        let pm = render_text_pixmap(text, self.size_px, font, self.color).map(Arc::new);
        self.map.insert(atom, pm.clone());
        pm
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_font_nothing_is_rendered_or_cached() {
        let mut cache = TextCache::load(None, 24.0, [255; 4]);
        assert!(!cache.has_font());
        assert!(cache.get_or_render("Accuracy: 90.0%").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn unreadable_font_disables_text() {
        let cache = TextCache::load(Some(Path::new("/nonexistent/font.ttf")), 24.0, [255; 4]);
        assert!(!cache.has_font());
    }
}
