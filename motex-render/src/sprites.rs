use anyhow::{Context, Result, anyhow};
use motex_core::SpriteId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::{Color, ColorU8, Paint, Pixmap, Rect, Transform};

/// Decodes a PNG into a premultiplied pixmap.
pub fn load_png(path: &Path) -> Result<Pixmap> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    let mut pm = Pixmap::new(w, h).ok_or_else(|| anyhow!("empty image {}", path.display()))?;
    for (dst, px) in pm.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = px.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pm)
}

/// White fixation cross with 2px bars, `size` pixels across.
pub fn placeholder_cross(size: u32) -> Option<Pixmap> {
    let mut pm = Pixmap::new(size, size)?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::WHITE);

    let extent = size as f32;
    let h = Rect::from_xywh(0.0, (extent - 2.0) * 0.5, extent, 2.0)?;
    pm.fill_rect(h, &paint, Transform::identity(), None);
    let v = Rect::from_xywh((extent - 2.0) * 0.5, 0.0, 2.0, extent)?;
    pm.fill_rect(v, &paint, Transform::identity(), None);
    Some(pm)
}

/// Lazily loaded `<dir>/<sprite>.png` images.
///
/// A sprite that fails to load is logged once and replaced by the
/// placeholder cross for the rest of the session.
pub struct SpriteAtlas {
    dir: PathBuf,
    loaded: HashMap<SpriteId, Option<Arc<Pixmap>>>,
    placeholder: Option<Arc<Pixmap>>,
}

impl SpriteAtlas {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: HashMap::new(),
            placeholder: placeholder_cross(40).map(Arc::new),
        }
    }

    pub fn path_of(&self, id: &SpriteId) -> PathBuf {
        self.dir.join(format!("{}.png", id.as_str()))
    }

    pub fn get(&mut self, id: &SpriteId) -> Option<Arc<Pixmap>> {
        if let Some(entry) = self.loaded.get(id) {
            return entry.clone().or_else(|| self.placeholder.clone());
        }
        let path = self.path_of(id);
        let entry = match load_png(&path) {
            Ok(pm) => {
                tracing::debug!(sprite = %id, w = pm.width(), h = pm.height(), "sprite loaded");
                Some(Arc::new(pm))
            }
            Err(err) => {
                tracing::warn!(sprite = %id, error = %format!("{err:#}"), "sprite unavailable, using placeholder");
                None
            }
        };
        self.loaded.insert(id.clone(), entry.clone());
        entry.or_else(|| self.placeholder.clone())
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_has_white_centre_and_clear_corners() {
        let pm = placeholder_cross(40).unwrap();
        let centre = pm.pixel(20, 20).unwrap();
        assert_eq!((centre.red(), centre.alpha()), (255, 255));
        assert_eq!(pm.pixel(0, 0).unwrap().alpha(), 0);
        assert_eq!(pm.pixel(39, 39).unwrap().alpha(), 0);
    }

    #[test]
    fn png_is_loaded_premultiplied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulus.png");
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 100, 0, 128]));
        img.save(&path).unwrap();

        let pm = load_png(&path).unwrap();
        assert_eq!((pm.width(), pm.height()), (4, 3));
        let px = pm.pixel(1, 1).unwrap();
        assert_eq!(px.alpha(), 128);
        assert!(px.red() <= 101 && px.red() >= 99);
    }

    #[test]
    fn missing_sprite_falls_back_to_placeholder_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut atlas = SpriteAtlas::new(dir.path());
        let a = atlas.get(&SpriteId::new("focus")).unwrap();
        let b = atlas.get(&SpriteId::new("focus")).unwrap();
        assert_eq!(a.width(), 40);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(atlas.len(), 1);
    }

    #[test]
    fn sprite_is_read_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 255, 255]))
            .save(dir.path().join("stimulus.png"))
            .unwrap();
        let mut atlas = SpriteAtlas::new(dir.path());
        let pm = atlas.get(&SpriteId::new("stimulus")).unwrap();
        assert_eq!(pm.width(), 8);
        assert_eq!(pm.pixel(3, 3).unwrap().blue(), 255);
    }
}
