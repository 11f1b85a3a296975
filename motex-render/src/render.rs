use crate::config::{RenderConfig, Rgba};
use crate::sprites::SpriteAtlas;
use crate::text::TextCache;
use anyhow::{Result, anyhow, bail};
use motex_core::Vec3;
use motex_scene::{SceneSnapshot, UiSnapshot};
use motex_timing::{HighPrecisionTimer, Timer};
use std::time::Duration;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
}

const END_PANEL_SHADE: Rgba = [0, 0, 0, 160];
const LINE_SPACING: f32 = 1.3;

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn blit_centered(canvas: &mut Pixmap, pm: &Pixmap, cx: f32, cy: f32) {
    let x = (cx - pm.width() as f32 * 0.5).round() as i32;
    let y = (cy - pm.height() as f32 * 0.5).round() as i32;
    canvas.draw_pixmap(
        x,
        y,
        pm.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Draws scene and overlay snapshots onto an RGBA canvas.
///
/// Scene coordinates are orthographic: the origin sits at the window centre,
/// x grows right and y grows up. `z` is ignored.
pub struct SkiaRenderer {
    config: RenderConfig,
    canvas: Pixmap,
    sprites: SpriteAtlas,
    text: TextCache,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, config: RenderConfig) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        let sprites = SpriteAtlas::new(&config.sprite_dir);
        let text = TextCache::load(config.font_path.as_deref(), config.font_size, config.text_color);
        tracing::info!(width, height, text = text.has_font(), "renderer ready");
        Ok(Self {
            config,
            canvas,
            sprites,
            text,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        tracing::debug!(width, height, "canvas resized");
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Scene point to canvas pixel.
    pub fn project(&self, p: Vec3) -> (f32, f32) {
        let ppu = self.config.pixels_per_unit;
        (
            self.canvas.width() as f32 * 0.5 + p.x * ppu,
            self.canvas.height() as f32 * 0.5 - p.y * ppu,
        )
    }

    pub fn draw(&mut self, scene: &SceneSnapshot, ui: &UiSnapshot) {
        let [r, g, b, a] = self.config.background;
        self.canvas.fill(Color::from_rgba8(r, g, b, a));

        self.draw_scene(scene);

        let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);
        if let Some(id) = ui.visible_image() {
            if let Some(pm) = self.sprites.get(id) {
                blit_centered(&mut self.canvas, &pm, w * 0.5, h * 0.5);
            }
        }
        if let Some(instruction) = &ui.instruction {
            self.draw_lines(instruction, h * 0.2);
        }
        if ui.end_screen {
            if let Some(panel) = Rect::from_xywh(0.0, h * 0.75, w, h * 0.25) {
                self.canvas
                    .fill_rect(panel, &paint(END_PANEL_SHADE), Transform::identity(), None);
            }
            let text = self.config.end_screen_text.clone();
            self.draw_lines(&text, h * 0.85);
        }
        if let Some(accuracy) = &ui.accuracy_text {
            self.draw_lines(accuracy, h * 0.65);
        }
    }

    fn draw_scene(&mut self, scene: &SceneSnapshot) {
        let cfg = &self.config;

        if scene.path.len() >= 2 {
            let mut pb = PathBuilder::new();
            let (x, y) = self.project(scene.path[0]);
            pb.move_to(x, y);
            for p in &scene.path[1..] {
                let (x, y) = self.project(*p);
                pb.line_to(x, y);
            }
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width: cfg.path_width_px,
                    ..Stroke::default()
                };
                self.canvas.stroke_path(
                    &path,
                    &paint(cfg.path_color),
                    &stroke,
                    Transform::identity(),
                    None,
                );
            }
        }

        if let Some(marker) = scene.end_marker {
            let (x, y) = self.project(marker);
            if let Some(ring) = PathBuilder::from_circle(x, y, cfg.marker_radius_px) {
                let stroke = Stroke {
                    width: 3.0,
                    ..Stroke::default()
                };
                self.canvas.stroke_path(
                    &ring,
                    &paint(cfg.marker_color),
                    &stroke,
                    Transform::identity(),
                    None,
                );
            }
        }

        if let Some(ball) = scene.ball.filter(|b| b.visible) {
            let (x, y) = self.project(ball.position);
            if let Some(disc) = PathBuilder::from_circle(x, y, cfg.ball_radius_px) {
                self.canvas.fill_path(
                    &disc,
                    &paint(cfg.ball_color),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }
    }

    /// Horizontally centred lines, the first one centred on `top_y`.
    fn draw_lines(&mut self, text: &str, top_y: f32) {
        let cx = self.canvas.width() as f32 * 0.5;
        let step = self.config.font_size * LINE_SPACING;
        for (i, line) in text.lines().enumerate() {
            if let Some(pm) = self.text.get_or_render(line) {
                blit_centered(&mut self.canvas, &pm, cx, top_y + i as f32 * step);
            }
        }
    }

    /// Draws a frame and copies it into `frame`, which must hold exactly
    /// `width * height * 4` bytes.
    pub fn render_frame(
        &mut self,
        scene: &SceneSnapshot,
        ui: &UiSnapshot,
        frame: &mut [u8],
        timer: &mut HighPrecisionTimer,
    ) -> Result<FrameStats> {
        let t0 = timer.now();
        self.draw(scene, ui);
        let draw = timer.elapsed(t0);

        // the background is opaque, so premultiplied bytes equal straight RGBA
        let t1 = timer.now();
        let data = self.canvas.data();
        if frame.len() != data.len() {
            bail!(
                "frame buffer holds {} bytes, canvas needs {}",
                frame.len(),
                data.len()
            );
        }
        frame.copy_from_slice(data);
        let copy = timer.elapsed(t1);

        let total = timer.elapsed(t0);
        timer.record_frame(total);
        Ok(FrameStats { draw, copy, total })
    }
}
