use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Straight (non-premultiplied) RGBA.
pub type Rgba = [u8; 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory holding `<sprite>.png` files.
    pub sprite_dir: PathBuf,
    /// TrueType/OpenType font for overlay text; text is skipped without one.
    pub font_path: Option<PathBuf>,
    /// Scene units to screen pixels; the scene origin is the window centre.
    pub pixels_per_unit: f32,
    pub font_size: f32,
    pub ball_radius_px: f32,
    pub marker_radius_px: f32,
    pub path_width_px: f32,
    pub background: Rgba,
    pub path_color: Rgba,
    pub ball_color: Rgba,
    pub marker_color: Rgba,
    pub text_color: Rgba,
    pub end_screen_text: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sprite_dir: PathBuf::from("assets/sprites"),
            font_path: None,
            pixels_per_unit: 100.0,
            font_size: 32.0,
            ball_radius_px: 18.0,
            marker_radius_px: 26.0,
            path_width_px: 3.0,
            background: [128, 128, 128, 255],
            path_color: [40, 40, 40, 255],
            ball_color: [220, 30, 30, 255],
            marker_color: [30, 160, 60, 255],
            text_color: [255, 255, 255, 255],
            end_screen_text: "Press SPACE to continue".to_owned(),
        }
    }
}
