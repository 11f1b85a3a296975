mod config;
mod render;
mod sprites;
mod text;

pub use config::RenderConfig;
pub use render::{FrameStats, SkiaRenderer};
pub use sprites::{SpriteAtlas, load_png, placeholder_cross};
pub use text::{TextCache, render_text_pixmap};
