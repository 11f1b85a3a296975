use crate::ball::EntityHandle;
use motex_core::{SpriteId, Vec3};

/// Scene capabilities a protocol drives. Implementations own the scene
/// objects; the core only issues commands.
pub trait Scene {
    /// Shows the trajectory polyline.
    fn place_path(&self, points: &[Vec3]);
    /// Shows the target marker at the end of the trajectory.
    fn place_end_marker(&self, point: Vec3);
    /// Places the ball at the first point and starts it moving.
    fn spawn_moving_entity(&self, speed: f32, points: &[Vec3]) -> EntityHandle;
    fn set_entity_visible(&self, visible: bool);
    fn stop_entity(&self);
    /// Removes the path, the marker and the ball.
    fn clear_scene(&self);
}

/// Overlay capabilities around the scene.
pub trait Ui {
    /// Sets the centre image and makes it visible.
    fn show_focus_image(&self, sprite: &SpriteId);
    fn set_image_visible(&self, visible: bool);
    fn show_end_screen(&self, visible: bool);
    fn show_instruction(&self, text: &str, visible: bool);
    fn show_accuracy_text(&self, text: &str);
    fn hide_accuracy_text(&self);
    fn hide_all_overlays(&self);
}
