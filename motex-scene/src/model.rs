use crate::ball::{BallAnimator, BallState, EntityHandle};
use crate::ports::{Scene, Ui};
use motex_core::{SpriteId, Vec3};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallSnapshot {
    pub position: Vec3,
    pub visible: bool,
    pub state: BallState,
}

/// What the renderer needs to draw one frame of the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSnapshot {
    pub path: Vec<Vec3>,
    pub end_marker: Option<Vec3>,
    pub ball: Option<BallSnapshot>,
}

impl SceneSnapshot {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.end_marker.is_none() && self.ball.is_none()
    }
}

#[derive(Debug, Default)]
struct SceneModel {
    path: Vec<Vec3>,
    end_marker: Option<Vec3>,
    ball: Option<BallAnimator>,
}

/// In-memory scene shared between the lesson task, the physics driver and
/// the renderer.
#[derive(Debug, Clone)]
pub struct SharedScene {
    inner: Arc<Mutex<SceneModel>>,
    drift_after_finish: bool,
}

impl SharedScene {
    pub fn new(drift_after_finish: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SceneModel::default())),
            drift_after_finish,
        }
    }

    /// Advances the ball, if any, by one physics step.
    pub fn tick(&self, dt: Duration) -> bool {
        self.lock().ball.as_mut().is_some_and(|ball| ball.tick(dt))
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let model = self.lock();
        SceneSnapshot {
            path: model.path.clone(),
            end_marker: model.end_marker,
            ball: model.ball.as_ref().map(|b| BallSnapshot {
                position: b.position(),
                visible: b.is_visible(),
                state: b.state(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SceneModel> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scene for SharedScene {
    fn place_path(&self, points: &[Vec3]) {
        self.lock().path = points.to_vec();
    }

    fn place_end_marker(&self, point: Vec3) {
        self.lock().end_marker = Some(point);
    }

    fn spawn_moving_entity(&self, speed: f32, points: &[Vec3]) -> EntityHandle {
        let (ball, handle) = BallAnimator::spawn(points, speed, self.drift_after_finish);
        self.lock().ball = Some(ball);
        handle
    }

    fn set_entity_visible(&self, visible: bool) {
        if let Some(ball) = self.lock().ball.as_mut() {
            ball.set_visible(visible);
        }
    }

    fn stop_entity(&self) {
        if let Some(ball) = self.lock().ball.as_mut() {
            ball.stop();
        }
    }

    fn clear_scene(&self) {
        let mut model = self.lock();
        model.path.clear();
        model.end_marker = None;
        model.ball = None;
    }
}

/// What the renderer needs to draw the overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiSnapshot {
    pub image: Option<SpriteId>,
    pub image_visible: bool,
    pub end_screen: bool,
    pub instruction: Option<String>,
    pub accuracy_text: Option<String>,
}

impl UiSnapshot {
    pub fn all_hidden(&self) -> bool {
        !self.image_visible
            && !self.end_screen
            && self.instruction.is_none()
            && self.accuracy_text.is_none()
    }

    /// The image to draw this frame, if visible.
    pub fn visible_image(&self) -> Option<&SpriteId> {
        self.image.as_ref().filter(|_| self.image_visible)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedUi {
    inner: Arc<Mutex<UiSnapshot>>,
}

impl SharedUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UiSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, UiSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Ui for SharedUi {
    fn show_focus_image(&self, sprite: &SpriteId) {
        let mut ui = self.lock();
        ui.image = Some(sprite.clone());
        ui.image_visible = true;
    }

    fn set_image_visible(&self, visible: bool) {
        self.lock().image_visible = visible;
    }

    fn show_end_screen(&self, visible: bool) {
        self.lock().end_screen = visible;
    }

    fn show_instruction(&self, text: &str, visible: bool) {
        let mut ui = self.lock();
        if visible {
            ui.instruction = Some(text.to_owned());
        } else if ui.instruction.as_deref() == Some(text) {
            ui.instruction = None;
        }
    }

    fn show_accuracy_text(&self, text: &str) {
        self.lock().accuracy_text = Some(text.to_owned());
    }

    fn hide_accuracy_text(&self) {
        self.lock().accuracy_text = None;
    }

    fn hide_all_overlays(&self) {
        let mut ui = self.lock();
        ui.image_visible = false;
        ui.end_screen = false;
        ui.instruction = None;
        ui.accuracy_text = None;
    }
}
