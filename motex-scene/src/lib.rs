pub mod ball;
pub mod model;
pub mod physics;
pub mod ports;

pub use ball::{BallAnimator, BallState, EntityHandle, EntityLost};
pub use model::{BallSnapshot, SceneSnapshot, SharedScene, SharedUi, UiSnapshot};
pub use physics::run_physics;
pub use ports::{Scene, Ui};
