use motex_core::Vec3;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallState {
    Idle,
    Moving,
    Stopped,
    Finished,
}

/// The ball was removed before it reached the end of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("moving entity removed before finishing its path")]
pub struct EntityLost;

/// Handle to a spawned ball; resolves once it reaches its final vertex.
#[derive(Debug, Clone)]
pub struct EntityHandle {
    finished: watch::Receiver<bool>,
}

impl EntityHandle {
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    pub async fn finished(&mut self) -> Result<(), EntityLost> {
        self.finished
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| EntityLost)
    }
}

/// Moves a ball along a polyline by a fixed step per physics tick.
///
/// `Idle -> Moving -> (Stopped | Finished)`. Reaching the final vertex emits
/// the completion signal once but does not stop the ball; with
/// `drift_after_finish` later ticks keep it moving along the direction of the
/// last segment at `speed` units per second.
#[derive(Debug)]
pub struct BallAnimator {
    position: Vec3,
    path: Vec<Vec3>,
    speed: f32,
    index: usize,
    state: BallState,
    visible: bool,
    drift_after_finish: bool,
    finish_emitted: bool,
    finished_tx: watch::Sender<bool>,
}

impl BallAnimator {
    pub fn new(drift_after_finish: bool) -> Self {
        let (finished_tx, _) = watch::channel(false);
        Self {
            position: Vec3::ZERO,
            path: Vec::new(),
            speed: 0.0,
            index: 0,
            state: BallState::Idle,
            visible: true,
            drift_after_finish,
            finish_emitted: false,
            finished_tx,
        }
    }

    /// Creates a ball at the first point of `path` already moving.
    pub fn spawn(path: &[Vec3], speed: f32, drift_after_finish: bool) -> (Self, EntityHandle) {
        let mut ball = Self::new(drift_after_finish);
        ball.position = path.first().copied().unwrap_or(Vec3::ZERO);
        let handle = ball.set_params(path.to_vec(), speed);
        (ball, handle)
    }

    /// Restarts traversal from vertex 0 and re-arms the completion signal.
    pub fn set_params(&mut self, path: Vec<Vec3>, speed: f32) -> EntityHandle {
        let (finished_tx, finished) = watch::channel(false);
        self.path = path;
        self.speed = speed;
        self.index = 0;
        self.state = BallState::Moving;
        self.finish_emitted = false;
        self.finished_tx = finished_tx;
        EntityHandle { finished }
    }

    pub fn subscribe(&self) -> EntityHandle {
        EntityHandle {
            finished: self.finished_tx.subscribe(),
        }
    }

    pub fn stop(&mut self) {
        self.state = BallState::Stopped;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Advances one physics step. Returns true on the tick that emitted the
    /// completion signal.
    pub fn tick(&mut self, dt: Duration) -> bool {
        if !matches!(self.state, BallState::Moving | BallState::Finished) {
            return false;
        }
        if self.path.is_empty() {
            return self.finish();
        }

        if self.index < self.path.len() {
            let target = self.path[self.index];
            self.position = self.position.move_towards(target, self.speed);
            if self.position == target {
                self.index += 1;
                if self.index == self.path.len() {
                    return self.finish();
                }
            }
        } else if self.drift_after_finish {
            self.position += self.exit_direction() * (self.speed * dt.as_secs_f32());
        }
        false
    }

    fn finish(&mut self) -> bool {
        if self.finish_emitted {
            return false;
        }
        self.finish_emitted = true;
        self.state = BallState::Finished;
        self.finished_tx.send_replace(true);
        tracing::debug!(position = ?self.position, "ball reached final vertex");
        true
    }

    fn exit_direction(&self) -> Vec3 {
        match self.path.as_slice() {
            [.., prev, last] => (*last - *prev).normalized(),
            _ => Vec3::ZERO,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn state(&self) -> BallState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn target_index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(20);

    fn line() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn walks_the_polyline_and_finishes_once() {
        let (mut ball, handle) = BallAnimator::spawn(&line(), 0.5, false);
        assert_eq!(ball.state(), BallState::Moving);

        let mut emitted = 0;
        for _ in 0..10 {
            if ball.tick(DT) {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1);
        assert!(handle.is_finished());
        assert_eq!(ball.state(), BallState::Finished);
        assert_eq!(ball.position(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn first_tick_arrives_at_start_vertex() {
        let (mut ball, _h) = BallAnimator::spawn(&line(), 0.25, false);
        assert!(!ball.tick(DT));
        assert_eq!(ball.target_index(), 1);
        assert_eq!(ball.position(), Vec3::ZERO);
        ball.tick(DT);
        assert!((ball.position().x - 0.25).abs() < 1e-6);
    }

    #[test]
    fn stop_freezes_position() {
        let (mut ball, handle) = BallAnimator::spawn(&line(), 0.25, true);
        ball.tick(DT);
        ball.tick(DT);
        ball.stop();
        let frozen = ball.position();
        for _ in 0..20 {
            assert!(!ball.tick(DT));
        }
        assert_eq!(ball.position(), frozen);
        assert_eq!(ball.state(), BallState::Stopped);
        assert!(!handle.is_finished());
    }

    #[test]
    fn drift_continues_along_last_segment() {
        let (mut ball, _h) = BallAnimator::spawn(&line(), 1.0, true);
        while !ball.tick(DT) {}
        let end = ball.position();
        ball.tick(Duration::from_millis(500));
        let p = ball.position();
        assert_eq!(p.x, end.x);
        assert!((p.y - (end.y + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn without_drift_ball_rests_on_final_vertex() {
        let (mut ball, _h) = BallAnimator::spawn(&line(), 1.0, false);
        while !ball.tick(DT) {}
        for _ in 0..5 {
            ball.tick(DT);
        }
        assert_eq!(ball.position(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn set_params_restarts_and_rearms() {
        let (mut ball, first) = BallAnimator::spawn(&line(), 5.0, false);
        while !ball.tick(DT) {}
        assert!(first.is_finished());

        ball.stop();
        let second = ball.set_params(vec![Vec3::new(3.0, 0.0, 0.0)], 5.0);
        assert_eq!(ball.state(), BallState::Moving);
        assert_eq!(ball.target_index(), 0);
        assert!(!second.is_finished());
        assert!(ball.tick(DT));
        assert!(second.is_finished());
    }

    #[test]
    fn empty_path_finishes_on_first_tick() {
        let (mut ball, handle) = BallAnimator::spawn(&[], 1.0, true);
        assert!(ball.tick(DT));
        assert!(!ball.tick(DT));
        assert!(handle.is_finished());
    }

    #[test]
    fn single_vertex_path_does_not_drift() {
        let (mut ball, _h) = BallAnimator::spawn(&[Vec3::new(2.0, 2.0, 2.0)], 1.0, true);
        assert!(ball.tick(DT));
        ball.tick(DT);
        assert_eq!(ball.position(), Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn idle_ball_ignores_ticks() {
        let mut ball = BallAnimator::new(true);
        assert!(!ball.tick(DT));
        assert_eq!(ball.state(), BallState::Idle);
    }

    #[test]
    fn visibility_is_independent_of_motion() {
        let (mut ball, _h) = BallAnimator::spawn(&line(), 0.25, false);
        ball.set_visible(false);
        ball.tick(DT);
        ball.tick(DT);
        assert!(!ball.is_visible());
        assert!(ball.position().x > 0.0);
    }
}
