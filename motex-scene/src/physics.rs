use crate::model::SharedScene;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Fixed-step physics loop: ticks `scene` every `period` until `cancel` fires.
///
/// Missed ticks are caught up in a burst so the ball covers the same
/// distance per wall-clock second under load.
pub async fn run_physics(scene: &SharedScene, period: Duration, cancel: &CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    tracing::debug!(?period, "physics loop started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                scene.tick(period);
            }
        }
    }
    tracing::debug!("physics loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Scene;
    use motex_core::Vec3;

    #[tokio::test(start_paused = true)]
    async fn physics_resolves_entity_completion() {
        let scene = SharedScene::new(false);
        let cancel = CancellationToken::new();
        let mut handle =
            scene.spawn_moving_entity(0.1, &[Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)]);

        let driver = {
            let scene = scene.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_physics(&scene, Duration::from_millis(20), &cancel).await;
            })
        };

        handle.finished().await.unwrap();
        assert_eq!(scene.snapshot().ball.unwrap().position, Vec3::new(1.0, 0.0, 0.0));

        cancel.cancel();
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_loop_stops_ticking() {
        let scene = SharedScene::new(true);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let _h = scene.spawn_moving_entity(1.0, &[Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)]);
        run_physics(&scene, Duration::from_millis(20), &cancel).await;
        assert_eq!(scene.snapshot().ball.unwrap().position, Vec3::ZERO);
    }
}
