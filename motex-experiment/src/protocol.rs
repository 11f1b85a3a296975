use crate::config::ProtocolTimings;
use crate::storage::StorageError;
use motex_core::{
    Condition, EventName, EventOffsets, Motion, Protocol, SpriteId, TrialRecord, ValueKey,
};
use motex_scene::{EntityHandle, EntityLost, Scene, Ui};
use motex_timing::{Cancelled, CancellationToken, Signals, delay_ms};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("trial cancelled")]
    Cancelled,
    #[error(transparent)]
    EntityLost(#[from] EntityLost),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<Cancelled> for TrialError {
    fn from(_: Cancelled) -> Self {
        TrialError::Cancelled
    }
}

impl TrialError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrialError::Cancelled)
    }
}

/// Borrowed collaborators one trial runs against.
pub struct Stage<'a, S, U> {
    pub scene: &'a S,
    pub ui: &'a U,
    pub signals: &'a Signals,
    pub timings: &'a ProtocolTimings,
    pub cancel: &'a CancellationToken,
}

impl<S: Scene, U: Ui> Stage<'_, S, U> {
    pub(crate) async fn hold(&self, ms: u64) -> Result<(), Cancelled> {
        delay_ms(ms, self.cancel).await
    }

    pub(crate) async fn space(&self) -> Result<Duration, Cancelled> {
        self.signals.wait_for_space(self.cancel).await
    }

    /// Path, end marker and a ball already moving from the first vertex.
    fn place(&self, motion: &Motion) -> EntityHandle {
        self.scene.place_path(&motion.path);
        if let Some(end) = motion.end() {
            self.scene.place_end_marker(end);
        }
        self.scene.spawn_moving_entity(motion.speed, &motion.path)
    }

    /// Returns scene and overlays to their empty state.
    pub fn clean_up(&self) {
        self.scene.clear_scene();
        self.ui.hide_all_overlays();
    }

    fn offsets(&self) -> EventOffsets {
        self.timings.offsets()
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Runs one protocol to completion, filling `record` with its values,
/// events and accuracy. Any error leaves the scene cleared and every
/// overlay hidden.
pub async fn run_protocol<S: Scene, U: Ui>(
    stage: &Stage<'_, S, U>,
    condition: &Condition,
    record: &mut TrialRecord,
) -> Result<(), TrialError> {
    tracing::debug!(kind = condition.kind().code(), duration_ms = condition.duration_ms, "protocol start");
    let outcome = match &condition.protocol {
        Protocol::ImmediateStop(motion) => immediate_stop(stage, condition, motion, record).await,
        Protocol::ControlledStop(motion) => controlled_stop(stage, condition, motion, record).await,
        Protocol::OccludedReverse { motion, stimulus } => {
            occluded_reverse(stage, condition, motion, stimulus, record).await
        }
        Protocol::Reproduction { stimulus } => reproduction(stage, condition, stimulus, record).await,
    };
    if let Err(err) = &outcome {
        tracing::debug!(kind = condition.kind().code(), %err, "protocol interrupted");
        stage.clean_up();
    }
    outcome
}

fn motion_values(record: &mut TrialRecord, condition: &Condition, motion: &Motion) {
    record.set_value(ValueKey::Label, condition.presentation.label.as_str());
    record.set_value(ValueKey::Speed, motion.speed);
    record.set_value(ValueKey::Duration, condition.duration_ms);
    if !condition.variant.is_empty() {
        record.set_value(ValueKey::Variant, condition.variant.as_str());
    }
}

async fn immediate_stop<S: Scene, U: Ui>(
    stage: &Stage<'_, S, U>,
    condition: &Condition,
    motion: &Motion,
    record: &mut TrialRecord,
) -> Result<(), TrialError> {
    let t = stage.timings;
    stage.hold(t.lead_in_ms).await?;

    stage.ui.set_image_visible(false);
    let _ball = stage.place(motion);

    let response = stage.signals.space.begin_wait(stage.cancel).resolve();
    tokio::pin!(response);
    let elapsed = tokio::select! {
        biased;
        res = &mut response => res?,
        occluded = delay_ms(t.occluder_ms, stage.cancel) => {
            occluded?;
            tracing::trace!("ball occluded");
            stage.scene.set_entity_visible(false);
            response.await?
        }
    };

    stage.scene.set_entity_visible(true);
    stage.scene.stop_entity();
    stage.hold(t.trailing_ms).await?;
    stage.scene.clear_scene();

    let d = f64::from(condition.duration_ms);
    motion_values(record, condition, motion);
    record.add_occluder(d, stage.offsets());
    record.add_move(d, stage.offsets());
    record.push_event(EventName::ActualMoveDuration, millis(elapsed));
    record.score(EventName::RefMoveToTarget, EventName::ActualMoveDuration);
    Ok(())
}

async fn controlled_stop<S: Scene, U: Ui>(
    stage: &Stage<'_, S, U>,
    condition: &Condition,
    motion: &Motion,
    record: &mut TrialRecord,
) -> Result<(), TrialError> {
    let t = stage.timings;
    stage.hold(t.lead_in_ms).await?;

    stage.ui.set_image_visible(false);
    let _ball = stage.place(motion);
    let elapsed = stage.space().await?;

    stage.scene.stop_entity();
    stage.hold(t.trailing_ms).await?;
    stage.scene.clear_scene();

    let d = f64::from(condition.duration_ms);
    let offsets = stage.offsets();
    motion_values(record, condition, motion);
    record.add_move(d, offsets);
    record.push_event(EventName::RefMoveToTarget, d + offsets.stage_ms);
    record.push_event(EventName::ActualMoveDuration, millis(elapsed));
    record.score(EventName::RefMoveToTarget, EventName::ActualMoveDuration);
    Ok(())
}

async fn occluded_reverse<S: Scene, U: Ui>(
    stage: &Stage<'_, S, U>,
    condition: &Condition,
    motion: &Motion,
    stimulus: &SpriteId,
    record: &mut TrialRecord,
) -> Result<(), TrialError> {
    let t = stage.timings;
    stage.hold(t.lead_in_ms).await?;

    let mut ball = stage.place(motion);
    tokio::select! {
        biased;
        _ = stage.cancel.cancelled() => return Err(TrialError::Cancelled),
        finished = ball.finished() => finished?,
    }

    stage.scene.stop_entity();
    stage.hold(t.trailing_ms).await?;
    stage.scene.clear_scene();

    stage.ui.show_focus_image(stimulus);
    let elapsed = stage.space().await?;
    stage.ui.set_image_visible(false);

    let d = f64::from(condition.duration_ms);
    motion_values(record, condition, motion);
    record.add_move(d, stage.offsets());
    record.add_isi(d, stage.offsets());
    record.push_event(EventName::RefPath, d);
    record.push_event(EventName::ActualStimToResponse, millis(elapsed));
    record.score(EventName::RefPath, EventName::ActualStimToResponse);
    Ok(())
}

async fn reproduction<S: Scene, U: Ui>(
    stage: &Stage<'_, S, U>,
    condition: &Condition,
    stimulus: &SpriteId,
    record: &mut TrialRecord,
) -> Result<(), TrialError> {
    let t = stage.timings;
    stage.hold(t.lead_in_ms).await?;

    stage.ui.show_focus_image(stimulus);
    stage.hold(u64::from(condition.duration_ms)).await?;
    stage.ui.show_focus_image(&condition.presentation.focus);
    stage.hold(t.isi_ms).await?;
    stage.ui.show_focus_image(stimulus);
    let elapsed = stage.space().await?;
    stage.ui.set_image_visible(false);

    let d = f64::from(condition.duration_ms);
    record.set_value(ValueKey::Label, condition.presentation.label.as_str());
    record.set_value(ValueKey::Duration, condition.duration_ms);
    record.add_stim(d, stage.offsets());
    record.add_isi(d, stage.offsets());
    record.push_event(EventName::RefStim, d);
    record.push_event(EventName::ActualStimToResponse, millis(elapsed));
    record.score(EventName::RefStim, EventName::ActualStimToResponse);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Rig, press_space_after};
    use motex_core::{ConditionTemplate, ProtocolKind, TrialParams, Vec3};
    use motex_scene::BallState;

    fn condition(kind: ProtocolKind, duration_ms: u32, speed: f32) -> Condition {
        let template = ConditionTemplate {
            label: kind.code().into(),
            focus: "focus".into(),
            stimulus: "stim".into(),
            instruction: "go".into(),
        };
        template.instantiate(
            kind,
            TrialParams {
                path: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
                speed,
                duration_ms,
                training: false,
                variant: "V1".into(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn controlled_stop_scores_response_against_reference() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::ControlledStop, 1000, 0.01);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();

        let stage = rig.stage(&cancel);
        let (res, _) = tokio::join!(
            run_protocol(&stage, &cond, &mut record),
            press_space_after(&rig.signals, 1500),
        );
        res.unwrap();

        assert_eq!(record.event(EventName::RefMoveToTarget), Some(1900.0));
        assert_eq!(record.event(EventName::ActualMoveDuration), Some(1500.0));
        assert!((record.accuracy().unwrap() - 78.947).abs() < 0.01);
        assert_eq!(record.event(EventName::MoveStart), Some(1900.0));
        assert!(record.event(EventName::OccluderMoving).is_none());
        assert!(rig.scene.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reproduction_scores_stimulus_reproduction() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::Reproduction, 2000, 0.0);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();

        let stage = rig.stage(&cancel);
        let (res, _) = tokio::join!(
            run_protocol(&stage, &cond, &mut record),
            press_space_after(&rig.signals, 2200),
        );
        res.unwrap();

        assert_eq!(record.event(EventName::RefStim), Some(2000.0));
        assert_eq!(record.event(EventName::ActualStimToResponse), Some(2200.0));
        assert!((record.accuracy().unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(record.event(EventName::StimStart), Some(900.0));
        assert_eq!(record.event(EventName::StimEnd), Some(2900.0));
        assert!(record.value(ValueKey::Speed).is_none());
        assert!(!rig.ui.snapshot().image_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_stop_hides_ball_after_occluder_delay() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::ImmediateStop, 1000, 0.001);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();

        let observe = async {
            // lead-in plus occluder delay plus a margin
            tokio::time::sleep(Duration::from_millis(900 + 600)).await;
            let ball = rig.scene.snapshot().ball.unwrap();
            assert!(!ball.visible);
            assert!(!rig.ui.snapshot().image_visible);
        };
        let stage = rig.stage(&cancel);
        let (res, _, _) = tokio::join!(
            run_protocol(&stage, &cond, &mut record),
            press_space_after(&rig.signals, 1400),
            observe,
        );
        res.unwrap();

        assert_eq!(record.event(EventName::OccluderMoving), Some(1000.0));
        assert_eq!(record.event(EventName::RefMoveToTarget), Some(1500.0));
        assert_eq!(record.event(EventName::ActualMoveDuration), Some(1400.0));
        assert!((record.accuracy().unwrap() - 93.333).abs() < 0.01);
        assert!(rig.scene.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_stop_early_response_keeps_ball_visible() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::ImmediateStop, 1000, 0.001);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();

        let observe = async {
            tokio::time::sleep(Duration::from_millis(900 + 300)).await;
            let ball = rig.scene.snapshot().ball.unwrap();
            assert!(ball.visible);
            assert_eq!(ball.state, BallState::Stopped);
        };
        let stage = rig.stage(&cancel);
        let (res, _, _) = tokio::join!(
            run_protocol(&stage, &cond, &mut record),
            press_space_after(&rig.signals, 200),
            observe,
        );
        res.unwrap();
        assert_eq!(record.event(EventName::ActualMoveDuration), Some(200.0));
        assert!((record.accuracy().unwrap() - 13.333).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn occluded_reverse_waits_for_ball_then_times_response() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::OccludedReverse, 1200, 0.05);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();
        let physics = rig.physics(&cancel);

        let trial = async {
            let res = run_protocol(&rig.stage(&cancel), &cond, &mut record).await;
            cancel.cancel();
            res
        };
        let (res, _, _) = tokio::join!(trial, press_space_after(&rig.signals, 1100), physics);
        res.unwrap();

        assert_eq!(record.event(EventName::RefPath), Some(1200.0));
        assert_eq!(record.event(EventName::ActualStimToResponse), Some(1100.0));
        assert_eq!(record.event(EventName::IsiStart), Some(2100.0));
        assert!((record.accuracy().unwrap() - (100.0 - 100.0 / 12.0)).abs() < 1e-9);
        assert!(rig.scene.snapshot().is_empty());
        assert!(!rig.ui.snapshot().image_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_scene_and_ui_clean() {
        for kind in ProtocolKind::ALL {
            for at_ms in [0, 450, 1000, 1300, 1700, 2500, 3100, 4000] {
                let rig = Rig::new();
                rig.ui.show_focus_image(&"focus".into());
                let cond = condition(kind, 1000, 0.02);
                let mut record = TrialRecord::new();
                let cancel = CancellationToken::new();
                let physics = rig.physics(&cancel);

                let abort = async {
                    tokio::time::sleep(Duration::from_millis(at_ms)).await;
                    cancel.cancel();
                };
                let stage = rig.stage(&cancel);
                let (res, _, _) = tokio::join!(
                    run_protocol(&stage, &cond, &mut record),
                    abort,
                    physics,
                );

                assert!(
                    matches!(res, Err(TrialError::Cancelled)),
                    "{kind:?} at {at_ms}ms: {res:?}"
                );
                assert!(rig.scene.snapshot().is_empty(), "{kind:?} at {at_ms}ms");
                assert!(rig.ui.snapshot().all_hidden(), "{kind:?} at {at_ms}ms");
                assert!(record.accuracy().is_none());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lost_ball_fails_occluded_reverse() {
        let rig = Rig::new();
        let cond = condition(ProtocolKind::OccludedReverse, 1000, 0.001);
        let mut record = TrialRecord::new();
        let cancel = CancellationToken::new();

        let remove = async {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            rig.scene.clear_scene();
        };
        let stage = rig.stage(&cancel);
        let (res, _) = tokio::join!(run_protocol(&stage, &cond, &mut record), remove);
        assert!(matches!(res, Err(TrialError::EntityLost(_))));
        assert!(rig.ui.snapshot().all_hidden());
    }
}
