use crate::config::ExperimentConfig;
use crate::plan::LessonPlan;
use crate::protocol::{Stage, TrialError};
use crate::runner::ConditionRunner;
use crate::storage::{ProgressStore, ResultSink, StorageError};
use motex_core::{Cursor, TrialRecord, ValueKey};
use motex_scene::{EntityLost, Scene, Ui};
use motex_timing::{Cancelled, CancellationToken, Signals};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonOutcome {
    Completed,
    Aborted,
}

#[derive(Debug, Error)]
pub enum LessonError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    EntityLost(#[from] EntityLost),
}

/// Walks a lesson plan block by block, persisting the resume cursor before
/// every trial and waiting for the pause key after every block.
///
/// One lesson runs at a time: starting a new one cancels the active run and
/// waits for it to unwind before the first trial.
pub struct LessonEngine<S, U, P> {
    scene: S,
    ui: U,
    signals: Arc<Signals>,
    progress: P,
    config: ExperimentConfig,
    active: Mutex<Option<CancellationToken>>,
    running: tokio::sync::Mutex<()>,
}

impl<S: Scene, U: Ui, P: ProgressStore> LessonEngine<S, U, P> {
    pub fn new(scene: S, ui: U, signals: Arc<Signals>, progress: P, config: ExperimentConfig) -> Self {
        Self {
            scene,
            ui,
            signals,
            progress,
            config,
            active: Mutex::new(None),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn signals(&self) -> &Arc<Signals> {
        &self.signals
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn has_progress(&self) -> bool {
        self.progress.has_progress()
    }

    pub fn reset_progress(&self) -> Result<(), StorageError> {
        self.progress.reset()
    }

    /// Runs `plan` from the persisted cursor, or from the start when there
    /// is none. Cancellation is an ordinary outcome, not an error.
    pub async fn start_lesson(
        &self,
        plan: &LessonPlan,
        sink: &mut dyn ResultSink,
    ) -> Result<LessonOutcome, LessonError> {
        let cancel = self.arm();
        let _running = self.running.lock().await;

        let result = self.run_loop(plan, sink, &cancel).await;
        self.disarm(&cancel);
        match result {
            Ok(()) => {
                tracing::info!("lesson completed");
                Ok(LessonOutcome::Completed)
            }
            Err(TrialError::Cancelled) => {
                tracing::info!("lesson aborted");
                Ok(LessonOutcome::Aborted)
            }
            Err(TrialError::EntityLost(e)) => Err(e.into()),
            Err(TrialError::Storage(e)) => Err(e.into()),
        }
    }

    /// Cancels the active lesson. Returns false when there is nothing to
    /// cancel.
    pub fn abort_lesson(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(token) if !token.is_cancelled() => {
                tracing::info!("lesson abort requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    fn arm(&self) -> CancellationToken {
        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            if !previous.is_cancelled() {
                tracing::info!("preempting the running lesson");
                previous.cancel();
            }
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        token
    }

    /// Forgets `token` once its run is over. A newer run always cancels the
    /// token it replaces, so a live token is still the one in the slot.
    fn disarm(&self, token: &CancellationToken) {
        let mut active = self.lock_active();
        if !token.is_cancelled() {
            active.take();
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resume_point(&self, plan: &LessonPlan) -> Cursor {
        match self.progress.load() {
            Some(cursor) if cursor.is_within(&plan.block_lens()) => {
                tracing::info!(block = cursor.block, condition = cursor.condition, "resuming lesson");
                cursor
            }
            Some(cursor) => {
                tracing::warn!(
                    block = cursor.block,
                    condition = cursor.condition,
                    "saved progress does not fit the plan, starting over"
                );
                Cursor::new(0, 0)
            }
            None => Cursor::new(0, 0),
        }
    }

    async fn run_loop(
        &self,
        plan: &LessonPlan,
        sink: &mut dyn ResultSink,
        cancel: &CancellationToken,
    ) -> Result<(), TrialError> {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        let resume = self.resume_point(plan);
        let runner = ConditionRunner {
            stage: Stage {
                scene: &self.scene,
                ui: &self.ui,
                signals: &self.signals,
                timings: &self.config.timings,
                cancel,
            },
            accuracy_label: &self.config.accuracy_label,
        };

        for (b, block) in plan.blocks.iter().enumerate().skip(resume.block) {
            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }
            let first = if b == resume.block { resume.condition } else { 0 };
            tracing::info!(block = b + 1, number = %block.number, "block start");

            for (c, condition) in block.conditions.iter().enumerate().skip(first) {
                self.progress.save(Some(Cursor::new(b, c)))?;
                if cancel.is_cancelled() {
                    return Err(Cancelled.into());
                }

                let mut record = TrialRecord::new();
                record.set_value(ValueKey::Condition, c + 1);
                record.set_value(ValueKey::Block, b + 1);
                runner.run(condition, &mut record, sink).await?;
            }

            self.signals.wait_for_pause(cancel).await?;
        }

        self.progress.reset()?;
        Ok(())
    }
}
