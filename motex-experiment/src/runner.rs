use crate::protocol::{Stage, TrialError, run_protocol};
use crate::storage::ResultSink;
use motex_core::{Condition, TrialRecord};
use motex_scene::{Scene, Ui};
use motex_timing::Cancelled;

/// Text shown after a training trial, e.g. `Accuracy: 78.9%`.
pub fn accuracy_text(label: &str, accuracy: f64) -> String {
    format!("{label}: {accuracy:.1}%")
}

/// Frames one protocol run: optional training instruction, focus image,
/// the protocol itself, end screen, result row and the closing keypress.
pub struct ConditionRunner<'a, S, U> {
    pub stage: Stage<'a, S, U>,
    pub accuracy_label: &'a str,
}

impl<S: Scene, U: Ui> ConditionRunner<'_, S, U> {
    /// Runs `condition` and appends its row to `sink` once the protocol
    /// succeeds. An aborted trial writes nothing and leaves scene and
    /// overlays cleared.
    pub async fn run(
        &self,
        condition: &Condition,
        record: &mut TrialRecord,
        sink: &mut dyn ResultSink,
    ) -> Result<(), TrialError> {
        let outcome = self.frame(condition, record, sink).await;
        if outcome.is_err() {
            self.stage.clean_up();
        }
        outcome
    }

    async fn frame(
        &self,
        condition: &Condition,
        record: &mut TrialRecord,
        sink: &mut dyn ResultSink,
    ) -> Result<(), TrialError> {
        if self.stage.cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        let ui = self.stage.ui;
        let presentation = &condition.presentation;

        if condition.training {
            ui.show_instruction(&presentation.instruction, true);
            self.stage.space().await?;
            ui.show_instruction(&presentation.instruction, false);
        }

        ui.show_focus_image(&presentation.focus);
        run_protocol(&self.stage, condition, record).await?;

        ui.show_end_screen(true);
        if condition.training {
            let accuracy = record.accuracy().unwrap_or_default();
            ui.show_accuracy_text(&accuracy_text(self.accuracy_label, accuracy));
        }
        sink.append_row(record)?;
        tracing::debug!(accuracy = ?record.accuracy(), "trial row written");

        self.stage.space().await?;
        ui.show_end_screen(false);
        ui.hide_accuracy_text();
        Ok(())
    }
}
