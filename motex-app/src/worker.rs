use motex_experiment::{
    CsvResultWriter, JsonProgressStore, LessonEngine, LessonError, LessonOutcome, LessonPlan,
};
use motex_scene::{SharedScene, SharedUi, run_physics};
use motex_timing::CancellationToken;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use winit::event_loop::EventLoopProxy;

pub type Engine = LessonEngine<SharedScene, SharedUi, JsonProgressStore>;

/// Sent to the event loop when the lesson thread is done.
#[derive(Debug)]
pub enum AppEvent {
    LessonFinished(Result<LessonOutcome, String>),
}

pub struct LessonJob {
    pub engine: Arc<Engine>,
    pub scene: SharedScene,
    pub plan: LessonPlan,
    pub writer: CsvResultWriter,
    pub tick: Duration,
}

impl LessonJob {
    /// Runs the lesson and the physics driver on a current-thread runtime
    /// in a dedicated thread.
    pub fn spawn(self, proxy: EventLoopProxy<AppEvent>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("motex-lesson".into())
            .spawn(move || {
                let outcome = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt.block_on(self.run()).map_err(|e| e.to_string()),
                    Err(e) => Err(format!("runtime: {e}")),
                };
                if proxy.send_event(AppEvent::LessonFinished(outcome)).is_err() {
                    tracing::debug!("event loop gone before the lesson finished");
                }
            })
    }

    async fn run(self) -> Result<LessonOutcome, LessonError> {
        let LessonJob {
            engine,
            scene,
            plan,
            mut writer,
            tick,
        } = self;
        let physics_stop = CancellationToken::new();

        let lesson = async {
            let outcome = engine.start_lesson(&plan, &mut writer).await;
            physics_stop.cancel();
            outcome
        };
        let (outcome, ()) = tokio::join!(lesson, run_physics(&scene, tick, &physics_stop));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motex_experiment::ExperimentConfig;
    use motex_timing::Signals;

    #[test]
    fn empty_plan_completes_on_its_own_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let scene = SharedScene::new(true);
        let engine = Arc::new(LessonEngine::new(
            scene.clone(),
            SharedUi::new(),
            Arc::new(Signals::new()),
            JsonProgressStore::new(dir.path().join("progress.json")),
            ExperimentConfig::default(),
        ));
        let job = LessonJob {
            engine,
            scene,
            plan: LessonPlan::default(),
            writer: CsvResultWriter::create(dir.path(), "s01").unwrap(),
            tick: Duration::from_millis(20),
        };
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        assert_eq!(rt.block_on(job.run()).unwrap(), LessonOutcome::Completed);
    }
}
