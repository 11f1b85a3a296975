use crate::Args;
use anyhow::{Context, Result};
use motex_experiment::{
    Catalog, CsvResultWriter, ExperimentConfig, LessonPlan, ProgressStore, SessionFile,
    SessionRecord, TrajectoryLibrary, session,
};
use motex_render::RenderConfig;
use std::path::Path;

pub fn load_experiment_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => Ok(ExperimentConfig::load(path)?),
        None => Ok(ExperimentConfig::default()),
    }
}

pub fn load_render_config(path: Option<&Path>) -> Result<RenderConfig> {
    let Some(path) = path else {
        return Ok(RenderConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading render config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing render config {}", path.display()))
}

/// Plan and results file for this run.
pub struct Prepared {
    pub plan: LessonPlan,
    pub writer: CsvResultWriter,
    pub record: SessionRecord,
    pub continued: bool,
}

/// Loads the plan and decides between continuing the previous session and
/// starting over, then remembers the decision in the session file.
pub fn prepare(
    args: &Args,
    config: &ExperimentConfig,
    progress: &impl ProgressStore,
) -> Result<Prepared> {
    let trajectories = TrajectoryLibrary::load(&args.trajectories)?;
    let catalog = Catalog::new(config, &trajectories);
    let plan = LessonPlan::load(&args.plan, &catalog)?;

    let session_file = SessionFile::new(&args.session_file);
    let previous = session_file.load().unwrap_or_else(|err| {
        tracing::warn!(%err, "session file unusable, treating as a fresh start");
        None
    });

    let mut record = SessionRecord::describe(&args.subject, &args.plan, &args.trajectories)?;
    let continued = !args.restart
        && previous
            .as_ref()
            .is_some_and(|p| record.can_continue(p, progress.has_progress()));

    let writer = if continued {
        session::resume(&config.results_dir, previous.as_ref(), &mut record)?
    } else {
        session::start(&config.results_dir, &mut record, progress)?
    };
    session_file.save(&record)?;
    tracing::info!(
        subject = %record.subject,
        continued,
        results = %writer.path().display(),
        "session prepared"
    );

    Ok(Prepared {
        plan,
        writer,
        record,
        continued,
    })
}
