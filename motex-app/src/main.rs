mod app;
mod setup;
mod worker;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use app::App;

/// Occluded-motion timing experiment.
#[derive(Debug, Parser)]
#[command(name = "motex", version)]
pub struct Args {
    /// Subject identifier; results go to `<results_dir>/<subject>/`.
    #[arg(short, long)]
    pub subject: String,

    /// Trial plan (`;`-separated CSV with a header row).
    #[arg(short, long)]
    pub plan: PathBuf,

    /// Trajectory library (JSON).
    #[arg(short, long)]
    pub trajectories: PathBuf,

    /// Experiment configuration (JSON). Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Renderer configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    pub render_config: Option<PathBuf>,

    /// Where the last session is remembered.
    #[arg(long, default_value = "motex-session.json")]
    pub session_file: PathBuf,

    /// Where the resume cursor is persisted.
    #[arg(long, default_value = "motex-progress.json")]
    pub progress_file: PathBuf,

    /// Ignore saved progress and start from the first trial.
    #[arg(long)]
    pub restart: bool,

    /// Run in a window instead of borderless fullscreen.
    #[arg(long)]
    pub windowed: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,motex=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let app = App::new(args)?;
    app.run()
}
