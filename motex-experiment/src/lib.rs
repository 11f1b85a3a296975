pub mod config;
pub mod lesson;
pub mod plan;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod storage;
pub mod trajectory;

#[cfg(test)]
mod testkit;

pub use config::{ConfigError, ExperimentConfig, PhysicsConfig, PlanPolicy, ProtocolTimings, Templates};
pub use lesson::{LessonEngine, LessonError, LessonOutcome};
pub use plan::{Block, Catalog, LessonPlan, PlanError, PlanRow, parse_plan};
pub use protocol::{Stage, TrialError, run_protocol};
pub use runner::{ConditionRunner, accuracy_text};
pub use session::{SessionError, SessionFile, SessionRecord, file_digest};
pub use storage::{
    CsvResultWriter, JsonProgressStore, MemoryProgressStore, MemorySink, ProgressStore,
    ResultSink, StorageError, format_row, parse_row,
};
pub use trajectory::{TrajectoryEntry, TrajectoryError, TrajectoryLibrary};
