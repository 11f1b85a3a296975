use crate::config::{ExperimentConfig, PlanPolicy};
use crate::trajectory::TrajectoryLibrary;
use csv::{ReaderBuilder, StringRecord};
use motex_core::{Condition, ProtocolKind, TrialParams};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DELIMITER: u8 = b';';
const MIN_COLUMNS: usize = 9;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("plan has no header row")]
    Empty,
    #[error("malformed plan: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: expected at least {MIN_COLUMNS} columns, found {found}")]
    ShortRow { line: usize, found: usize },
    #[error("line {line}: unknown condition code `{code}`")]
    UnknownCondition { line: usize, code: String },
    #[error("line {line}: unknown speed code `{code}`")]
    UnknownSpeed { line: usize, code: String },
    #[error("line {line}: unknown duration code `{code}`")]
    UnknownDuration { line: usize, code: String },
    #[error("line {line}: unknown trajectory `{name}`")]
    UnknownTrajectory { line: usize, name: String },
}

/// One data row of the plan file, codes kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRow {
    /// 1-based line number in the file.
    pub line: usize,
    pub block: String,
    pub condition: String,
    pub speed: String,
    pub duration: String,
    pub variant: String,
    pub training: String,
}

/// Reads a `;`-separated plan file, skipping the header and blank rows.
/// Quoted cells may contain the separator.
pub fn parse_plan(text: &str) -> Result<Vec<PlanRow>, PlanError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    if reader.headers()?.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut rows = Vec::new();
    let mut cells = StringRecord::new();
    while reader.read_record(&mut cells)? {
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let line = cells.position().map_or(0, |p| p.line() as usize);
        if cells.len() < MIN_COLUMNS {
            return Err(PlanError::ShortRow {
                line,
                found: cells.len(),
            });
        }
        let cell = |i: usize| cells.get(i).unwrap_or_default().trim().to_owned();
        rows.push(PlanRow {
            line,
            block: cell(0),
            condition: cell(3),
            speed: cell(4),
            duration: cell(5),
            variant: cell(7),
            training: cell(8),
        });
    }
    Ok(rows)
}

/// Resolves plan codes against the configured tables.
pub struct Catalog<'a> {
    config: &'a ExperimentConfig,
    trajectories: &'a TrajectoryLibrary,
}

impl<'a> Catalog<'a> {
    pub fn new(config: &'a ExperimentConfig, trajectories: &'a TrajectoryLibrary) -> Self {
        Self {
            config,
            trajectories,
        }
    }

    fn strict(&self) -> bool {
        self.config.plan_policy == PlanPolicy::Strict
    }

    /// `Ok(None)` when a lenient plan names an unknown condition code.
    pub fn resolve(&self, row: &PlanRow) -> Result<Option<Condition>, PlanError> {
        let Some(kind) = ProtocolKind::from_code(&row.condition) else {
            if self.strict() {
                return Err(PlanError::UnknownCondition {
                    line: row.line,
                    code: row.condition.clone(),
                });
            }
            tracing::warn!(line = row.line, code = %row.condition, "unknown condition code, row skipped");
            return Ok(None);
        };

        let speed = self.speed(row, kind)?;
        let duration_ms = self.duration(row)?;
        let path = self.path(row, kind)?;
        let params = TrialParams {
            path,
            speed,
            duration_ms,
            training: row.training == "1",
            variant: row.variant.clone(),
        };
        Ok(Some(self.config.templates.get(kind).instantiate(kind, params)))
    }

    fn speed(&self, row: &PlanRow, kind: ProtocolKind) -> Result<f32, PlanError> {
        match self.config.speeds.get(&row.speed) {
            Some(speed) => Ok(*speed),
            // reproduction never reads the speed column
            None if !kind.uses_motion() => Ok(0.0),
            None if self.strict() => Err(PlanError::UnknownSpeed {
                line: row.line,
                code: row.speed.clone(),
            }),
            None => {
                tracing::warn!(line = row.line, code = %row.speed, "unknown speed code, using 0");
                Ok(0.0)
            }
        }
    }

    fn duration(&self, row: &PlanRow) -> Result<u32, PlanError> {
        match self.config.durations.get(&row.duration) {
            Some(ms) => Ok(*ms),
            None if self.strict() => Err(PlanError::UnknownDuration {
                line: row.line,
                code: row.duration.clone(),
            }),
            None => {
                tracing::warn!(line = row.line, code = %row.duration, "unknown duration code, using 0");
                Ok(0)
            }
        }
    }

    fn path(&self, row: &PlanRow, kind: ProtocolKind) -> Result<Vec<motex_core::Vec3>, PlanError> {
        if row.variant.is_empty() || !kind.uses_motion() {
            return Ok(Vec::new());
        }
        match self.trajectories.get(&row.variant) {
            Some(points) => Ok(points.to_vec()),
            None if self.strict() => Err(PlanError::UnknownTrajectory {
                line: row.line,
                name: row.variant.clone(),
            }),
            None => {
                tracing::warn!(line = row.line, name = %row.variant, "unknown trajectory, using empty path");
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Block number as written in the plan.
    pub number: String,
    pub conditions: Vec<Condition>,
}

/// Ordered blocks of conditions, grouped by block number in order of first
/// appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonPlan {
    pub blocks: Vec<Block>,
}

impl LessonPlan {
    pub fn push(&mut self, number: &str, condition: Condition) {
        match self.blocks.iter_mut().find(|b| b.number == number) {
            Some(block) => block.conditions.push(condition),
            None => self.blocks.push(Block {
                number: number.to_owned(),
                conditions: vec![condition],
            }),
        }
    }

    pub fn build(rows: &[PlanRow], catalog: &Catalog<'_>) -> Result<Self, PlanError> {
        let mut plan = Self::default();
        for row in rows {
            if let Some(condition) = catalog.resolve(row)? {
                plan.push(&row.block, condition);
            }
        }
        Ok(plan)
    }

    pub fn from_csv(text: &str, catalog: &Catalog<'_>) -> Result<Self, PlanError> {
        Self::build(&parse_plan(text)?, catalog)
    }

    pub fn load(path: &Path, catalog: &Catalog<'_>) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = Self::from_csv(&text, catalog)?;
        tracing::info!(
            path = %path.display(),
            blocks = plan.blocks.len(),
            trials = plan.trial_count(),
            "lesson plan loaded"
        );
        Ok(plan)
    }

    pub fn block_lens(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.conditions.len()).collect()
    }

    pub fn trial_count(&self) -> usize {
        self.blocks.iter().map(|b| b.conditions.len()).sum()
    }
}
