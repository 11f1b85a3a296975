use crate::storage::{CsvResultWriter, ProgressStore, StorageError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn file_digest(path: &Path) -> Result<String, SessionError> {
    let io = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(io)?;
    Ok(hex::encode(hasher.finalize()))
}

/// What was last started: who, with which plan, writing where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject: String,
    pub plan_path: PathBuf,
    pub plan_sha256: String,
    pub trajectory_path: PathBuf,
    #[serde(default)]
    pub results_path: Option<PathBuf>,
}

impl SessionRecord {
    /// Describes a session about to run, hashing the plan file.
    pub fn describe(subject: &str, plan: &Path, trajectories: &Path) -> Result<Self, SessionError> {
        Ok(Self {
            subject: subject.to_owned(),
            plan_path: plan.to_path_buf(),
            plan_sha256: file_digest(plan)?,
            trajectory_path: trajectories.to_path_buf(),
            results_path: None,
        })
    }

    /// True when `previous` used the same unchanged plan file and the same
    /// subject, and left progress behind.
    pub fn can_continue(&self, previous: &SessionRecord, has_progress: bool) -> bool {
        has_progress
            && self.subject == previous.subject
            && self.plan_path == previous.plan_path
            && self.plan_sha256 == previous.plan_sha256
    }
}

/// JSON file the last session is remembered in.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<SessionRecord>, SessionError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| SessionError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    pub fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(record).map_err(|source| SessionError::Parse {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Fresh start: new results file, progress cleared.
pub fn start(
    results_dir: &Path,
    current: &mut SessionRecord,
    progress: &impl ProgressStore,
) -> Result<CsvResultWriter, SessionError> {
    let writer = CsvResultWriter::create(results_dir, &current.subject)?;
    progress.reset()?;
    current.results_path = Some(writer.path().to_path_buf());
    tracing::info!(subject = %current.subject, "session started");
    Ok(writer)
}

/// Continuation: appends to the previous results file when it still exists
/// and belongs to the same subject, otherwise starts a new file. Progress is
/// left untouched.
pub fn resume(
    results_dir: &Path,
    previous: Option<&SessionRecord>,
    current: &mut SessionRecord,
) -> Result<CsvResultWriter, SessionError> {
    let reopened = previous
        .filter(|p| p.subject == current.subject)
        .and_then(|p| p.results_path.as_deref())
        .and_then(CsvResultWriter::open_existing);
    let writer = match reopened {
        Some(writer) => writer,
        None => {
            tracing::info!(subject = %current.subject, "previous results unavailable, new file");
            CsvResultWriter::create(results_dir, &current.subject)?
        }
    };
    current.results_path = Some(writer.path().to_path_buf());
    tracing::info!(subject = %current.subject, "session resumed");
    Ok(writer)
}
