use motex_core::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("failed to read trajectories {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trajectory file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("trajectory `{0}` defined twice")]
    Duplicate(String),
}

/// One named polyline as stored by the trajectory generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryEntry {
    pub name: String,
    pub points: Vec<Vec3>,
    #[serde(default)]
    pub total_length: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub has_occluder: bool,
}

#[derive(Debug, Deserialize)]
struct TrajectoryFile {
    trajectories: Vec<TrajectoryEntry>,
}

/// Trajectory name to path points, looked up by a plan row's variant column.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryLibrary {
    paths: HashMap<String, Vec<Vec3>>,
}

impl TrajectoryLibrary {
    pub fn from_json(text: &str) -> Result<Self, TrajectoryError> {
        let file: TrajectoryFile = serde_json::from_str(text)?;
        let mut paths = HashMap::with_capacity(file.trajectories.len());
        for entry in file.trajectories {
            if paths.contains_key(&entry.name) {
                return Err(TrajectoryError::Duplicate(entry.name));
            }
            paths.insert(entry.name, entry.points);
        }
        Ok(Self { paths })
    }

    pub fn load(path: &Path) -> Result<Self, TrajectoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), count = library.len(), "trajectories loaded");
        Ok(library)
    }

    pub fn insert(&mut self, name: impl Into<String>, points: Vec<Vec3>) {
        self.paths.insert(name.into(), points);
    }

    pub fn get(&self, name: &str) -> Option<&[Vec3]> {
        self.paths.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "trajectories": [
            {
                "name": "V1",
                "points": [{"x": 0, "y": 0, "z": 0}, {"x": 1.5, "y": 0, "z": 0}],
                "totalLength": 1.5,
                "speed": 0.02,
                "duration": 1.5,
                "hasOccluder": true
            },
            { "name": "V2", "points": [{"x": 0, "y": 1, "z": 0}] }
        ]
    }"#;

    #[test]
    fn parses_named_paths() {
        let lib = TrajectoryLibrary::from_json(SAMPLE).unwrap();
        assert_eq!(lib.len(), 2);
        assert_eq!(
            lib.get("V1").unwrap(),
            &[Vec3::ZERO, Vec3::new(1.5, 0.0, 0.0)]
        );
        assert_eq!(lib.get("V2").unwrap().len(), 1);
        assert!(lib.get("V3").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let text = r#"{"trajectories": [
            {"name": "A", "points": []},
            {"name": "A", "points": []}
        ]}"#;
        assert!(matches!(
            TrajectoryLibrary::from_json(text),
            Err(TrajectoryError::Duplicate(name)) if name == "A"
        ));
    }
}
