use motex_core::{ConditionTemplate, EventOffsets, ProtocolKind, SpriteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How unresolvable plan codes are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPolicy {
    /// Unknown speed or duration reads as 0, unknown path as empty, unknown
    /// condition rows are skipped.
    #[default]
    Lenient,
    Strict,
}

/// Fixed stage lengths shared by the protocols, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimings {
    pub lead_in_ms: u64,
    pub occluder_ms: u64,
    pub trailing_ms: u64,
    pub isi_ms: u64,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            lead_in_ms: 900,
            occluder_ms: 500,
            trailing_ms: 900,
            isi_ms: 900,
        }
    }
}

impl ProtocolTimings {
    pub fn offsets(&self) -> EventOffsets {
        EventOffsets {
            stage_ms: self.lead_in_ms as f64,
            occluder_ms: self.occluder_ms as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub tick_ms: u64,
    /// Keep the ball moving along the last segment after it finishes.
    pub drift_after_finish: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            drift_after_finish: true,
        }
    }
}

impl PhysicsConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub immediate_stop: ConditionTemplate,
    pub controlled_stop: ConditionTemplate,
    pub occluded_reverse: ConditionTemplate,
    pub reproduction: ConditionTemplate,
}

impl Templates {
    pub fn get(&self, kind: ProtocolKind) -> &ConditionTemplate {
        match kind {
            ProtocolKind::ImmediateStop => &self.immediate_stop,
            ProtocolKind::ControlledStop => &self.controlled_stop,
            ProtocolKind::OccludedReverse => &self.occluded_reverse,
            ProtocolKind::Reproduction => &self.reproduction,
        }
    }
}

fn template(label: &str, stimulus: &str, instruction: &str) -> ConditionTemplate {
    ConditionTemplate {
        label: label.to_owned(),
        focus: SpriteId::new("focus"),
        stimulus: SpriteId::new(stimulus),
        instruction: instruction.to_owned(),
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            immediate_stop: template(
                "TTC",
                "",
                "Press SPACE when the ball reaches the target. The ball may disappear.",
            ),
            controlled_stop: template(
                "Control",
                "",
                "Press SPACE when the ball reaches the target.",
            ),
            occluded_reverse: template(
                "Reverse",
                "stimulus",
                "Watch the ball, then press SPACE after the same time has passed.",
            ),
            reproduction: template(
                "Reproduction",
                "stimulus",
                "Remember how long the image is shown and reproduce it with SPACE.",
            ),
        }
    }
}

/// Everything a lesson needs besides the plan and trajectory files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Speed codes (`S1`, `S2`) to scene units per physics tick.
    pub speeds: BTreeMap<String, f32>,
    /// Duration codes (`D1`..`D3`) to milliseconds.
    pub durations: BTreeMap<String, u32>,
    pub timings: ProtocolTimings,
    pub physics: PhysicsConfig,
    pub templates: Templates,
    pub plan_policy: PlanPolicy,
    pub accuracy_label: String,
    pub results_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            speeds: BTreeMap::from([("S1".to_owned(), 0.02), ("S2".to_owned(), 0.04)]),
            durations: BTreeMap::from([
                ("D1".to_owned(), 1000),
                ("D2".to_owned(), 1500),
                ("D3".to_owned(), 2000),
            ]),
            timings: ProtocolTimings::default(),
            physics: PhysicsConfig::default(),
            templates: Templates::default(),
            plan_policy: PlanPolicy::default(),
            accuracy_label: "Accuracy".to_owned(),
            results_dir: PathBuf::from("LessonResults"),
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "experiment config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ExperimentConfig = serde_json::from_str(
            r#"{ "speeds": { "S1": 0.5 }, "timings": { "occluder_ms": 300 }, "plan_policy": "strict" }"#,
        )
        .unwrap();
        assert_eq!(cfg.speeds.get("S1"), Some(&0.5));
        assert_eq!(cfg.speeds.get("S2"), None);
        assert_eq!(cfg.durations.get("D2"), Some(&1500));
        assert_eq!(cfg.timings.occluder_ms, 300);
        assert_eq!(cfg.timings.lead_in_ms, 900);
        assert_eq!(cfg.plan_policy, PlanPolicy::Strict);
        assert!(cfg.physics.drift_after_finish);
        assert_eq!(cfg.templates.get(ProtocolKind::ImmediateStop).label, "TTC");
    }

    #[test]
    fn offsets_follow_timings() {
        let t = ProtocolTimings {
            lead_in_ms: 800,
            occluder_ms: 400,
            ..Default::default()
        };
        let o = t.offsets();
        assert_eq!(o.stage_ms, 800.0);
        assert_eq!(o.occluder_ms, 400.0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ExperimentConfig::load(Path::new("/nonexistent/motex.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
