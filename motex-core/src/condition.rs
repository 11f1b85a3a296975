use crate::geometry::Vec3;
use crate::stimulus::SpriteId;
use serde::{Deserialize, Serialize};

/// The four stimulus protocols, as named in trial plans (`C1`..`C4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    ImmediateStop,
    ControlledStop,
    OccludedReverse,
    Reproduction,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::ImmediateStop,
        ProtocolKind::ControlledStop,
        ProtocolKind::OccludedReverse,
        ProtocolKind::Reproduction,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ProtocolKind::ImmediateStop => "C1",
            ProtocolKind::ControlledStop => "C2",
            ProtocolKind::OccludedReverse => "C3",
            ProtocolKind::Reproduction => "C4",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code.trim())
    }

    pub fn uses_motion(self) -> bool {
        !matches!(self, ProtocolKind::Reproduction)
    }
}

/// Polyline plus per-tick step size for the moving ball.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    pub path: Vec<Vec3>,
    pub speed: f32,
}

impl Motion {
    pub fn end(&self) -> Option<Vec3> {
        self.path.last().copied()
    }
}

/// Protocol variant with the parameters only that variant needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Protocol {
    ImmediateStop(Motion),
    ControlledStop(Motion),
    OccludedReverse { motion: Motion, stimulus: SpriteId },
    Reproduction { stimulus: SpriteId },
}

impl Protocol {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::ImmediateStop(_) => ProtocolKind::ImmediateStop,
            Protocol::ControlledStop(_) => ProtocolKind::ControlledStop,
            Protocol::OccludedReverse { .. } => ProtocolKind::OccludedReverse,
            Protocol::Reproduction { .. } => ProtocolKind::Reproduction,
        }
    }

    pub fn motion(&self) -> Option<&Motion> {
        match self {
            Protocol::ImmediateStop(m) | Protocol::ControlledStop(m) => Some(m),
            Protocol::OccludedReverse { motion, .. } => Some(motion),
            Protocol::Reproduction { .. } => None,
        }
    }
}

/// What the UI shows around a trial.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Presentation {
    /// Written to the `C` column.
    pub label: String,
    pub focus: SpriteId,
    /// Shown before a training trial.
    pub instruction: String,
}

/// Immutable per-trial configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub protocol: Protocol,
    pub duration_ms: u32,
    pub training: bool,
    /// Trajectory name the path was looked up by, empty when none.
    pub variant: String,
    pub presentation: Presentation,
}

impl Condition {
    pub fn kind(&self) -> ProtocolKind {
        self.protocol.kind()
    }
}

/// Per-row parameters substituted into a template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialParams {
    pub path: Vec<Vec3>,
    pub speed: f32,
    pub duration_ms: u32,
    pub training: bool,
    pub variant: String,
}

/// Prototype a condition is cloned from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionTemplate {
    pub label: String,
    pub focus: SpriteId,
    /// Only used by the occluded-reverse and reproduction protocols.
    pub stimulus: SpriteId,
    pub instruction: String,
}

impl ConditionTemplate {
    pub fn instantiate(&self, kind: ProtocolKind, params: TrialParams) -> Condition {
        let motion = Motion {
            path: params.path,
            speed: params.speed,
        };
        let protocol = match kind {
            ProtocolKind::ImmediateStop => Protocol::ImmediateStop(motion),
            ProtocolKind::ControlledStop => Protocol::ControlledStop(motion),
            ProtocolKind::OccludedReverse => Protocol::OccludedReverse {
                motion,
                stimulus: self.stimulus.clone(),
            },
            ProtocolKind::Reproduction => Protocol::Reproduction {
                stimulus: self.stimulus.clone(),
            },
        };
        Condition {
            protocol,
            duration_ms: params.duration_ms,
            training: params.training,
            variant: if kind.uses_motion() {
                params.variant
            } else {
                String::new()
            },
            presentation: Presentation {
                label: self.label.clone(),
                focus: self.focus.clone(),
                instruction: self.instruction.clone(),
            },
        }
    }
}
