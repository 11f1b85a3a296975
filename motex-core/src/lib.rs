pub mod condition;
pub mod geometry;
pub mod progress;
pub mod scoring;
pub mod stimulus;
pub mod trial;

pub use condition::{
    Condition, ConditionTemplate, Motion, Presentation, Protocol, ProtocolKind, TrialParams,
};
pub use geometry::Vec3;
pub use progress::{Cursor, ProgressRecord};
pub use scoring::accuracy;
pub use stimulus::SpriteId;
pub use trial::{Column, EventName, EventOffsets, TimedEvent, TrialRecord, Value, ValueKey};
