use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an image shown on the UI layer (focus cross, stimulus, ...).
///
/// The renderer resolves it to a file in its sprite directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpriteId(pub String);

impl SpriteId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpriteId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
