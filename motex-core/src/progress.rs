use serde::{Deserialize, Serialize};

/// Position of the trial about to run: 0-based block and condition index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub block: usize,
    pub condition: usize,
}

impl Cursor {
    pub const fn new(block: usize, condition: usize) -> Self {
        Self { block, condition }
    }

    /// True when both indices address an existing condition; `block_lens[i]`
    /// is the number of conditions in block `i`.
    pub fn is_within(&self, block_lens: &[usize]) -> bool {
        block_lens
            .get(self.block)
            .is_some_and(|len| self.condition < *len)
    }
}

/// Persisted form of the cursor: two integers with `-1` meaning "no progress".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(rename = "b")]
    pub block: i64,
    #[serde(rename = "c")]
    pub condition: i64,
}

impl ProgressRecord {
    pub const UNSET: ProgressRecord = ProgressRecord {
        block: -1,
        condition: -1,
    };

    pub fn from_cursor(cursor: Option<Cursor>) -> Self {
        match cursor {
            Some(c) => Self {
                block: c.block as i64,
                condition: c.condition as i64,
            },
            None => Self::UNSET,
        }
    }

    /// Decodes the record. Anything other than two non-negative indices
    /// (including a half-set pair) reads as no progress.
    pub fn cursor(&self) -> Option<Cursor> {
        if self.block < 0 || self.condition < 0 {
            if self.block >= 0 || self.condition >= 0 {
                tracing::warn!(
                    block = self.block,
                    condition = self.condition,
                    "half-set progress record discarded"
                );
            }
            return None;
        }
        Some(Cursor::new(self.block as usize, self.condition as usize))
    }
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self::UNSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_means_no_progress() {
        assert_eq!(ProgressRecord::UNSET.cursor(), None);
        assert_eq!(ProgressRecord::from_cursor(None), ProgressRecord::UNSET);
    }

    #[test]
    fn half_set_record_is_discarded() {
        let r = ProgressRecord {
            block: 2,
            condition: -1,
        };
        assert_eq!(r.cursor(), None);
    }

    #[test]
    fn cursor_round_trips_through_json() {
        let r = ProgressRecord::from_cursor(Some(Cursor::new(1, 2)));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"b":1,"c":2}"#);
        let back: ProgressRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cursor(), Some(Cursor::new(1, 2)));
    }

    #[test]
    fn bounds_check_against_plan_shape() {
        let lens = [3, 4];
        assert!(Cursor::new(1, 3).is_within(&lens));
        assert!(!Cursor::new(1, 4).is_within(&lens));
        assert!(!Cursor::new(2, 0).is_within(&lens));
    }
}
