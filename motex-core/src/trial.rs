use crate::scoring;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timed events a trial can emit. Closed set shared by the protocols, the
/// scorer and the result writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    MoveStart,
    MoveEnd,
    StimStart,
    StimEnd,
    IsiStart,
    IsiEnd,
    OccluderMoving,
    RefMoveToTarget,
    RefStim,
    RefPath,
    ActualMoveDuration,
    ActualStimToResponse,
}

impl EventName {
    pub const ALL: [EventName; 12] = [
        EventName::MoveStart,
        EventName::MoveEnd,
        EventName::StimStart,
        EventName::StimEnd,
        EventName::IsiStart,
        EventName::IsiEnd,
        EventName::OccluderMoving,
        EventName::RefMoveToTarget,
        EventName::RefStim,
        EventName::RefPath,
        EventName::ActualMoveDuration,
        EventName::ActualStimToResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::MoveStart => "move_start",
            EventName::MoveEnd => "move_end",
            EventName::StimStart => "stim_start",
            EventName::StimEnd => "stim_end",
            EventName::IsiStart => "isi_start",
            EventName::IsiEnd => "isi_end",
            EventName::OccluderMoving => "occluder_moving",
            EventName::RefMoveToTarget => "ref_move_to_target",
            EventName::RefStim => "ref_stim",
            EventName::RefPath => "ref_path",
            EventName::ActualMoveDuration => "actual_move_duration",
            EventName::ActualStimToResponse => "actual_stim_to_response",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named scalar values recorded once per trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKey {
    /// 1-based block number.
    Block,
    /// 1-based condition number inside the block.
    Condition,
    Axes,
    Label,
    Duration,
    Speed,
    Variant,
}

impl ValueKey {
    pub const ALL: [ValueKey; 7] = [
        ValueKey::Block,
        ValueKey::Condition,
        ValueKey::Axes,
        ValueKey::Label,
        ValueKey::Duration,
        ValueKey::Speed,
        ValueKey::Variant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKey::Block => "b",
            ValueKey::Condition => "c",
            ValueKey::Axes => "axes",
            ValueKey::Label => "C",
            ValueKey::Duration => "D",
            ValueKey::Speed => "S",
            ValueKey::Variant => "V",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f32),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One of the 19 result-file columns, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Value(ValueKey),
    Event(EventName),
}

impl Column {
    pub const COUNT: usize = 19;

    pub const ALL: [Column; Column::COUNT] = [
        Column::Value(ValueKey::Block),
        Column::Value(ValueKey::Condition),
        Column::Value(ValueKey::Axes),
        Column::Value(ValueKey::Label),
        Column::Value(ValueKey::Duration),
        Column::Value(ValueKey::Speed),
        Column::Value(ValueKey::Variant),
        Column::Event(EventName::MoveStart),
        Column::Event(EventName::MoveEnd),
        Column::Event(EventName::StimStart),
        Column::Event(EventName::StimEnd),
        Column::Event(EventName::IsiStart),
        Column::Event(EventName::IsiEnd),
        Column::Event(EventName::OccluderMoving),
        Column::Event(EventName::RefMoveToTarget),
        Column::Event(EventName::RefStim),
        Column::Event(EventName::RefPath),
        Column::Event(EventName::ActualMoveDuration),
        Column::Event(EventName::ActualStimToResponse),
    ];

    pub fn index(self) -> usize {
        // ALL is the single source of ordering
        Self::ALL
            .iter()
            .position(|c| *c == self)
            .unwrap_or(Self::COUNT)
    }

    pub fn key(self) -> &'static str {
        match self {
            Column::Value(k) => k.as_str(),
            Column::Event(e) => e.as_str(),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ValueKey::parse(key)
            .map(Column::Value)
            .or_else(|| EventName::parse(key).map(Column::Event))
    }

    /// Human-readable header used in result files.
    pub fn title(self) -> &'static str {
        match self {
            Column::Value(ValueKey::Block) => "Block number",
            Column::Value(ValueKey::Condition) => "Attempt number within block",
            Column::Value(ValueKey::Axes) => "Number of axes",
            Column::Value(ValueKey::Label) => "Condition type",
            Column::Value(ValueKey::Duration) => "Duration (T1-TX)",
            Column::Value(ValueKey::Speed) => "Speed",
            Column::Value(ValueKey::Variant) => "Trajectory variant",
            Column::Event(EventName::MoveStart) => "Movement start time in attempt",
            Column::Event(EventName::MoveEnd) => "Movement end time",
            Column::Event(EventName::StimStart) => "Stimulus onset time in attempt",
            Column::Event(EventName::StimEnd) => "Stimulus offset time",
            Column::Event(EventName::IsiStart) => "Inter-stimulus interval start",
            Column::Event(EventName::IsiEnd) => "Inter-stimulus interval end",
            Column::Event(EventName::OccluderMoving) => "Movement time under occluder",
            Column::Event(EventName::RefMoveToTarget) => {
                "Reference time from movement start to target zone"
            }
            Column::Event(EventName::RefStim) => "Reference stimulus presentation time",
            Column::Event(EventName::RefPath) => "Reference trajectory traversal time",
            Column::Event(EventName::ActualMoveDuration) => {
                "Actual time from movement start to stop"
            }
            Column::Event(EventName::ActualStimToResponse) => {
                "Actual time from stimulus onset to response"
            }
        }
    }
}

impl From<ValueKey> for Column {
    fn from(k: ValueKey) -> Self {
        Column::Value(k)
    }
}

impl From<EventName> for Column {
    fn from(e: EventName) -> Self {
        Column::Event(e)
    }
}

/// Immutable `(name, time)` pair, time in milliseconds from trial-local zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub name: EventName,
    pub time_ms: f64,
}

/// Fixed offsets the derived event bundles are built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventOffsets {
    /// Length of one fixed stage (lead-in, trailing hold, inter-stimulus gap).
    pub stage_ms: f64,
    pub occluder_ms: f64,
}

impl Default for EventOffsets {
    fn default() -> Self {
        Self {
            stage_ms: 900.0,
            occluder_ms: 500.0,
        }
    }
}

/// Accumulator for one trial: named values plus ordered timed events.
///
/// Every key is written at most once. A second write of the same key is a
/// bug in the producing protocol; debug builds panic, release builds keep the
/// first value and log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialRecord {
    values: Vec<(ValueKey, Value)>,
    events: Vec<TimedEvent>,
    accuracy: Option<f64>,
}

impl TrialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, key: ValueKey, value: impl Into<Value>) {
        let duplicate = self.values.iter().any(|(k, _)| *k == key);
        debug_assert!(!duplicate, "value `{}` written twice", key.as_str());
        if duplicate {
            tracing::error!(key = key.as_str(), "duplicate trial value ignored");
            return;
        }
        self.values.push((key, value.into()));
    }

    pub fn push_event(&mut self, name: EventName, time_ms: f64) {
        let duplicate = self.events.iter().any(|e| e.name == name);
        debug_assert!(!duplicate, "event `{name}` written twice");
        if duplicate {
            tracing::error!(event = name.as_str(), "duplicate trial event ignored");
            return;
        }
        self.events.push(TimedEvent { name, time_ms });
    }

    pub fn value(&self, key: ValueKey) -> Option<&Value> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn event(&self, name: EventName) -> Option<f64> {
        self.events
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.time_ms)
    }

    pub fn values(&self) -> &[(ValueKey, Value)] {
        &self.values
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Serialized cell for a result column, `None` when never written.
    pub fn cell(&self, column: Column) -> Option<String> {
        match column {
            Column::Value(k) => self.value(k).map(ToString::to_string),
            Column::Event(e) => self.event(e).map(|t| t.to_string()),
        }
    }

    /// Scores `actual` against `reference`, stores and returns the accuracy.
    /// Missing events read as zero.
    pub fn score(&mut self, reference: EventName, actual: EventName) -> f64 {
        let r = self.event(reference).unwrap_or(0.0);
        let a = self.event(actual).unwrap_or(0.0);
        let acc = scoring::accuracy(r, a);
        self.accuracy = Some(acc);
        acc
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// `isi_start = D + stage`, `isi_end = D + 2 * stage`.
    pub fn add_isi(&mut self, duration_ms: f64, offsets: EventOffsets) {
        self.push_event(EventName::IsiStart, duration_ms + offsets.stage_ms);
        self.push_event(EventName::IsiEnd, duration_ms + 2.0 * offsets.stage_ms);
    }

    /// `move_start = D + stage`, `move_end = D + 2 * stage`.
    pub fn add_move(&mut self, duration_ms: f64, offsets: EventOffsets) {
        self.push_event(EventName::MoveStart, duration_ms + offsets.stage_ms);
        self.push_event(EventName::MoveEnd, duration_ms + 2.0 * offsets.stage_ms);
    }

    /// `stim_start = stage`, `stim_end = D + stage`.
    pub fn add_stim(&mut self, duration_ms: f64, offsets: EventOffsets) {
        self.push_event(EventName::StimStart, offsets.stage_ms);
        self.push_event(EventName::StimEnd, duration_ms + offsets.stage_ms);
    }

    /// `occluder_moving = D`, `ref_move_to_target = D + occluder`.
    pub fn add_occluder(&mut self, duration_ms: f64, offsets: EventOffsets) {
        self.push_event(EventName::OccluderMoving, duration_ms);
        self.push_event(EventName::RefMoveToTarget, duration_ms + offsets.occluder_ms);
    }
}
