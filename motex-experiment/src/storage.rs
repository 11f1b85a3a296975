use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use motex_core::{Column, Cursor, EventName, ProgressRecord, TrialRecord, Value, ValueKey};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const DELIMITER: u8 = b';';

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed result row: {0}")]
    Malformed(String),
    #[error("invalid progress file {path}: {source}")]
    Progress {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> StorageError + '_ {
    move |source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn row_writer<W: Write>(inner: W) -> Writer<W> {
    WriterBuilder::new().delimiter(DELIMITER).from_writer(inner)
}

/// Destination for finished trial rows.
pub trait ResultSink {
    fn append_row(&mut self, record: &TrialRecord) -> Result<(), StorageError>;
}

/// `;`-separated result file with one header row and one line per trial.
///
/// Every row is flushed as soon as it is appended so a crash loses at most
/// the trial in progress.
pub struct CsvResultWriter {
    path: PathBuf,
    writer: Writer<File>,
}

impl fmt::Debug for CsvResultWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvResultWriter")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CsvResultWriter {
    /// Starts `<dir>/<subject>/<YYYY-MM-DD_HH-MM>.csv` with a header row.
    pub fn create(dir: &Path, subject: &str) -> Result<Self, StorageError> {
        let subject_dir = dir.join(subject);
        std::fs::create_dir_all(&subject_dir).map_err(io_err(&subject_dir))?;
        let name = chrono::Local::now().format("%Y-%m-%d_%H-%M").to_string();
        Self::create_at(subject_dir.join(format!("{name}.csv")))
    }

    pub fn create_at(path: PathBuf) -> Result<Self, StorageError> {
        let file = File::create(&path).map_err(io_err(&path))?;
        let mut writer = row_writer(file);
        writer
            .write_record(Column::ALL.map(Column::title))
            .map_err(csv_err(&path))?;
        writer.flush().map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), "results file created");
        Ok(Self { path, writer })
    }

    /// Reopens a previous results file for appending; `None` if it is gone.
    pub fn open_existing(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }
        match OpenOptions::new().append(true).open(path) {
            Ok(file) => {
                tracing::info!(path = %path.display(), "results file reopened");
                Some(Self {
                    path: path.to_path_buf(),
                    writer: row_writer(file),
                })
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "cannot reopen results file");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvResultWriter {
    fn append_row(&mut self, record: &TrialRecord) -> Result<(), StorageError> {
        self.writer
            .write_record(row_cells(record))
            .map_err(csv_err(&self.path))?;
        self.writer.flush().map_err(io_err(&self.path))
    }
}

/// The 19 cells of a record in column order; unwritten keys stay empty.
fn row_cells(record: &TrialRecord) -> Vec<String> {
    Column::ALL
        .iter()
        .map(|c| record.cell(*c).unwrap_or_default())
        .collect()
}

/// Renders one data line without its terminator, quoting cells that
/// contain the separator.
pub fn format_row(record: &TrialRecord) -> Result<String, StorageError> {
    let mut writer = row_writer(Vec::new());
    writer
        .write_record(row_cells(record))
        .map_err(|e| StorageError::Malformed(e.to_string()))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| StorageError::Malformed(e.to_string()))?;
    let line = String::from_utf8(bytes).map_err(|e| StorageError::Malformed(e.to_string()))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Values are typed by key, so a whole-number speed reads back as a float.
fn parse_value(key: ValueKey, cell: &str) -> Result<Value, StorageError> {
    let malformed = || StorageError::Malformed(format!("{}: `{cell}`", key.as_str()));
    match key {
        ValueKey::Label | ValueKey::Variant | ValueKey::Axes => Ok(Value::Text(cell.to_owned())),
        ValueKey::Speed => cell.parse::<f32>().map(Value::Float).map_err(|_| malformed()),
        ValueKey::Block | ValueKey::Condition | ValueKey::Duration => {
            cell.parse::<i64>().map(Value::Int).map_err(|_| malformed())
        }
    }
}

/// Reads one data line back into a record.
pub fn parse_row(line: &str) -> Result<TrialRecord, StorageError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut cells = StringRecord::new();
    let found = reader
        .read_record(&mut cells)
        .map_err(|e| StorageError::Malformed(e.to_string()))?;
    if !found || cells.len() != Column::COUNT {
        return Err(StorageError::Malformed(format!(
            "expected {} cells, found {}",
            Column::COUNT,
            cells.len()
        )));
    }

    let mut record = TrialRecord::new();
    for (column, cell) in Column::ALL.into_iter().zip(cells.iter()) {
        if cell.is_empty() {
            continue;
        }
        match column {
            Column::Value(key) => record.set_value(key, parse_value(key, cell)?),
            Column::Event(name) => {
                let time = cell
                    .parse::<f64>()
                    .map_err(|_| StorageError::Malformed(format!("{name}: `{cell}`")))?;
                record.push_event(name, time);
            }
        }
    }
    Ok(record)
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<TrialRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[TrialRecord] {
        &self.rows
    }

    pub fn accuracy_of(&self, row: usize) -> Option<f64> {
        self.rows.get(row).and_then(TrialRecord::accuracy)
    }

    pub fn event_of(&self, row: usize, name: EventName) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.event(name))
    }
}

impl ResultSink for MemorySink {
    fn append_row(&mut self, record: &TrialRecord) -> Result<(), StorageError> {
        self.rows.push(record.clone());
        Ok(())
    }
}

/// Persistence of the resume cursor.
pub trait ProgressStore {
    fn load(&self) -> Option<Cursor>;
    fn save(&self, cursor: Option<Cursor>) -> Result<(), StorageError>;

    fn reset(&self) -> Result<(), StorageError> {
        self.save(None)
    }

    fn has_progress(&self) -> bool {
        self.load().is_some()
    }
}

/// Cursor kept as `{"b":..,"c":..}` in a small JSON file.
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Option<ProgressRecord>, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Progress {
                path: self.path.clone(),
                source,
            })
    }
}

impl ProgressStore for JsonProgressStore {
    fn load(&self) -> Option<Cursor> {
        match self.read() {
            Ok(record) => record.and_then(|r| r.cursor()),
            Err(err) => {
                tracing::warn!(%err, "progress unreadable, starting over");
                None
            }
        }
    }

    fn save(&self, cursor: Option<Cursor>) -> Result<(), StorageError> {
        let record = ProgressRecord::from_cursor(cursor);
        let json = serde_json::to_string(&record).map_err(|source| StorageError::Progress {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        std::fs::write(&self.path, json).map_err(io_err(&self.path))
    }
}

/// In-memory store that also remembers every save.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    state: Mutex<(ProgressRecord, Vec<Option<Cursor>>)>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            state: Mutex::new((ProgressRecord::from_cursor(Some(cursor)), Vec::new())),
        }
    }

    /// Every cursor passed to `save`, oldest first.
    pub fn history(&self) -> Vec<Option<Cursor>> {
        self.lock().1.clone()
    }

    fn lock(&self) -> MutexGuard<'_, (ProgressRecord, Vec<Option<Cursor>>)> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self) -> Option<Cursor> {
        self.lock().0.cursor()
    }

    fn save(&self, cursor: Option<Cursor>) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.0 = ProgressRecord::from_cursor(cursor);
        state.1.push(cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motex_core::EventOffsets;
    use std::io::BufRead;

    fn sample() -> TrialRecord {
        let mut r = TrialRecord::new();
        r.set_value(ValueKey::Condition, 2usize);
        r.set_value(ValueKey::Block, 1usize);
        r.set_value(ValueKey::Label, "TTC");
        r.set_value(ValueKey::Speed, 0.25f32);
        r.set_value(ValueKey::Duration, 1000u32);
        r.set_value(ValueKey::Variant, "V;1");
        r.add_occluder(1000.0, EventOffsets::default());
        r.add_move(1000.0, EventOffsets::default());
        r.push_event(EventName::ActualMoveDuration, 1432.5);
        r
    }

    /// Every value key and every event written once.
    fn full() -> TrialRecord {
        let mut r = TrialRecord::new();
        r.set_value(ValueKey::Block, 3usize);
        r.set_value(ValueKey::Condition, 7usize);
        r.set_value(ValueKey::Axes, "xy");
        r.set_value(ValueKey::Label, "Reverse");
        r.set_value(ValueKey::Duration, 1500u32);
        r.set_value(ValueKey::Speed, 1.0f32);
        r.set_value(ValueKey::Variant, "V;2 \"wide\"");
        for (i, name) in EventName::ALL.into_iter().enumerate() {
            r.push_event(name, 100.0 * i as f64 + 0.5);
        }
        r
    }

    fn cells_of(line: &str) -> Vec<String> {
        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_reader(line.as_bytes());
        let mut record = StringRecord::new();
        assert!(reader.read_record(&mut record).unwrap());
        record.iter().map(str::to_owned).collect()
    }

    fn write_and_read(records: &[TrialRecord]) -> Vec<String> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let mut writer = CsvResultWriter::create_at(path.clone()).unwrap();
        for record in records {
            writer.append_row(record).unwrap();
        }
        drop(writer);
        let file = std::io::BufReader::new(File::open(&path).unwrap());
        file.lines().map(Result::unwrap).collect()
    }

    #[test]
    fn row_has_nineteen_cells_in_column_order() {
        let line = format_row(&sample()).unwrap();
        assert!(line.contains("\"V;1\""));
        let cells = cells_of(&line);
        assert_eq!(cells.len(), Column::COUNT);
        assert_eq!(cells[0], "1");
        assert_eq!(cells[1], "2");
        assert_eq!(cells[2], "");
        assert_eq!(cells[3], "TTC");
        assert_eq!(cells[6], "V;1");
        assert_eq!(cells[7], "1900");
        assert_eq!(cells[13], "1000");
        assert_eq!(cells[14], "1500");
        assert_eq!(cells[17], "1432.5");
        assert_eq!(cells[18], "");
    }

    #[test]
    fn every_column_reads_back_with_its_type() {
        let record = full();
        let lines = write_and_read(std::slice::from_ref(&record));
        assert_eq!(lines.len(), 2);
        assert_eq!(cells_of(&lines[0]).len(), Column::COUNT);
        assert!(lines[0].starts_with("Block number;"));
        assert!(cells_of(&lines[1]).iter().all(|c| !c.is_empty()));

        let back = parse_row(&lines[1]).unwrap();
        for key in ValueKey::ALL {
            assert_eq!(back.value(key), record.value(key), "{key:?}");
        }
        for name in EventName::ALL {
            assert_eq!(back.event(name), record.event(name), "{name:?}");
        }
        assert_eq!(back.value(ValueKey::Speed), Some(&Value::Float(1.0)));
        assert_eq!(back.value(ValueKey::Duration), Some(&Value::Int(1500)));
        assert_eq!(back.value(ValueKey::Variant), Some(&Value::Text("V;2 \"wide\"".into())));
    }

    #[test]
    fn whole_number_speed_stays_a_float() {
        let mut record = TrialRecord::new();
        record.set_value(ValueKey::Speed, 0.0f32);
        let back = parse_row(&format_row(&record).unwrap()).unwrap();
        assert_eq!(back.value(ValueKey::Speed), Some(&Value::Float(0.0)));
    }

    #[test]
    fn csv_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvResultWriter::create(dir.path(), "subject-7").unwrap();
        let path = writer.path().to_path_buf();
        assert!(path.starts_with(dir.path().join("subject-7")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));

        let record = sample();
        writer.append_row(&record).unwrap();
        drop(writer);

        let mut reopened = CsvResultWriter::open_existing(&path).unwrap();
        let mut empty = TrialRecord::new();
        empty.set_value(ValueKey::Block, 2usize);
        reopened.append_row(&empty).unwrap();
        drop(reopened);

        let file = std::io::BufReader::new(File::open(&path).unwrap());
        let lines: Vec<String> = file.lines().map(Result::unwrap).collect();
        assert_eq!(lines.len(), 3);

        let back = parse_row(&lines[1]).unwrap();
        for key in ValueKey::ALL {
            assert_eq!(back.value(key), record.value(key), "{key:?}");
        }
        for name in EventName::ALL {
            assert_eq!(back.event(name), record.event(name), "{name:?}");
        }
        let second = parse_row(&lines[2]).unwrap();
        assert_eq!(second.value(ValueKey::Block), Some(&Value::Int(2)));
        assert!(second.events().is_empty());
    }

    #[test]
    fn open_existing_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CsvResultWriter::open_existing(&dir.path().join("gone.csv")).is_none());
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(matches!(parse_row("1;2;3"), Err(StorageError::Malformed(_))));
        let bad_event = format!("{}x", ";".repeat(Column::COUNT - 1));
        assert!(parse_row(&bad_event).is_err());
        let bad_block = format!("1.5{}", ";".repeat(Column::COUNT - 1));
        assert!(matches!(parse_row(&bad_block), Err(StorageError::Malformed(_))));
    }

    #[test]
    fn json_progress_store_persists_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path().join("state").join("progress.json"));
        assert_eq!(store.load(), None);

        store.save(Some(Cursor::new(1, 2))).unwrap();
        assert_eq!(store.load(), Some(Cursor::new(1, 2)));
        assert!(store.has_progress());

        store.reset().unwrap();
        assert!(!store.has_progress());
        let text = std::fs::read_to_string(dir.path().join("state/progress.json")).unwrap();
        assert_eq!(text, r#"{"b":-1,"c":-1}"#);
    }

    #[test]
    fn corrupt_progress_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(JsonProgressStore::new(&path).load(), None);
    }

    #[test]
    fn memory_store_records_history() {
        let store = MemoryProgressStore::with_cursor(Cursor::new(0, 1));
        assert_eq!(store.load(), Some(Cursor::new(0, 1)));
        store.save(Some(Cursor::new(0, 2))).unwrap();
        store.reset().unwrap();
        assert_eq!(store.history(), vec![Some(Cursor::new(0, 2)), None]);
    }
}
