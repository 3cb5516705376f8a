//! Streaming projection of the agent log into the ticks and actions tables.
//!
//! Single forward pass: each line is decoded on its own, so a malformed line
//! costs only that line. Only I/O on the input or the outputs can fail a run.

use crate::input;
use crate::record::{Action, LineError, Record};
use crate::table::{ActionRow, TickRow, ACTION_HEADER, TICK_HEADER};
use serde::Serialize;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the ticks table inside the destination directory.
pub const TICKS_FILE: &str = "ticks.csv";
/// File name of the actions table inside the destination directory.
pub const ACTIONS_FILE: &str = "actions.csv";

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    pub input: PathBuf,
    pub out_dir: Option<PathBuf>,
}

impl FlattenOptions {
    /// Where the tables go: the explicit directory, else the input's parent,
    /// else the current directory.
    pub fn resolve_out_dir(&self) -> PathBuf {
        if let Some(dir) = &self.out_dir {
            return dir.clone();
        }
        match self.input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub ticks_path: PathBuf,
    pub actions_path: PathBuf,
    /// Every line seen, blank ones included.
    pub lines_read: u64,
    /// Lines that became a tick row.
    pub records: u64,
    /// Non-blank lines that were not a JSON object.
    pub skipped: u64,
    pub action_rows: u64,
}

/// Fatal failures. Anything not listed here is recovered per line.
#[derive(Debug)]
pub enum FlattenError {
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    WriteOutput {
        path: PathBuf,
        source: csv::Error,
    },
}

impl std::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlattenError::OpenInput { path, source } => {
                write!(f, "failed to open input {}: {source}", path.display())
            }
            FlattenError::ReadInput { path, source } => {
                write!(f, "failed to read input {}: {source}", path.display())
            }
            FlattenError::CreateOutput { path, source } => {
                write!(f, "failed to create output {}: {source}", path.display())
            }
            FlattenError::WriteOutput { path, source } => {
                write!(f, "failed to write output {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for FlattenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlattenError::OpenInput { source, .. }
            | FlattenError::ReadInput { source, .. }
            | FlattenError::CreateOutput { source, .. } => Some(source),
            FlattenError::WriteOutput { source, .. } => Some(source),
        }
    }
}

/// One output table: a header row followed by serialized rows.
struct TableWriter {
    path: PathBuf,
    inner: csv::Writer<File>,
}

impl TableWriter {
    /// Create (or truncate) `path` and write `header` to it.
    fn create(path: PathBuf, header: &[&str]) -> Result<Self, FlattenError> {
        let file = File::create(&path).map_err(|source| FlattenError::CreateOutput {
            path: path.clone(),
            source,
        })?;
        let inner = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        let mut table = Self { path, inner };
        table
            .inner
            .write_record(header)
            .map_err(|e| table.write_error(e))?;
        Ok(table)
    }

    fn write<S: Serialize>(&mut self, row: &S) -> Result<(), FlattenError> {
        self.inner.serialize(row).map_err(|e| self.write_error(e))
    }

    fn finish(mut self) -> Result<(), FlattenError> {
        self.inner.flush().map_err(|e| self.write_error(e.into()))
    }

    fn write_error(&self, source: csv::Error) -> FlattenError {
        FlattenError::WriteOutput {
            path: self.path.clone(),
            source,
        }
    }
}

/// Flatten the log at `opts.input` into `ticks.csv` and `actions.csv`.
///
/// Both tables are overwritten on every run. On error the tables may be
/// partially written.
pub fn flatten(opts: &FlattenOptions) -> Result<Outcome, FlattenError> {
    let out_dir = opts.resolve_out_dir();
    let reader = input::open(&opts.input).map_err(|source| FlattenError::OpenInput {
        path: opts.input.clone(),
        source,
    })?;

    debug!(
        input = %opts.input.display(),
        out_dir = %out_dir.display(),
        compressed = input::is_compressed(&opts.input),
        "flattening agent log"
    );

    let ticks_path = out_dir.join(TICKS_FILE);
    let actions_path = out_dir.join(ACTIONS_FILE);
    let mut ticks = TableWriter::create(ticks_path.clone(), &TICK_HEADER)?;
    let mut actions = TableWriter::create(actions_path.clone(), &ACTION_HEADER)?;

    let mut outcome = Outcome {
        ticks_path,
        actions_path,
        lines_read: 0,
        records: 0,
        skipped: 0,
        action_rows: 0,
    };

    project_lines(reader, &opts.input, &mut ticks, &mut actions, &mut outcome)?;

    ticks.finish()?;
    actions.finish()?;

    debug!(
        lines_read = outcome.lines_read,
        records = outcome.records,
        skipped = outcome.skipped,
        action_rows = outcome.action_rows,
        "agent log flattened"
    );

    Ok(outcome)
}

fn project_lines(
    reader: impl BufRead,
    input_path: &Path,
    ticks: &mut TableWriter,
    actions: &mut TableWriter,
    outcome: &mut Outcome,
) -> Result<(), FlattenError> {
    for chunk in reader.split(b'\n') {
        let chunk = chunk.map_err(|source| FlattenError::ReadInput {
            path: input_path.to_path_buf(),
            source,
        })?;
        for line in split_carriage_returns(&chunk) {
            outcome.lines_read += 1;
            project_line(line, ticks, actions, outcome)?;
        }
    }
    Ok(())
}

/// Split a `\n`-terminated chunk on lone `\r` breaks. A trailing `\r`
/// (CRLF) is part of the terminator, not a separate empty line.
fn split_carriage_returns(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    chunk.split(|&b| b == b'\r')
}

fn project_line(
    line: &[u8],
    ticks: &mut TableWriter,
    actions: &mut TableWriter,
    outcome: &mut Outcome,
) -> Result<(), FlattenError> {
    let record = match Record::parse_bytes(line) {
        Ok(record) => record,
        Err(LineError::Blank) => return Ok(()),
        Err(_) => {
            outcome.skipped += 1;
            return Ok(());
        }
    };

    let entries: Vec<Action<'_>> = record.actions().collect();
    ticks.write(&TickRow::new(&record, entries.len()))?;
    for action in &entries {
        actions.write(&ActionRow::new(&record, action))?;
    }

    outcome.records += 1;
    outcome.action_rows += entries.len() as u64;
    Ok(())
}
