//! Permissive view over one decoded line of the agent's NDJSON log.
//!
//! Every lookup returns `Option<&Value>`: a missing key, a `null`, or a
//! container of the wrong shape all read as "absent" and never fail.

use serde_json::{Map, Value};

/// Why a line did not produce a record.
#[derive(Debug)]
pub enum LineError {
    /// Whitespace only.
    Blank,
    /// Not valid UTF-8.
    Encoding(std::str::Utf8Error),
    /// Not a single JSON value.
    Json(serde_json::Error),
    /// Valid JSON, but an array or scalar rather than an object.
    NotAnObject,
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::Blank => write!(f, "blank line"),
            LineError::Encoding(e) => write!(f, "invalid UTF-8: {e}"),
            LineError::Json(e) => write!(f, "invalid JSON: {e}"),
            LineError::NotAnObject => write!(f, "top-level value is not an object"),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineError::Encoding(e) => Some(e),
            LineError::Json(e) => Some(e),
            LineError::Blank | LineError::NotAnObject => None,
        }
    }
}

/// An optional JSON object with forgiving key lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fields<'a>(Option<&'a Map<String, Value>>);

impl<'a> Fields<'a> {
    /// Wrap `value` if it is an object; anything else is treated as absent.
    pub fn of(value: Option<&'a Value>) -> Self {
        Fields(value.and_then(Value::as_object))
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.0.and_then(|m| m.get(key)).filter(|v| !v.is_null())
    }
}

/// One observation event: the agent's state at a tick plus what it did about it.
#[derive(Debug)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Decode one raw input line.
    pub fn parse_bytes(line: &[u8]) -> Result<Self, LineError> {
        let text = std::str::from_utf8(line).map_err(LineError::Encoding)?;
        Self::parse(text)
    }

    /// Decode one input line. Surrounding whitespace (including a trailing
    /// `\r`) is ignored.
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(LineError::Blank);
        }
        match serde_json::from_str(line).map_err(LineError::Json)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(LineError::NotAnObject),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn ts_ms(&self) -> Option<&Value> {
        self.get("ts_ms")
    }

    pub fn pid(&self) -> Option<&Value> {
        self.get("pid")
    }

    pub fn strategy(&self) -> Option<&Value> {
        self.get("strategy_type")
    }

    pub fn dry_run(&self) -> Option<&Value> {
        self.get("dry_run")
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        let metrics = Fields::of(self.get("snapshot"));
        let io = Fields::of(metrics.get("io"));
        Snapshot { metrics, io }
    }

    /// Renderable entries of the `actions` sequence, in order.
    ///
    /// Yields nothing when `actions` is missing or not an array. Entries that
    /// are neither strings nor objects are dropped.
    pub fn actions(&self) -> impl Iterator<Item = Action<'_>> {
        self.get("actions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Action::from_value)
    }
}

/// Embedded system metrics of a record, with its nested IO descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot<'a> {
    metrics: Fields<'a>,
    io: Fields<'a>,
}

impl<'a> Snapshot<'a> {
    /// A named metric such as `threads` or `psi_cpu_some`.
    pub fn metric(&self, key: &str) -> Option<&'a Value> {
        self.metrics.get(key)
    }

    pub fn io_dev(&self) -> Option<&'a Value> {
        self.io.get("dev")
    }

    pub fn io_seq_ratio(&self) -> Option<&'a Value> {
        self.io.get("seq_ratio")
    }
}

/// One step the agent took: a bare label or a structured descriptor.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Label(&'a str),
    Structured(Fields<'a>),
}

impl<'a> Action<'a> {
    pub fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(label) => Some(Action::Label(label)),
            Value::Object(_) => Some(Action::Structured(Fields::of(Some(value)))),
            _ => None,
        }
    }
}
