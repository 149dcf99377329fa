use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ledger::SessionMode;

/// Audit events for one session, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_dir: String,
        mode: SessionMode,
        turns: usize,
    },
    TurnCreated {
        turn_id: u64,
        model: String,
        original_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
        edited_url: String,
        reference_count: usize,
    },
    EditFailed {
        prompt: String,
        kind: String,
        error: String,
    },
    SessionReset {
        mode: SessionMode,
    },
}

#[derive(Serialize)]
struct EventRecord<'a> {
    #[serde(flatten)]
    event: &'a SessionEvent,
    session_id: &'a str,
    ts: String,
}

/// Appends one compact JSON object per line to a session's `events.jsonl`.
/// Clones share the same file lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventSink>,
}

#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventSink {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Writes the event and returns the row as written.
    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let record = EventRecord {
            event,
            session_id: &self.inner.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        };
        let row = serde_json::to_value(&record)?;
        let mut line = serde_json::to_string(&row)?;
        line.push('\n');

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?
            .write_all(line.as_bytes())?;
        Ok(row)
    }
}
