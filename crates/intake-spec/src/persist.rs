//! Draft snapshots: what gets written, where, and when.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::accessor;
use crate::spec::field::FieldKind;
use crate::spec::form::FormSpec;
use crate::state::{FieldValue, FormState};
use crate::visibility::{VisibilityMap, is_field_visible};

pub const DEFAULT_SAVE_DEBOUNCE_MS: i64 = 300;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read snapshot '{key}': {message}")]
    Read { key: String, message: String },
    #[error("failed to write snapshot '{key}': {message}")]
    Write { key: String, message: String },
    #[error("failed to remove snapshot '{key}': {message}")]
    Remove { key: String, message: String },
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key/value storage for raw snapshot JSON.
pub trait SnapshotStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, contents: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, contents: &str) -> Self {
        let store = Self::new();
        store
            .lock()
            .entries
            .insert(key.to_string(), contents.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    /// Number of successful `save` calls so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.entries.insert(key.to_string(), contents.to_string());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().entries.remove(key);
        Ok(())
    }
}

const TIMESTAMP_KEY: &str = "_timestamp";

/// Flat snapshot: field values plus the time they were captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistedSnapshot {
    #[serde(rename = "_timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl PersistedSnapshot {
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Only a document that is not a JSON object is an error. A bad
    /// timestamp is dropped, numbers become text and entries of any other
    /// shape are skipped.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let entries: Map<String, Value> = serde_json::from_str(raw)?;
        let mut snapshot = Self::default();
        for (name, value) in entries {
            if name == TIMESTAMP_KEY {
                snapshot.timestamp = value.as_str().and_then(|raw| raw.parse().ok());
                if snapshot.timestamp.is_none() {
                    tracing::debug!(value = %value, "ignoring unreadable draft timestamp");
                }
                continue;
            }
            match stored_value(value) {
                Some(value) => {
                    snapshot.fields.insert(name, value);
                }
                None => tracing::debug!(field = %name, "skipping draft entry of unknown shape"),
            }
        }
        Ok(snapshot)
    }
}

fn stored_value(value: Value) -> Option<FieldValue> {
    let scalar = |value: Value| match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    };
    match value {
        Value::Bool(checked) => Some(FieldValue::Flag(checked)),
        Value::Array(items) => Some(FieldValue::Set(
            items.into_iter().filter_map(scalar).collect(),
        )),
        Value::Null | Value::Object(_) => None,
        other => scalar(other).map(FieldValue::Text),
    }
}

/// Captures every enabled, visible field. Empty sets, unchecked boxes and
/// unselected radios are left out; text is kept even when empty.
pub fn capture_snapshot(
    spec: &FormSpec,
    state: &FormState,
    visibility: &VisibilityMap,
    now: Timestamp,
) -> PersistedSnapshot {
    let mut fields = BTreeMap::new();
    for name in spec.field_names() {
        let Some(field) = spec.field(name) else {
            continue;
        };
        if field.disabled || !is_field_visible(spec, visibility, name) {
            continue;
        }
        let value = accessor::read(spec, state, name);
        let keep = match (&field.kind, &value) {
            (_, FieldValue::Set(values)) => !values.is_empty(),
            (_, FieldValue::Flag(checked)) => *checked,
            (FieldKind::RadioGroup, FieldValue::Text(text)) => !text.is_empty(),
            (_, FieldValue::Text(_)) => true,
        };
        if keep {
            fields.insert(name.to_string(), value);
        }
    }
    PersistedSnapshot {
        timestamp: Some(now),
        fields,
    }
}

/// Single pending save deadline, re-armed by every mutation.
#[derive(Debug, Clone)]
pub struct SaveScheduler {
    window: SignedDuration,
    deadline: Option<Timestamp>,
}

impl Default for SaveScheduler {
    fn default() -> Self {
        Self::new(SignedDuration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS))
    }
}

impl SaveScheduler {
    pub fn new(window: SignedDuration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Timestamp) {
        self.deadline = Some(now.checked_add(self.window).unwrap_or(now));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// True once per armed deadline, when `now` has reached it.
    pub fn take_due(&mut self, now: Timestamp) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
