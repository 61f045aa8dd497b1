//! Minimal state snapshot for restarts.
//!
//! The core never assumes it owns the backing store between calls: it loads
//! a snapshot, works on its own book, and hands a fresh snapshot back.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConfigFingerprint, Position};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state schema version {found} (expected {expected})")]
    Schema { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    pub positions: Vec<Position>,
    /// Bar time of the last ENTER, for the cooldown.
    #[serde(default)]
    pub last_entry_time: Option<DateTime<Utc>>,
    /// Last closed bar the cycle evaluated.
    #[serde(default)]
    pub last_closed_bar: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fingerprint: Option<ConfigFingerprint>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            positions: Vec::new(),
            last_entry_time: None,
            last_closed_bar: None,
            fingerprint: None,
        }
    }
}

pub trait PositionStore {
    fn load(&self) -> Result<StateSnapshot, StoreError>;
    fn save(&mut self, snapshot: &StateSnapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Option<StateSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryStore {
    fn load(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.snapshot.clone().unwrap_or_default())
    }

    fn save(&mut self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        self.snapshot = Some(snapshot.clone());
        Ok(())
    }
}

/// Pretty-printed JSON file. A missing file loads as an empty snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionStore for JsonFileStore {
    fn load(&self) -> Result<StateSnapshot, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StateSnapshot::default());
            }
            Err(err) => return Err(err.into()),
        };
        let snapshot: StateSnapshot = serde_json::from_str(&content)?;
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(StoreError::Schema {
                found: snapshot.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Write to a sibling temp file, then rename over the target.
    fn save(&mut self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
