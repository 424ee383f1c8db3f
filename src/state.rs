// src/state.rs
//! Persisted "seen" state: id -> {first_seen, date, source}.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::item::SourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedItem {
    pub first_seen: NaiveDate,
    pub date: NaiveDate,
    pub source: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: BTreeMap<String, PersistedItem>,
}

impl PersistedState {
    pub const VERSION: u32 = 1;
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            run_date: None,
            items: BTreeMap::new(),
        }
    }
}

/// Where the previous run's state lives.
pub trait StateStore: Send + Sync {
    /// Read the previous state. `Ok(None)` means there is none yet.
    fn try_load(&self) -> Result<Option<PersistedState>>;

    /// Replace the stored state.
    fn save(&self, state: &PersistedState) -> Result<()>;

    /// Previous state, or empty state when missing or unreadable.
    fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::info!(target: "state", "no persisted state; treating as first run");
                PersistedState::default()
            }
            Err(e) => {
                tracing::warn!(
                    target: "state",
                    error = %e,
                    "persisted state unusable; every item will be reported as new"
                );
                PersistedState::default()
            }
        }
    }
}

/// JSON file store. Writes go to a sibling temp file which is then renamed
/// over the target, so a crash never leaves a half-written state.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl ToString) -> Error {
        Error::StateCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl StateStore for FileStateStore {
    fn try_load(&self) -> Result<Option<PersistedState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(e)),
        };
        if content.trim().is_empty() {
            return Err(self.corrupt("file is empty"));
        }
        let state: PersistedState = serde_json::from_str(&content).map_err(|e| self.corrupt(e))?;
        if state.version != PersistedState::VERSION {
            return Err(self.corrupt(format!("unsupported version {}", state.version)));
        }
        tracing::debug!(
            target: "state",
            path = %self.path.display(),
            items = state.items.len(),
            "state loaded"
        );
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes)?;
        tracing::info!(
            target: "state",
            path = %self.path.display(),
            items = state.items.len(),
            "state written"
        );
        Ok(())
    }
}

/// Write `bytes` to `path` via a temp file in the same directory + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Option<PersistedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            inner: Mutex::new(Some(state)),
        }
    }

    pub fn snapshot(&self) -> Option<PersistedState> {
        self.inner.lock().expect("state mutex poisoned").clone()
    }
}

impl StateStore for MemoryStateStore {
    fn try_load(&self) -> Result<Option<PersistedState>> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        *self.inner.lock().expect("state mutex poisoned") = Some(state.clone());
        Ok(())
    }
}
