//! Small key-value persistence for the few facts that outlive a session:
//! the last active device per registry and the event server port.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ControlError, Result};

/// Scoped string store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> Option<String>;

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()>;
}

/// Volatile store, for tests and for running without a config directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, scope: &str, key: &str) -> Option<String> {
        self.values
            .lock()
            .get(&(scope.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .insert((scope.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

type Scopes = BTreeMap<String, BTreeMap<String, String>>;

/// Store backed by a pretty-printed JSON file of `{scope: {key: value}}`.
///
/// The file is read once on open and rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    scopes: Mutex<Scopes>,
}

impl JsonFileStore {
    /// `<config dir>/avcp/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("avcp").join("state.json"))
    }

    /// Open the store at the default location.
    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| ControlError::Store("no configuration directory".to_string()))?;
        Self::open(path)
    }

    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. An unreadable JSON document is
    /// logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let scopes = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| ControlError::Store(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Invalid state file, starting empty");
                Scopes::new()
            })
        } else {
            debug!(path = %path.display(), "No state file yet");
            Scopes::new()
        };

        Ok(Self {
            path,
            scopes: Mutex::new(scopes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, scopes: &Scopes) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ControlError::Store(format!("{}: {e}", parent.display())))?;
        }
        let content =
            serde_json::to_string_pretty(scopes).map_err(|e| ControlError::Store(e.to_string()))?;
        fs::write(&self.path, content)
            .map_err(|e| ControlError::Store(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, scope: &str, key: &str) -> Option<String> {
        self.scopes.lock().get(scope)?.get(key).cloned()
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        let mut scopes = self.scopes.lock();
        let previous = scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        if previous.as_deref() == Some(value) {
            return Ok(());
        }
        self.save(&scopes)
    }
}
