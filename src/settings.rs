// Settings persistence — one JSON record under `SETTINGS_KEY`.
// Loading is tolerant and falls back to defaults; saving reports every
// failure to the caller.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::SETTINGS_KEY;
use crate::error::{DispenserError, StoreError};
use crate::types::Settings;

/// Opaque key-value store.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store. Can be switched offline to exercise failure paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        // Rename replaces the previous record in one step
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Read the stored record. `Ok(None)` when nothing has been saved yet.
pub fn try_load_settings(store: &impl SettingsStore) -> Result<Option<Settings>, DispenserError> {
    let raw = store
        .get(SETTINGS_KEY)
        .map_err(|e| DispenserError::SettingsLoad(e.to_string()))?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    let settings: Settings =
        serde_json::from_str(&raw).map_err(|e| DispenserError::SettingsLoad(e.to_string()))?;
    settings
        .validate()
        .map_err(|e| DispenserError::SettingsLoad(e.to_string()))?;
    Ok(Some(settings))
}

/// Load settings, keeping defaults on any failure.
pub fn load_settings(store: &impl SettingsStore) -> Settings {
    match try_load_settings(store) {
        Ok(Some(settings)) => {
            debug!(?settings, "settings loaded");
            settings
        }
        Ok(None) => Settings::default(),
        Err(error) => {
            warn!(%error, "using default settings");
            Settings::default()
        }
    }
}

/// Validate and persist the whole record.
pub fn save_settings(
    store: &mut impl SettingsStore,
    settings: &Settings,
) -> Result<(), DispenserError> {
    settings.validate()?;
    let raw =
        serde_json::to_string(settings).map_err(|e| DispenserError::SettingsSave(e.to_string()))?;
    store
        .set(SETTINGS_KEY, &raw)
        .map_err(|e| DispenserError::SettingsSave(e.to_string()))
}
