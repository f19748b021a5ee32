use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::config::DashboardConfig;

const BUILTIN_DEFAULTS: &str = include_str!("../defaults/config.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Owner of the persisted dashboard document.
///
/// Readers get clones of the last successfully loaded document; a failed
/// reload leaves it untouched.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<DashboardConfig>,
}

impl ConfigStore {
    /// Open `<data_dir>/config.json`, seeding it from `defaults_file` (or the
    /// built-in template) on first run. A corrupt document is reported and
    /// replaced in memory by the built-in defaults; the file is left alone.
    pub fn open(data_dir: &Path, defaults_file: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join("config.json");
        if !path.exists() {
            fs::create_dir_all(data_dir).map_err(|source| ConfigError::Io { path: data_dir.to_path_buf(), source })?;
            if defaults_file.is_file() {
                fs::copy(defaults_file, &path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                info!(from = %defaults_file.display(), "initialized config from defaults");
            } else {
                fs::write(&path, BUILTIN_DEFAULTS).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                info!("initialized config from built-in defaults");
            }
        }

        let initial = match load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("{}; serving built-in defaults until the next successful write", e);
                builtin_defaults()
            }
        };
        Ok(Self { path, current: RwLock::new(initial) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> DashboardConfig {
        self.current.read().clone()
    }

    /// Re-read the document from disk.
    pub fn reload(&self) -> Result<DashboardConfig, ConfigError> {
        let cfg = load(&self.path)?;
        *self.current.write() = cfg.clone();
        Ok(cfg)
    }

    /// Validate and persist a whole new document.
    pub fn update(&self, raw: Value) -> Result<DashboardConfig, ConfigError> {
        let cfg = validate_document(raw)?;
        let body = serde_json::to_string_pretty(&cfg)
            .map_err(|source| ConfigError::Parse { path: self.path.clone(), source })?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
        }
        fs::write(&tmp, body).map_err(|source| ConfigError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path).map_err(|source| ConfigError::Io { path: self.path.clone(), source })?;

        *self.current.write() = cfg.clone();
        info!(path = %self.path.display(), "config updated and saved");
        Ok(cfg)
    }
}

/// A write must be an object carrying both `background` and `modules`.
pub fn validate_document(raw: Value) -> Result<DashboardConfig, ConfigError> {
    let Some(obj) = raw.as_object() else {
        return Err(ConfigError::Invalid("configuration must be a JSON object".into()));
    };
    for key in ["background", "modules"] {
        if obj.get(key).map_or(true, Value::is_null) {
            return Err(ConfigError::Invalid(format!("missing `{}`", key)));
        }
    }
    serde_json::from_value(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
}

fn load(path: &Path) -> Result<DashboardConfig, ConfigError> {
    let txt = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&txt).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

pub fn builtin_defaults() -> DashboardConfig {
    match serde_json::from_str(BUILTIN_DEFAULTS) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("built-in defaults unreadable: {}", e);
            DashboardConfig { background: Default::default(), modules: Vec::new() }
        }
    }
}
