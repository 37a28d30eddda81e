//! Coordinator and worker settings.
//!
//! Settings come from a JSON file, then environment variables override
//! individual fields:
//!
//! | variable                | field                     |
//! |-------------------------|---------------------------|
//! | `MRSCHED_MAX_IN_FLIGHT` | `scheduler.max_in_flight` |
//! | `MRSCHED_STORAGE_ROOT`  | `storage.root`            |

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const MAX_IN_FLIGHT_VAR: &str = "MRSCHED_MAX_IN_FLIGHT";
pub const STORAGE_ROOT_VAR: &str = "MRSCHED_STORAGE_ROOT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on dispatches in flight at once. `None` leaves it to the
    /// number of pending tasks; `Some(0)` is treated as 1.
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding intermediate and output files.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Open {
            location: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Applies the `MRSCHED_*` variables of the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up by variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(MAX_IN_FLIGHT_VAR) {
            let limit = raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("{MAX_IN_FLIGHT_VAR}={raw:?}: {e}"))
            })?;
            self.scheduler.max_in_flight = Some(limit);
        }
        if let Some(root) = lookup(STORAGE_ROOT_VAR) {
            self.storage.root = PathBuf::from(root);
        }
        Ok(self)
    }
}
