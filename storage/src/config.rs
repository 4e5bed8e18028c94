//! Storage configuration, loaded the way the CLI's `ConfigLoad` is: a
//! versioned, `serde`-derived struct with a `Default` impl supplying every
//! value, optionally overlaid from an on-disk config file via `confy`.

use serde_derive::{Deserialize, Serialize};

use crate::error::CResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    version: u8,

    /// Directory the file-backed persister appends its log into.
    pub data_dir: String,

    /// Whether to take an exclusive OS-level lock on the log file. Disable
    /// only for tests that intentionally open the same file twice.
    pub lock_file: bool,

    /// Logging level for the ambient `log`/`fern` stack, e.g. "info", "debug".
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            version: 1,
            data_dir: "./storage-data".to_string(),
            lock_file: true,
            log_level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    /// Loads configuration from the platform config directory under
    /// `app_name`, creating it with defaults on first run.
    pub fn load(app_name: &str) -> CResult<Self> {
        confy::load(app_name, None).map_err(|err| crate::error::Error::Serde(err.to_string()))
    }
}
