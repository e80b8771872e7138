//! File backend configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`FileBackendFactory`](crate::FileBackendFactory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackendConfig {
    /// Directory that holds the storage files. Mountpoints without an
    /// explicit `path` in their mount definition get a file derived from
    /// their name inside this directory.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Write human-readable JSON. Costs space, helps hand-editing.
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_pretty_json() -> bool {
    true
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            pretty_json: default_pretty_json(),
        }
    }
}

impl FileBackendConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }
}
