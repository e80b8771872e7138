//! File-based backend for keystone.
//!
//! One JSON file per mountpoint, with the update protocol the engine
//! expects:
//! - [`FileResolver`] detects changes by file signature (mtime plus
//!   size), stages writes into a sibling `.tmp` file and commits with an
//!   atomic rename
//! - [`JsonStorage`] reads and writes the keys themselves
//! - [`FileBackendFactory`] wires both into backends during
//!   [`Handle::open`](keystone::Handle::open), honoring a `path` key in
//!   each mount definition
//!
//! # Quick Start
//!
//! ```no_run
//! use keystone::{Handle, Key, KeySet};
//! use keystone_file::{FileBackendConfig, FileBackendFactory};
//!
//! # fn main() -> keystone::Result<()> {
//! let factory = FileBackendFactory::new(FileBackendConfig::new("/var/lib/keystone"));
//! let mut handle = Handle::open(&factory)?;
//!
//! let mut ks = KeySet::new();
//! let mut parent = Key::new("user/app");
//! handle.get(&mut ks, &mut parent)?;
//! ks.append(Key::with_value("user/app/greeting", "hello"));
//! handle.set(&mut ks, &mut parent)?;
//! # Ok(())
//! # }
//! ```

pub mod config;

mod resolver;
mod storage;

pub use config::FileBackendConfig;
pub use resolver::FileResolver;
pub use storage::JsonStorage;

use keystone::{BackendFactory, RESERVED_ROOT};
use keystone_core::{plugin_handle, Backend, BackendBuilder, Key, KeySet, Result};
use std::path::{Path, PathBuf};

/// Assemble a file backend: resolver in the resolve, commit and error
/// slots, storage in the read and write slots.
pub fn file_backend(mountpoint: Key, path: impl Into<PathBuf>, config: &FileBackendConfig) -> Backend {
    let resolver = plugin_handle(FileResolver::new(path));
    let storage = plugin_handle(JsonStorage::new(config.pretty_json));
    BackendBuilder::new(mountpoint)
        .get_resolver(resolver.clone())
        .get_filter(storage.clone())
        .set_resolver(resolver.clone())
        .pre_commit(storage)
        .commit(resolver.clone())
        .error_handler(resolver)
        .build()
}

/// Creates one file backend per mountpoint.
///
/// The default backend stores everything, including the mount
/// configuration below `system/keystone`, in `default.json` inside the
/// configured base directory. Mount definitions may carry a `path` key
/// naming their storage file; without one the file name is derived from
/// the mountpoint name.
pub struct FileBackendFactory {
    config: FileBackendConfig,
}

impl FileBackendFactory {
    pub fn new(config: FileBackendConfig) -> Self {
        Self { config }
    }

    fn definition_path(&self, mountpoint: &Key, definition: &KeySet) -> PathBuf {
        let configured = definition
            .iter()
            .find(|k| k.name().ends_with("/path"))
            .and_then(|k| k.string());
        match configured {
            Some(path) => {
                let path = Path::new(path);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.config.base_dir.join(path)
                }
            }
            None => {
                let file = format!("{}.json", mountpoint.name().replace('/', "-"));
                self.config.base_dir.join(file)
            }
        }
    }
}

impl BackendFactory for FileBackendFactory {
    fn create_default(&self) -> Result<Backend> {
        let path = self.config.base_dir.join("default.json");
        Ok(file_backend(Key::new("/"), path, &self.config))
    }

    fn create(&self, mountpoint: &Key, definition: &KeySet) -> Result<Backend> {
        if keystone_core::covers(RESERVED_ROOT, mountpoint.name()) {
            return Err(keystone_core::KeystoneError::InvalidArgument(format!(
                "\"{}\" is inside the reserved namespace",
                mountpoint.name()
            )));
        }
        let path = self.definition_path(mountpoint, definition);
        Ok(file_backend(mountpoint.clone(), path, &self.config))
    }
}
