//! Mount table: maps key names to the backend chain responsible for them.
//!
//! Resolution is longest-prefix-match over mountpoint names, with a fixed
//! fallback to the default backend for names no explicit mountpoint
//! covers.

use keystone_core::{
    covers, shared, Backend, Key, KeySet, KeystoneError, Result, SharedBackend,
};
use std::collections::BTreeMap;

/// Longest-prefix-match mount table with a default backend fallback.
pub struct MountRegistry {
    mounts: BTreeMap<String, SharedBackend>,
    default_backend: SharedBackend,
}

impl MountRegistry {
    pub fn new(default_backend: Backend) -> Self {
        Self {
            mounts: BTreeMap::new(),
            default_backend: shared(default_backend),
        }
    }

    /// Mount a backend at the mountpoint named by its mountpoint key.
    ///
    /// Fails if the mountpoint name is already claimed; two
    /// differently-configured backends must not share a name.
    pub fn mount(&mut self, backend: Backend) -> Result<()> {
        let name = backend.mountpoint().name().to_string();
        if name.is_empty() {
            return Err(KeystoneError::InvalidArgument(
                "backend has an empty mountpoint name".to_string(),
            ));
        }
        if name == self.default_backend.lock().mountpoint().name() {
            return Err(KeystoneError::SplitBuildup(format!(
                "mountpoint \"{name}\" overlaps the default backend"
            )));
        }
        if self.mounts.contains_key(&name) {
            return Err(KeystoneError::SplitBuildup(format!(
                "mountpoint \"{name}\" already claimed by another backend"
            )));
        }
        self.mounts.insert(name, shared(backend));
        Ok(())
    }

    /// The backend responsible for `name`: the longest mountpoint
    /// covering it, or the default backend.
    pub fn resolve(&self, name: &str) -> &SharedBackend {
        self.mounts
            .iter()
            .filter(|(mount, _)| covers(mount, name))
            .max_by_key(|(mount, _)| mount.len())
            .map(|(_, backend)| backend)
            .unwrap_or(&self.default_backend)
    }

    pub fn default_backend(&self) -> &SharedBackend {
        &self.default_backend
    }

    /// Iterate over explicit mountpoints in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedBackend)> {
        self.mounts.iter().map(|(name, b)| (name.as_str(), b))
    }

    pub fn mountpoints(&self) -> Vec<String> {
        self.mounts.keys().cloned().collect()
    }

    /// Drop all mounted backends.
    pub fn clear(&mut self) {
        self.mounts.clear();
    }
}

/// Creates backend chains during handle bootstrap.
///
/// Keystone does not load plugin modules dynamically; the factory is the
/// seam where an application decides which plugin chain serves a
/// mountpoint described by the stored mount configuration.
pub trait BackendFactory {
    /// The backend used both for bootstrap and as the fallback for names
    /// no explicit mountpoint covers.
    ///
    /// Called twice per open: once for the bootstrap Get cycle and once
    /// for the final mount table, so the real default backend starts
    /// without stale resolver state.
    fn create_default(&self) -> Result<Backend>;

    /// Build the backend for one mount definition.
    fn create(&self, mountpoint: &Key, definition: &KeySet) -> Result<Backend>;
}

/// One mount definition read from the reserved namespace.
#[derive(Debug)]
pub struct MountDefinition {
    /// Key naming the target mountpoint.
    pub mountpoint: Key,
    /// The definition's configuration keys, full names preserved.
    pub config: KeySet,
}

/// Parse mount definitions from the keys below `root`.
///
/// Each direct child of `root` describes one mountpoint: the child key's
/// value names where to mount, the keys below it are handed to the
/// factory as configuration.
pub fn mount_definitions(ks: &KeySet, root: &str) -> Vec<MountDefinition> {
    let mut defs = Vec::new();
    for key in ks.below(root) {
        let rel = match keystone_core::relative_to(root, key.name()) {
            Some(rel) => rel,
            None => continue,
        };
        if rel.is_empty() || rel.contains('/') {
            continue;
        }
        let target = match key.string() {
            Some(target) if !target.is_empty() => target,
            _ => {
                tracing::warn!(
                    definition = key.name(),
                    "mount definition has no target mountpoint, skipped"
                );
                continue;
            }
        };
        let config: KeySet = ks
            .below(key.name())
            .filter(|k| k.name() != key.name())
            .cloned()
            .collect();
        defs.push(MountDefinition {
            mountpoint: Key::new(target),
            config,
        });
    }
    defs
}
