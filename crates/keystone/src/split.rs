//! The split engine.
//!
//! A split is the per-call working set of a Get/Set: one partition per
//! mountpoint the call touches, plus the default backend for names no
//! explicit mountpoint covers, plus a trailing bypass partition that
//! round-trips keys the call must not touch. A split is built fresh at
//! call entry and discarded at call exit; no state crosses calls through
//! it.

use crate::handle::RESERVED_ROOT;
use crate::mount::MountRegistry;
use keystone_core::{
    add_warning, covers, Key, KeySet, KeystoneError, Namespace, Phase, Result, SharedBackend,
    WarningKind,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One split entry: the keys, parent and backend for one mountpoint
/// within a single call.
pub(crate) struct Partition {
    pub backend: SharedBackend,
    pub keyset: KeySet,
    /// Mountpoint name plus, after resolution, the resolved storage
    /// location as value.
    pub parent: Key,
    pub needs_sync: bool,
    pub bypass: bool,
}

impl Partition {
    fn new(backend: SharedBackend, parent: Key, bypass: bool) -> Self {
        Self {
            backend,
            keyset: KeySet::new(),
            parent,
            needs_sync: false,
            bypass,
        }
    }
}

pub(crate) struct Split {
    pub partitions: Vec<Partition>,
}

impl Split {
    /// Build the split for a parent key: every mountpoint intersecting
    /// the requested namespace, the default backend, and the bypass
    /// partition last.
    pub fn buildup(router: &MountRegistry, parent: &Key) -> Result<Split> {
        let mut partitions = Vec::new();
        for (name, backend) in router.iter() {
            if covers(parent.name(), name) || covers(name, parent.name()) {
                let mountpoint = backend.lock().mountpoint().clone();
                partitions.push(Partition::new(backend.clone(), mountpoint, false));
            }
        }

        let default = router.default_backend();
        let default_mountpoint = default.lock().mountpoint().clone();
        partitions.push(Partition::new(default.clone(), default_mountpoint, false));

        let mut seen = BTreeSet::new();
        for part in &partitions {
            if !seen.insert(part.parent.name().to_string()) {
                return Err(KeystoneError::SplitBuildup(format!(
                    "mountpoint \"{}\" claimed by two differently-configured backends",
                    part.parent.name()
                )));
            }
        }

        partitions.push(Partition::new(
            default.clone(),
            Key::new(RESERVED_ROOT),
            true,
        ));

        Ok(Split { partitions })
    }

    /// The non-bypass partition responsible for `name`, if its backend
    /// is part of this split.
    fn find_partition(&self, router: &MountRegistry, name: &str) -> Option<usize> {
        let backend = router.resolve(name);
        self.partitions.iter().position(|p| {
            !p.bypass && Arc::ptr_eq(&p.backend, backend) && covers(p.parent.name(), name)
        })
    }

    /// Distribute the caller's keys into partitions for a Set.
    ///
    /// A partition needs sync as soon as one of its keys carries the
    /// dirty flag. Keys whose backend is not part of this split are left
    /// alone (the caller promised to only change keys below the parent).
    /// Returns whether any partition needs sync.
    pub fn divide(&mut self, router: &MountRegistry, ks: &KeySet) -> Result<bool> {
        let mut any = false;
        for key in ks.iter() {
            if key.namespace() == Namespace::Invalid {
                return Err(KeystoneError::SyncState(format!(
                    "key \"{}\" has an invalid namespace",
                    key.name()
                )));
            }
            let idx = match self.find_partition(router, key.name()) {
                Some(idx) => idx,
                None => continue,
            };
            let part = &mut self.partitions[idx];
            if key.needs_sync() {
                part.needs_sync = true;
                any = true;
            }
            part.keyset.append(key.clone());
        }
        Ok(any)
    }

    /// Cross-check partition sizes against each backend's remembered key
    /// count. Catches pure deletions, which leave no dirty key behind.
    ///
    /// A partition holding keys for a backend that was never read is a
    /// sync-state error: without a preceding Get, conflicts could not be
    /// detected.
    pub fn sync_sizes(&mut self) -> Result<bool> {
        let mut any = false;
        for part in &mut self.partitions {
            if part.bypass {
                continue;
            }
            let ns = part.parent.namespace();
            let remembered = part.backend.lock().remembered_size(ns);
            match remembered {
                Some(n) if n != part.keyset.len() => {
                    part.needs_sync = true;
                    any = true;
                }
                Some(_) => {}
                None => {
                    if !part.keyset.is_empty() {
                        return Err(KeystoneError::SyncState(format!(
                            "mountpoint \"{}\" was never read, run get before set",
                            part.parent.name()
                        )));
                    }
                }
            }
        }
        Ok(any)
    }

    /// Distribute the caller's existing keys for a Get.
    ///
    /// Keys of partitions about to be re-read are dropped (the fresh
    /// read is authoritative, which is how deletions surface); keys of
    /// unchanged partitions are kept so they merge back untouched; keys
    /// whose backend is not in this split round-trip via the bypass
    /// partition.
    pub fn appoint(&mut self, router: &MountRegistry, ks: &KeySet) {
        let bypass_idx = self.partitions.len() - 1;
        for key in ks.iter() {
            let idx = self
                .find_partition(router, key.name())
                .unwrap_or(bypass_idx);
            let part = &mut self.partitions[idx];
            if part.needs_sync && !part.bypass {
                continue;
            }
            part.keyset.append(key.clone());
        }
    }

    /// Post-update bookkeeping for Get: drop keys a storage plugin
    /// returned outside its mountpoint (warning, not error — sizes are
    /// already committed to the partitions), clear dirty flags, and
    /// remember the per-namespace sizes for later change detection.
    pub fn postprocess(&mut self, parent: &mut Key) {
        for part in &mut self.partitions {
            if part.bypass || !part.needs_sync {
                continue;
            }
            let stray: Vec<String> = part
                .keyset
                .iter()
                .filter(|k| !k.is_below(part.parent.name()))
                .map(|k| k.name().to_string())
                .collect();
            for name in stray {
                add_warning(
                    parent,
                    WarningKind::Appoint,
                    format!(
                        "key \"{}\" is not below mountpoint \"{}\", dropped",
                        name,
                        part.parent.name()
                    ),
                );
                part.keyset.remove(&name);
            }
            for key in part.keyset.iter_mut() {
                key.mark_clean();
            }
            let ns = part.parent.namespace();
            part.backend
                .lock()
                .set_remembered_size(ns, part.keyset.len());
        }
    }

    /// Concatenate all partitions back into the caller's keyset,
    /// clearing it first.
    pub fn merge(&mut self, ks: &mut KeySet) {
        ks.clear();
        for part in &mut self.partitions {
            ks.append_all(std::mem::take(&mut part.keyset));
        }
    }

    /// Keep only the partitions that actually need committing; the
    /// bypass partition never takes part in Set phases.
    pub fn retain_synced(&mut self) {
        self.partitions.retain(|p| p.needs_sync && !p.bypass);
    }

    /// Remember each partition's key count after a successful commit.
    pub fn update_sizes(&self) {
        for part in &self.partitions {
            let ns = part.parent.namespace();
            part.backend
                .lock()
                .set_remembered_size(ns, part.keyset.len());
        }
    }

    /// Copy each partition parent's resolved location back onto its
    /// backend's mountpoint key, and onto the caller's parent key, so
    /// repeated calls reuse the resolved location without re-resolving.
    pub fn propagate_resolved(&self, parent: &mut Key) {
        let mut best: Option<(usize, usize)> = None;
        for (idx, part) in self.partitions.iter().enumerate() {
            if part.bypass {
                continue;
            }
            part.backend
                .lock()
                .remember_location(part.parent.value().cloned());
            if covers(part.parent.name(), parent.name()) {
                let len = part.parent.name().len();
                if best.map_or(true, |(_, l)| len > l) {
                    best = Some((idx, len));
                }
            }
        }
        if let Some((idx, _)) = best {
            let value = self.partitions[idx].parent.value().cloned();
            if value.is_some() {
                parent.set_value(value);
            }
        }
    }
}

/// Wrap a plugin error with the phase and mountpoint it happened in.
pub(crate) fn plugin_failure(
    plugin: String,
    phase: Phase,
    mountpoint: &str,
    err: KeystoneError,
) -> KeystoneError {
    KeystoneError::Plugin {
        plugin,
        phase,
        mountpoint: mountpoint.to_string(),
        message: err.to_string(),
    }
}
