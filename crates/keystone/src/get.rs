//! The Get protocol: change-detecting read across mountpoints.
//!
//! A Get is a two-pass walk over the split. The first pass asks every
//! partition's resolver whether its backing store changed since the last
//! read; when nothing changed anywhere, the caller's keys are handed back
//! untouched. Otherwise the changed partitions are re-read through their
//! full chain while unchanged partitions keep the caller's copies.

use crate::handle::Handle;
use crate::split::{plugin_failure, Split};
use keystone_core::{
    add_warning, Key, KeySet, KeystoneError, Namespace, Phase, Result, UpdateVerdict, WarningKind,
};

/// Outcome of a successful [`Handle::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetStatus {
    /// At least one backing store changed; the keyset was re-read.
    Updated,
    /// No backing store changed; the keyset holds the caller's keys.
    Unchanged,
}

impl Handle {
    /// Read all keys at or below `parent` into `ks`.
    ///
    /// `ks` is rebuilt from scratch for every mountpoint whose backing
    /// store changed; keys of unchanged mountpoints and keys outside the
    /// requested scope survive untouched. On success every key in `ks` is
    /// clean and `parent` carries the resolved storage location of the
    /// deepest mountpoint covering it.
    ///
    /// Diagnostics that do not prevent the read (keys a storage plugin
    /// emitted outside its mountpoint, an empty parent name) are recorded
    /// as warnings on `parent`.
    pub fn get(&mut self, ks: &mut KeySet, parent: &mut Key) -> Result<GetStatus> {
        self.ensure_open()?;
        check_parent_namespace(parent)?;

        let mut split = Split::buildup(self.router(), parent)?;
        let changed = match check_update_needed(&mut split) {
            Ok(changed) => changed,
            Err(e) => {
                // locations resolved before the failure stay usable
                split.propagate_resolved(parent);
                return Err(e);
            }
        };

        tracing::debug!(
            parent = parent.name(),
            partitions = split.partitions.len(),
            changed,
            "get"
        );

        split.appoint(self.router(), ks);
        if changed == 0 {
            split.merge(ks);
            split.propagate_resolved(parent);
            return Ok(GetStatus::Unchanged);
        }

        if let Err(e) = do_update(&mut split) {
            split.propagate_resolved(parent);
            return Err(e);
        }

        split.postprocess(parent);
        split.merge(ks);
        split.propagate_resolved(parent);
        Ok(GetStatus::Updated)
    }
}

/// Validate the parent key's namespace. Meta and unparseable names are
/// rejected; the empty name is tolerated with a warning.
pub(crate) fn check_parent_namespace(parent: &mut Key) -> Result<()> {
    match parent.namespace() {
        Namespace::Meta => Err(KeystoneError::NamespaceRejected {
            name: parent.name().to_string(),
            reason: "meta keys cannot serve as a parent key".to_string(),
        }),
        Namespace::Invalid => Err(KeystoneError::NamespaceRejected {
            name: parent.name().to_string(),
            reason: "name is not in a valid namespace".to_string(),
        }),
        Namespace::Empty => {
            add_warning(parent, WarningKind::InvalidName, "parent key has an empty name");
            Ok(())
        }
        Namespace::User | Namespace::System | Namespace::Cascading => Ok(()),
    }
}

/// First pass: ask each partition's resolver whether its backing store
/// changed. Changed partitions are flagged for the update pass; the
/// return value is how many there are. A partition without a resolver is
/// taken as unchanged.
fn check_update_needed(split: &mut Split) -> Result<usize> {
    let mut changed = 0;
    for part in &mut split.partitions {
        if part.bypass {
            continue;
        }
        let resolver = match part.backend.lock().get_resolver().cloned() {
            Some(resolver) => resolver,
            None => continue,
        };
        let mut plugin = resolver.lock();
        let verdict = plugin
            .get(&mut part.keyset, &mut part.parent)
            .map_err(|e| {
                plugin_failure(
                    plugin.name().to_string(),
                    Phase::CheckUpdate,
                    part.parent.name(),
                    e,
                )
            })?;
        if verdict == UpdateVerdict::Changed {
            part.needs_sync = true;
            changed += 1;
        }
    }
    Ok(changed)
}

/// Second pass: run the filter chain of every changed partition so its
/// storage plugin loads the fresh state into the partition keyset.
fn do_update(split: &mut Split) -> Result<()> {
    for part in &mut split.partitions {
        if part.bypass || !part.needs_sync {
            continue;
        }
        let filters = part.backend.lock().get_filters().to_vec();
        for filter in filters {
            let mut plugin = filter.lock();
            plugin
                .get(&mut part.keyset, &mut part.parent)
                .map_err(|e| {
                    plugin_failure(
                        plugin.name().to_string(),
                        Phase::Update,
                        part.parent.name(),
                        e,
                    )
                })?;
        }
    }
    Ok(())
}
