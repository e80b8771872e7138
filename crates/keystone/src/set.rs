//! The Set protocol: two-phase commit across mountpoints.
//!
//! Set stages every partition that actually changed (dirty keys or a
//! size mismatch against the last read), then commits all of them. The
//! commit boundary is the set resolvers' atomic step: before it, any
//! failure rolls every staged partition back and the call fails; after
//! it, failures degrade to warnings because the data is already durable.

use crate::get::check_parent_namespace;
use crate::handle::Handle;
use crate::split::{plugin_failure, Partition, Split};
use keystone_core::{
    add_warning, Key, KeySet, KeystoneError, Phase, Result, SyncVerdict, WarningKind,
};

/// Outcome of a successful [`Handle::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    /// At least one partition changed and was committed.
    Committed,
    /// No key was dirty and no key count changed; nothing was written.
    Unchanged,
}

/// First failure seen during the prepare phase, together with the key the
/// failing plugin left its partition cursor on.
struct PrepareFailure {
    error: KeystoneError,
    error_key: Option<String>,
}

impl Handle {
    /// Persist the keys in `ks` across the mountpoints below `parent`.
    ///
    /// Only mountpoints with changes are touched; untouched mountpoints
    /// are not even resolved. All staged partitions commit together: a
    /// failure before the commit boundary rolls everything back, leaves
    /// the stores as they were, moves the `ks` cursor onto the key that
    /// caused the failure (when the plugin reported one), and returns the
    /// error. Concurrent modification detected by a resolver surfaces as
    /// [`KeystoneError::Conflict`]; the resolution is the caller's:
    /// Get again, merge, retry.
    ///
    /// Every mountpoint written here must have been read by this handle
    /// first, otherwise conflicts could not be detected and the call
    /// fails with [`KeystoneError::SyncState`].
    pub fn set(&mut self, ks: &mut KeySet, parent: &mut Key) -> Result<SetStatus> {
        self.ensure_open()?;
        check_parent_namespace(parent)?;

        let mut split = Split::buildup(self.router(), parent)?;
        let divided = match split.divide(self.router(), ks) {
            Ok(divided) => divided,
            Err(e) => {
                set_rollback(&mut split, parent);
                return Err(e);
            }
        };
        let resized = split.sync_sizes()?;
        if !divided && !resized {
            tracing::debug!(parent = parent.name(), "set: nothing changed");
            return Ok(SetStatus::Unchanged);
        }

        split.retain_synced();
        tracing::debug!(
            parent = parent.name(),
            partitions = split.partitions.len(),
            "set: staging"
        );

        if let Err(failure) = set_prepare(&mut split, parent) {
            set_rollback(&mut split, parent);
            match failure.error_key {
                Some(ref name) if ks.set_cursor(name) => {}
                Some(ref name) => add_warning(
                    parent,
                    WarningKind::ErrorKeyMissing,
                    format!("key \"{name}\" caused the failure but is not in the keyset"),
                ),
                None => {}
            }
            split.propagate_resolved(parent);
            return Err(failure.error);
        }

        set_commit(&mut split, parent);
        split.update_sizes();
        // the whole caller set is clean now, including keys of
        // partitions that had nothing to do
        for key in ks.iter_mut() {
            key.mark_clean();
        }
        split.propagate_resolved(parent);
        Ok(SetStatus::Committed)
    }
}

/// Stage every partition: the set resolver first, then the pre-commit
/// chain. A resolver that reports [`SyncVerdict::NothingToDo`] drops its
/// partition from the remaining phases. Failures do not stop the other
/// partitions (each may still veto the transaction); the first one
/// becomes the error, the rest are recorded as warnings on `parent`.
fn set_prepare(
    split: &mut Split,
    parent: &mut Key,
) -> std::result::Result<(), PrepareFailure> {
    let mut failure: Option<PrepareFailure> = None;
    for part in &mut split.partitions {
        let resolver = part.backend.lock().set_resolver().cloned();
        if let Some(resolver) = resolver {
            let mut plugin = resolver.lock();
            match plugin.set(&mut part.keyset, &mut part.parent) {
                Ok(SyncVerdict::NeedsSync) => {}
                Ok(SyncVerdict::NothingToDo) => {
                    part.needs_sync = false;
                    continue;
                }
                Err(e) => {
                    let conflict = KeystoneError::Conflict {
                        mountpoint: part.parent.name().to_string(),
                        message: format!("{}: {e}", plugin.name()),
                    };
                    drop(plugin);
                    record_failure(&mut failure, part, conflict, parent);
                    continue;
                }
            }
        }

        let chain = part.backend.lock().pre_commit().to_vec();
        for handle in chain {
            let mut plugin = handle.lock();
            if let Err(e) = plugin.set(&mut part.keyset, &mut part.parent) {
                let error = plugin_failure(
                    plugin.name().to_string(),
                    Phase::Prepare,
                    part.parent.name(),
                    e,
                );
                drop(plugin);
                record_failure(&mut failure, part, error, parent);
                break;
            }
        }
    }
    match failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Remember the first failure and the key the failing plugin left the
/// partition cursor on; later failures degrade to warnings so none of
/// the diagnostics are lost.
fn record_failure(
    slot: &mut Option<PrepareFailure>,
    part: &Partition,
    error: KeystoneError,
    parent: &mut Key,
) {
    if slot.is_some() {
        add_warning(parent, WarningKind::PrepareFailed, error.to_string());
        return;
    }
    *slot = Some(PrepareFailure {
        error,
        error_key: part.keyset.current().map(|k| k.name().to_string()),
    });
}

/// Commit all staged partitions: the commit slot of every partition
/// first (the atomic step), then the post-commit chains slot by slot.
/// Failures here come after durable writes and degrade to warnings.
fn set_commit(split: &mut Split, parent: &mut Key) {
    for part in &mut split.partitions {
        if !part.needs_sync {
            continue;
        }
        let commit = part.backend.lock().commit().cloned();
        if let Some(handle) = commit {
            let mut plugin = handle.lock();
            if let Err(e) = plugin.commit(&mut part.keyset, &mut part.parent) {
                let message = format!(
                    "plugin \"{}\" failed to commit mountpoint \"{}\": {e}",
                    plugin.name(),
                    part.parent.name()
                );
                drop(plugin);
                add_warning(parent, WarningKind::CommitFailed, message);
            }
        }
    }

    let slots = split
        .partitions
        .iter()
        .map(|p| p.backend.lock().post_commit().len())
        .max()
        .unwrap_or(0);
    for slot in 0..slots {
        for part in &mut split.partitions {
            if !part.needs_sync {
                continue;
            }
            let handle = part.backend.lock().post_commit().get(slot).cloned();
            if let Some(handle) = handle {
                let mut plugin = handle.lock();
                if let Err(e) = plugin.commit(&mut part.keyset, &mut part.parent) {
                    let message = format!(
                        "post-commit plugin \"{}\" failed on mountpoint \"{}\": {e}",
                        plugin.name(),
                        part.parent.name()
                    );
                    drop(plugin);
                    add_warning(parent, WarningKind::CommitFailed, message);
                }
            }
        }
    }
}

/// Roll back every staged partition through its error chain. Rollback is
/// best effort; failures degrade to warnings.
fn set_rollback(split: &mut Split, parent: &mut Key) {
    for part in &mut split.partitions {
        if part.bypass || !part.needs_sync {
            continue;
        }
        let chain = part.backend.lock().error_handlers().to_vec();
        for handle in chain {
            let mut plugin = handle.lock();
            if let Err(e) = plugin.error(&mut part.keyset, &mut part.parent) {
                let message = format!(
                    "error plugin \"{}\" failed on mountpoint \"{}\": {e}",
                    plugin.name(),
                    part.parent.name()
                );
                drop(plugin);
                add_warning(parent, WarningKind::RollbackFailed, message);
            }
        }
    }
}
