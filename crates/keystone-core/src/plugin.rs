//! The plugin ABI.
//!
//! Every backend plugin implements [`Plugin`]. All methods are
//! synchronous, blocking, and receive the partition's keyset together
//! with the partition's parent key. Which method the engine calls is
//! decided by the slot a plugin occupies in its [`Backend`](crate::Backend)
//! chain, so one plugin instance can serve several roles (a file resolver
//! typically occupies the resolve, commit and error slots).

use crate::error::Result;
use crate::key::Key;
use crate::keyset::KeySet;
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of a get-side plugin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateVerdict {
    /// The backing store changed; a full update pass is needed.
    Changed,
    /// Nothing changed since the last Get.
    Unchanged,
}

/// Outcome of a set-side plugin call before the commit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerdict {
    /// The partition must be persisted.
    NeedsSync,
    /// Nothing needs persisting; the remaining pre-commit chain of this
    /// partition is skipped (resolver slot only).
    NothingToDo,
}

/// Synchronous backend plugin.
///
/// Contract per role:
/// - `get` (resolver and filter slots): report whether the backing store
///   changed, load keys into the partition keyset, and write the resolved
///   storage location into the parent key's value. An `Err` aborts the
///   whole call before any caller-visible mutation.
/// - `set` (resolver and pre-commit slots): stage the partition for
///   commit. The resolver must write the staged location into the parent
///   key's value and detect concurrent modification; a resolver `Err` is
///   surfaced as a conflict. No durable write may happen here.
/// - `commit` (commit and post-commit slots): the durable step (e.g. an
///   atomic rename). Failures after the commit boundary degrade to
///   warnings.
/// - `error` (rollback slots): best-effort cleanup of staged state.
///   Failures degrade to warnings.
///
/// Default bodies are no-ops so filter-style plugins only implement the
/// roles they care about.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn get(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<UpdateVerdict> {
        let _ = (keyset, parent);
        Ok(UpdateVerdict::Unchanged)
    }

    fn set(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<SyncVerdict> {
        let _ = (keyset, parent);
        Ok(SyncVerdict::NeedsSync)
    }

    fn commit(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<()> {
        let _ = (keyset, parent);
        Ok(())
    }

    fn error(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<()> {
        let _ = (keyset, parent);
        Ok(())
    }
}

/// Shared handle to a plugin instance.
///
/// Plugins are stateful (resolvers remember timestamps, stagers remember
/// temp files), so slots share instances behind a mutex.
pub type PluginHandle = Arc<Mutex<dyn Plugin>>;

/// Wrap a plugin into a [`PluginHandle`].
pub fn plugin_handle(plugin: impl Plugin + 'static) -> PluginHandle {
    Arc::new(Mutex::new(plugin))
}
