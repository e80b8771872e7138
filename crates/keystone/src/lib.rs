//! Keystone: a hierarchical configuration key database.
//!
//! Configuration lives in a single key namespace, while the actual data
//! is scattered across mountpoints, each served by its own backend chain
//! of plugins. The engine provides:
//! - **Split engine**: partitions a namespace-wide Get/Set across the
//!   mountpoints it touches and tracks per-partition sync state
//! - **Transaction driver**: staged two-phase-commit Set and
//!   change-detecting Get over those partitions
//! - **Handle**: open/close lifecycle, bootstrapped from the mount
//!   configuration stored under the reserved `system/keystone` namespace
//!
//! # Quick Start
//!
//! ```no_run
//! use keystone::{Handle, Key, KeySet};
//! # use keystone::{BackendFactory, Backend, KeySet as Ks, Key as K, Result};
//! # struct MyFactory;
//! # impl BackendFactory for MyFactory {
//! #     fn create_default(&self) -> Result<Backend> { unimplemented!() }
//! #     fn create(&self, _: &K, _: &Ks) -> Result<Backend> { unimplemented!() }
//! # }
//!
//! # fn main() -> keystone::Result<()> {
//! let mut handle = Handle::open(&MyFactory)?;
//!
//! let mut ks = KeySet::new();
//! let mut parent = Key::new("user/app");
//! handle.get(&mut ks, &mut parent)?;
//!
//! ks.append(Key::with_value("user/app/greeting", "hello"));
//! handle.set(&mut ks, &mut parent)?;
//!
//! handle.close()?;
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod mount;

mod get;
mod set;
mod split;

// Re-export core types
pub use keystone_core::{
    add_warning, covers, has_warning, namespace_of, plugin_handle, relative_to, shared,
    split_namespace, warning_count, warnings, Backend, BackendBuilder, Key, KeySet,
    KeystoneError, Namespace, Phase, Plugin, PluginHandle, Result, SharedBackend, SyncVerdict,
    UpdateVerdict, Value, Warning, WarningKind,
};

// Re-export main types from this crate
pub use get::GetStatus;
pub use handle::{Handle, MOUNTPOINTS_PATH, RESERVED_ROOT};
pub use mount::{mount_definitions, BackendFactory, MountDefinition, MountRegistry};
pub use set::SetStatus;
