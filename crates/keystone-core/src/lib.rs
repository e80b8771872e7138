//! Keystone Core: Data model and plugin ABI for the keystone configuration store
//!
//! This crate defines the building blocks shared by the engine and by
//! backend plugin crates:
//! - **Key / KeySet**: ordered, name-addressed configuration entries with
//!   dirty tracking
//! - **Namespaces**: `user`, `system`, cascading (`/...`) and meta key names
//! - **Plugin ABI**: the synchronous role contract every backend plugin
//!   implements (resolve, filter, commit, rollback)
//! - **Backend**: one mountpoint's role-tagged plugin chain plus its
//!   per-namespace size bookkeeping
//! - **Errors and warnings**: the crate-wide error taxonomy and the
//!   warning accumulation carried on a parent key

pub mod backend;
pub mod error;
pub mod key;
pub mod keyset;
pub mod name;
pub mod plugin;
pub mod warning;

pub use backend::{shared, Backend, BackendBuilder, SharedBackend};
pub use error::{KeystoneError, Phase, Result};
pub use key::{Key, Value};
pub use keyset::KeySet;
pub use name::{covers, namespace_of, relative_to, split_namespace, Namespace};
pub use plugin::{plugin_handle, Plugin, PluginHandle, SyncVerdict, UpdateVerdict};
pub use warning::{add_warning, has_warning, warning_count, warnings, Warning, WarningKind};
