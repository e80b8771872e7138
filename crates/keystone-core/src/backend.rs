//! One mountpoint's plugin chain.
//!
//! A backend identifies a single mountpoint and holds its role-tagged
//! plugin slots. It is stateless regarding configuration data — all
//! per-call state lives in the split — but remembers two things across
//! calls: the resolved storage location (on the mountpoint key's value)
//! and the per-namespace key counts last seen, which drive the
//! change-detection that lets Set skip untouched partitions.

use crate::key::{Key, Value};
use crate::name::Namespace;
use crate::plugin::PluginHandle;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A backend shared between the mount table and split partitions.
pub type SharedBackend = Arc<Mutex<Backend>>;

/// The plugin chain responsible for one mountpoint.
pub struct Backend {
    mountpoint: Key,
    get_resolver: Option<PluginHandle>,
    get_filters: Vec<PluginHandle>,
    set_resolver: Option<PluginHandle>,
    pre_commit: Vec<PluginHandle>,
    commit: Option<PluginHandle>,
    post_commit: Vec<PluginHandle>,
    error_handlers: Vec<PluginHandle>,
    sizes: BTreeMap<Namespace, usize>,
}

impl Backend {
    /// The key naming where this backend is mounted. Its value carries
    /// the last resolved storage location.
    pub fn mountpoint(&self) -> &Key {
        &self.mountpoint
    }

    /// Remember the resolved storage location for reuse by later calls.
    pub fn remember_location(&mut self, value: Option<Value>) {
        self.mountpoint.set_value(value);
    }

    pub fn get_resolver(&self) -> Option<&PluginHandle> {
        self.get_resolver.as_ref()
    }

    pub fn get_filters(&self) -> &[PluginHandle] {
        &self.get_filters
    }

    pub fn set_resolver(&self) -> Option<&PluginHandle> {
        self.set_resolver.as_ref()
    }

    pub fn pre_commit(&self) -> &[PluginHandle] {
        &self.pre_commit
    }

    pub fn commit(&self) -> Option<&PluginHandle> {
        self.commit.as_ref()
    }

    pub fn post_commit(&self) -> &[PluginHandle] {
        &self.post_commit
    }

    pub fn error_handlers(&self) -> &[PluginHandle] {
        &self.error_handlers
    }

    /// The number of keys this backend last produced or received for the
    /// given namespace, or `None` if it was never read.
    pub fn remembered_size(&self, ns: Namespace) -> Option<usize> {
        self.sizes.get(&ns).copied()
    }

    pub fn set_remembered_size(&mut self, ns: Namespace, size: usize) {
        self.sizes.insert(ns, size);
    }
}

/// Builder assembling a backend's plugin chain.
///
/// Slots are filled in the order methods are called; ordering within a
/// role is the invocation order during Get/Set.
pub struct BackendBuilder {
    backend: Backend,
}

impl BackendBuilder {
    pub fn new(mountpoint: Key) -> Self {
        Self {
            backend: Backend {
                mountpoint,
                get_resolver: None,
                get_filters: Vec::new(),
                set_resolver: None,
                pre_commit: Vec::new(),
                commit: None,
                post_commit: Vec::new(),
                error_handlers: Vec::new(),
                sizes: BTreeMap::new(),
            },
        }
    }

    pub fn get_resolver(mut self, plugin: PluginHandle) -> Self {
        self.backend.get_resolver = Some(plugin);
        self
    }

    pub fn get_filter(mut self, plugin: PluginHandle) -> Self {
        self.backend.get_filters.push(plugin);
        self
    }

    pub fn set_resolver(mut self, plugin: PluginHandle) -> Self {
        self.backend.set_resolver = Some(plugin);
        self
    }

    pub fn pre_commit(mut self, plugin: PluginHandle) -> Self {
        self.backend.pre_commit.push(plugin);
        self
    }

    pub fn commit(mut self, plugin: PluginHandle) -> Self {
        self.backend.commit = Some(plugin);
        self
    }

    pub fn post_commit(mut self, plugin: PluginHandle) -> Self {
        self.backend.post_commit.push(plugin);
        self
    }

    pub fn error_handler(mut self, plugin: PluginHandle) -> Self {
        self.backend.error_handlers.push(plugin);
        self
    }

    pub fn build(self) -> Backend {
        self.backend
    }

    /// Build and wrap into a [`SharedBackend`].
    pub fn build_shared(self) -> SharedBackend {
        Arc::new(Mutex::new(self.backend))
    }
}

/// Wrap a backend into a [`SharedBackend`].
pub fn shared(backend: Backend) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}
