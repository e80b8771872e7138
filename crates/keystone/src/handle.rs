//! Handle lifecycle: open, bootstrap, close.
//!
//! Opening a handle is itself a Get: the mount configuration lives under
//! the reserved `system/keystone` namespace and is read through a
//! throwaway default backend before the real mount table is assembled.
//! Applications therefore configure mountpoints with the same Get/Set
//! calls they use for everything else.

use crate::mount::{mount_definitions, BackendFactory, MountRegistry};
use keystone_core::{Backend, Key, KeySet, KeystoneError, Result};

/// Root of the reserved namespace. Keys below it describe the database
/// itself and are served by the default backend.
pub const RESERVED_ROOT: &str = "system/keystone";

/// Where mount definitions live inside the reserved namespace.
pub const MOUNTPOINTS_PATH: &str = "system/keystone/mountpoints";

/// An open key database session.
///
/// A handle owns its mount table; concurrent sessions are separate
/// handles. All conflict detection is per handle: a mountpoint must be
/// read through this handle before it can be written through it.
pub struct Handle {
    router: MountRegistry,
    closed: bool,
}

impl Handle {
    /// Open a handle, bootstrapping the mount table from the stored
    /// configuration.
    ///
    /// The factory's default backend is created twice: once as a
    /// throwaway for the bootstrap read of [`MOUNTPOINTS_PATH`], and once
    /// fresh for the final mount table, so the handle starts without
    /// resolver state from the bootstrap cycle. A missing or unreadable
    /// mount configuration is not fatal; the handle then serves
    /// everything through the default backend.
    pub fn open(factory: &dyn BackendFactory) -> Result<Handle> {
        let bootstrap = factory.create_default()?;
        let mut handle = Handle {
            router: MountRegistry::new(bootstrap),
            closed: false,
        };

        let mut mounts = KeySet::new();
        let mut root = Key::new(MOUNTPOINTS_PATH);
        if let Err(e) = handle.get(&mut mounts, &mut root) {
            tracing::warn!(error = %e, "could not read the mount configuration, continuing with the default backend only");
        }

        let mut router = MountRegistry::new(factory.create_default()?);
        for def in mount_definitions(&mounts, MOUNTPOINTS_PATH) {
            let mounted = factory
                .create(&def.mountpoint, &def.config)
                .and_then(|backend| router.mount(backend));
            if let Err(e) = mounted {
                tracing::warn!(
                    mountpoint = def.mountpoint.name(),
                    error = %e,
                    "skipping mountpoint"
                );
            }
        }
        tracing::debug!(mountpoints = router.mountpoints().len(), "handle open");

        handle.router = router;
        Ok(handle)
    }

    /// Mount an additional backend into this handle's mount table.
    pub fn mount(&mut self, backend: Backend) -> Result<()> {
        self.ensure_open()?;
        self.router.mount(backend)
    }

    /// Close the handle and drop all mounted backends. Using the handle
    /// afterwards, including closing it again, is an error.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.router.clear();
        tracing::debug!("handle closed");
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(KeystoneError::InvalidArgument(
                "handle is closed".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn router(&self) -> &MountRegistry {
        &self.router
    }

    /// Names of all explicitly mounted mountpoints.
    pub fn mountpoints(&self) -> Vec<String> {
        self.router.mountpoints()
    }
}
