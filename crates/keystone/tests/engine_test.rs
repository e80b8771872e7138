//! End-to-end tests of the Get/Set engine over in-memory backends.
//!
//! The mock backend keeps its data in a shared store with a generation
//! counter, so tests can simulate concurrent modification and observe
//! commits and rollbacks from the outside.

use keystone::{
    has_warning, plugin_handle, warning_count, Backend, BackendBuilder, BackendFactory,
    GetStatus, Handle, Key, KeySet, KeystoneError, Plugin, Result, SetStatus, SyncVerdict,
    UpdateVerdict, WarningKind, MOUNTPOINTS_PATH,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct Store {
    data: BTreeMap<String, String>,
    generation: u64,
    commits: usize,
    rollbacks: usize,
}

type SharedStore = Arc<Mutex<Store>>;

fn seeded(entries: &[(&str, &str)]) -> SharedStore {
    let store = SharedStore::default();
    {
        let mut guard = store.lock();
        for (name, value) in entries {
            guard.data.insert(name.to_string(), value.to_string());
        }
    }
    store
}

/// One plugin instance serving every slot of a backend, the way a real
/// resolver-plus-storage pair would.
struct MemoryPlugin {
    store: SharedStore,
    seen: Option<u64>,
    staged: Option<BTreeMap<String, String>>,
    fail_prepare: bool,
    fail_commit: bool,
    /// Key name to blame on prepare failure, appended to the partition
    /// keyset so the engine finds it under the cursor.
    blame: Option<String>,
}

impl MemoryPlugin {
    fn new(store: &SharedStore) -> Self {
        Self {
            store: store.clone(),
            seen: None,
            staged: None,
            fail_prepare: false,
            fail_commit: false,
            blame: None,
        }
    }
}

impl Plugin for MemoryPlugin {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&mut self, ks: &mut KeySet, _parent: &mut Key) -> Result<UpdateVerdict> {
        let store = self.store.lock();
        if self.seen == Some(store.generation) {
            return Ok(UpdateVerdict::Unchanged);
        }
        for (name, value) in &store.data {
            ks.append(Key::with_value(name.clone(), value.clone()));
        }
        self.seen = Some(store.generation);
        Ok(UpdateVerdict::Changed)
    }

    fn set(&mut self, ks: &mut KeySet, _parent: &mut Key) -> Result<SyncVerdict> {
        if self.fail_prepare {
            match &self.blame {
                Some(name) => {
                    ks.append(Key::new(name.clone()));
                    ks.set_cursor(name);
                }
                None => {
                    ks.rewind();
                    ks.next_key();
                }
            }
            return Err(KeystoneError::InvalidArgument(
                "validation failed".to_string(),
            ));
        }
        let store = self.store.lock();
        if self.seen != Some(store.generation) {
            return Err(KeystoneError::InvalidArgument(
                "store changed since last read".to_string(),
            ));
        }
        self.staged = Some(
            ks.iter()
                .filter_map(|k| k.string().map(|v| (k.name().to_string(), v.to_string())))
                .collect(),
        );
        Ok(SyncVerdict::NeedsSync)
    }

    fn commit(&mut self, _ks: &mut KeySet, _parent: &mut Key) -> Result<()> {
        if self.fail_commit {
            return Err(KeystoneError::InvalidArgument("disk full".to_string()));
        }
        if let Some(staged) = self.staged.take() {
            let mut store = self.store.lock();
            store.data = staged;
            store.generation += 1;
            store.commits += 1;
            self.seen = Some(store.generation);
        }
        Ok(())
    }

    fn error(&mut self, _ks: &mut KeySet, _parent: &mut Key) -> Result<()> {
        self.staged = None;
        self.store.lock().rollbacks += 1;
        Ok(())
    }
}

fn memory_backend_with(
    mountpoint: &str,
    store: &SharedStore,
    tweak: impl FnOnce(&mut MemoryPlugin),
) -> Backend {
    let mut plugin = MemoryPlugin::new(store);
    tweak(&mut plugin);
    let handle = plugin_handle(plugin);
    BackendBuilder::new(Key::new(mountpoint))
        .get_resolver(handle.clone())
        .get_filter(handle.clone())
        .set_resolver(handle.clone())
        .pre_commit(handle.clone())
        .commit(handle.clone())
        .error_handler(handle)
        .build()
}

fn memory_backend(mountpoint: &str, store: &SharedStore) -> Backend {
    memory_backend_with(mountpoint, store, |_| {})
}

/// Factory sharing stores across handles, so separate sessions see the
/// same data.
struct MemoryFactory {
    default_store: SharedStore,
    stores: BTreeMap<String, SharedStore>,
}

impl MemoryFactory {
    fn new(default_store: &SharedStore) -> Self {
        Self {
            default_store: default_store.clone(),
            stores: BTreeMap::new(),
        }
    }

    fn with_store(mut self, mountpoint: &str, store: &SharedStore) -> Self {
        self.stores.insert(mountpoint.to_string(), store.clone());
        self
    }
}

impl BackendFactory for MemoryFactory {
    fn create_default(&self) -> Result<Backend> {
        Ok(memory_backend("/", &self.default_store))
    }

    fn create(&self, mountpoint: &Key, _definition: &KeySet) -> Result<Backend> {
        let store = self
            .stores
            .get(mountpoint.name())
            .cloned()
            .unwrap_or_default();
        Ok(memory_backend(mountpoint.name(), &store))
    }
}

fn open_with_default(store: &SharedStore) -> Handle {
    Handle::open(&MemoryFactory::new(store)).unwrap()
}

#[test]
fn test_get_set_round_trip_across_handles() {
    let store = SharedStore::default();
    let mut writer = open_with_default(&store);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    writer.get(&mut ks, &mut parent).unwrap();
    assert!(ks.is_empty());

    ks.append(Key::with_value("user/app/greeting", "hello"));
    assert_eq!(writer.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert!(!ks.lookup("user/app/greeting").unwrap().needs_sync());

    let mut reader = open_with_default(&store);
    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    assert_eq!(reader.get(&mut ks, &mut parent).unwrap(), GetStatus::Updated);
    assert_eq!(
        ks.lookup("user/app/greeting").unwrap().string(),
        Some("hello")
    );
}

#[test]
fn test_unchanged_get_keeps_pending_modifications() {
    let store = seeded(&[("user/app/x", "1")]);
    let mut handle = open_with_default(&store);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    assert_eq!(handle.get(&mut ks, &mut parent).unwrap(), GetStatus::Updated);

    ks.lookup_mut("user/app/x").unwrap().set_string("edited");
    assert_eq!(
        handle.get(&mut ks, &mut parent).unwrap(),
        GetStatus::Unchanged
    );
    let key = ks.lookup("user/app/x").unwrap();
    assert_eq!(key.string(), Some("edited"));
    assert!(key.needs_sync());
}

#[test]
fn test_set_without_changes_writes_nothing() {
    let store = seeded(&[("user/app/x", "1")]);
    let mut handle = open_with_default(&store);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Unchanged);
    assert_eq!(store.lock().commits, 0);
}

#[test]
fn test_pure_deletion_is_detected() {
    let store = seeded(&[("user/app/x", "1"), ("user/app/y", "2")]);
    let mut handle = open_with_default(&store);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();

    // removal leaves no dirty key behind; only the size betrays it
    ks.remove("user/app/y").unwrap();
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert!(!store.lock().data.contains_key("user/app/y"));
    assert!(store.lock().data.contains_key("user/app/x"));
}

#[test]
fn test_set_before_get_is_rejected() {
    let store = SharedStore::default();
    let mut handle = open_with_default(&store);

    let mut ks = KeySet::new();
    ks.append(Key::with_value("user/app/x", "1"));
    let mut parent = Key::new("user/app");
    let err = handle.set(&mut ks, &mut parent).unwrap_err();
    assert!(matches!(err, KeystoneError::SyncState(_)));
    assert_eq!(store.lock().commits, 0);
}

#[test]
fn test_conflict_leaves_store_untouched_and_retry_succeeds() {
    let store = seeded(&[("user/app/x", "1")]);
    let mut handle = open_with_default(&store);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();

    // another writer gets there first
    {
        let mut guard = store.lock();
        guard.data.insert("user/app/x".to_string(), "theirs".to_string());
        guard.generation += 1;
    }

    ks.lookup_mut("user/app/x").unwrap().set_string("mine");
    let err = handle.set(&mut ks, &mut parent).unwrap_err();
    assert!(matches!(err, KeystoneError::Conflict { .. }));
    assert_eq!(store.lock().data["user/app/x"], "theirs");
    assert_eq!(store.lock().rollbacks, 1);

    // conflict resolution is the caller's: re-read, reapply, retry
    assert_eq!(handle.get(&mut ks, &mut parent).unwrap(), GetStatus::Updated);
    assert_eq!(ks.lookup("user/app/x").unwrap().string(), Some("theirs"));
    ks.lookup_mut("user/app/x").unwrap().set_string("mine");
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert_eq!(store.lock().data["user/app/x"], "mine");
}

#[test]
fn test_failing_mountpoint_vetoes_the_whole_transaction() {
    let store_a = seeded(&[("user/app/x", "1")]);
    let store_b = seeded(&[("user/db/y", "2")]);
    let default_store = SharedStore::default();

    let mut handle = open_with_default(&default_store);
    handle.mount(memory_backend("user/app", &store_a)).unwrap();
    handle
        .mount(memory_backend_with("user/db", &store_b, |p| {
            p.fail_prepare = true
        }))
        .unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user");
    handle.get(&mut ks, &mut parent).unwrap();
    assert_eq!(ks.len(), 2);

    ks.lookup_mut("user/app/x").unwrap().set_string("new");
    ks.lookup_mut("user/db/y").unwrap().set_string("new");
    let err = handle.set(&mut ks, &mut parent).unwrap_err();
    assert!(matches!(err, KeystoneError::Conflict { .. }));

    // the healthy partition was staged but must not commit
    assert_eq!(store_a.lock().commits, 0);
    assert_eq!(store_a.lock().rollbacks, 1);
    assert_eq!(store_a.lock().data["user/app/x"], "1");
    assert_eq!(store_b.lock().rollbacks, 1);

    // the cursor points at the key the failing plugin blamed
    assert_eq!(ks.current().unwrap().name(), "user/db/y");
}

#[test]
fn test_blamed_key_outside_keyset_becomes_warning() {
    let store = seeded(&[("user/app/x", "1")]);
    let mut handle = open_with_default(&SharedStore::default());
    handle
        .mount(memory_backend_with("user/app", &store, |p| {
            p.fail_prepare = true;
            p.blame = Some("user/app/ghost".to_string());
        }))
        .unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    ks.lookup_mut("user/app/x").unwrap().set_string("new");

    assert!(handle.set(&mut ks, &mut parent).is_err());
    assert!(has_warning(&parent, WarningKind::ErrorKeyMissing));
    assert!(ks.lookup("user/app/ghost").is_none());
}

#[test]
fn test_commit_clears_dirty_flags_on_the_whole_keyset() {
    let store_a = seeded(&[("user/app/x", "1")]);
    let store_b = seeded(&[("user/db/y", "2")]);
    let mut handle = open_with_default(&SharedStore::default());
    handle.mount(memory_backend("user/app", &store_a)).unwrap();
    handle.mount(memory_backend("user/db", &store_b)).unwrap();

    let mut ks = KeySet::new();
    let mut wide = Key::new("user");
    handle.get(&mut ks, &mut wide).unwrap();
    ks.lookup_mut("user/app/x").unwrap().set_string("new");
    ks.lookup_mut("user/db/y").unwrap().set_string("pending");

    // scoped below user/app: user/db's backend is not in the split,
    // but a successful commit still cleans the whole caller set
    let mut parent = Key::new("user/app");
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert!(!ks.lookup("user/app/x").unwrap().needs_sync());
    assert!(!ks.lookup("user/db/y").unwrap().needs_sync());
    assert_eq!(store_b.lock().data["user/db/y"], "2");
}

#[test]
fn test_later_prepare_failures_become_warnings() {
    let store_a = seeded(&[("user/app/x", "1")]);
    let store_b = seeded(&[("user/db/y", "2")]);
    let mut handle = open_with_default(&SharedStore::default());
    handle
        .mount(memory_backend_with("user/app", &store_a, |p| {
            p.fail_prepare = true
        }))
        .unwrap();
    handle
        .mount(memory_backend_with("user/db", &store_b, |p| {
            p.fail_prepare = true
        }))
        .unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user");
    handle.get(&mut ks, &mut parent).unwrap();
    ks.lookup_mut("user/app/x").unwrap().set_string("new");
    ks.lookup_mut("user/db/y").unwrap().set_string("new");

    let err = handle.set(&mut ks, &mut parent).unwrap_err();
    // the first partition's failure is the error, the second one's is
    // kept as a warning instead of vanishing
    assert!(matches!(err, KeystoneError::Conflict { ref mountpoint, .. } if mountpoint == "user/app"));
    assert!(has_warning(&parent, WarningKind::PrepareFailed));
    assert_eq!(warning_count(&parent), 1);
}

#[test]
fn test_commit_failure_degrades_to_warning() {
    let store = seeded(&[("user/app/x", "1")]);
    let mut handle = open_with_default(&SharedStore::default());
    handle
        .mount(memory_backend_with("user/app", &store, |p| {
            p.fail_commit = true
        }))
        .unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    ks.lookup_mut("user/app/x").unwrap().set_string("new");

    // past the commit boundary the call still reports success
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert!(has_warning(&parent, WarningKind::CommitFailed));
}

#[test]
fn test_keys_route_to_their_mountpoints() {
    let store_a = SharedStore::default();
    let default_store = SharedStore::default();
    let mut handle = open_with_default(&default_store);
    handle.mount(memory_backend("user/app", &store_a)).unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user");
    handle.get(&mut ks, &mut parent).unwrap();

    ks.append(Key::with_value("user/app/x", "a"));
    ks.append(Key::with_value("user/other/y", "b"));
    handle.set(&mut ks, &mut parent).unwrap();

    assert_eq!(store_a.lock().data["user/app/x"], "a");
    assert!(!store_a.lock().data.contains_key("user/other/y"));
    assert_eq!(default_store.lock().data["user/other/y"], "b");
    assert!(!default_store.lock().data.contains_key("user/app/x"));
}

#[test]
fn test_bootstrap_mounts_from_stored_configuration() {
    let definition = format!("{MOUNTPOINTS_PATH}/app");
    let default_store = seeded(&[(definition.as_str(), "user/app")]);
    let store_a = seeded(&[("user/app/x", "1")]);

    let factory = MemoryFactory::new(&default_store).with_store("user/app", &store_a);
    let mut handle = Handle::open(&factory).unwrap();
    assert_eq!(handle.mountpoints(), ["user/app"]);

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    assert_eq!(ks.lookup("user/app/x").unwrap().string(), Some("1"));
}

/// Hook occupying a post-commit slot that always fails.
struct FailingHook;

impl Plugin for FailingHook {
    fn name(&self) -> &str {
        "failing-hook"
    }

    fn commit(&mut self, _ks: &mut KeySet, _parent: &mut Key) -> Result<()> {
        Err(KeystoneError::InvalidArgument("hook failed".to_string()))
    }
}

#[test]
fn test_post_commit_failure_degrades_to_warning() {
    let store = seeded(&[("user/app/x", "1")]);
    let plugin = plugin_handle(MemoryPlugin::new(&store));
    let backend = BackendBuilder::new(Key::new("user/app"))
        .get_resolver(plugin.clone())
        .get_filter(plugin.clone())
        .set_resolver(plugin.clone())
        .pre_commit(plugin.clone())
        .commit(plugin)
        .post_commit(plugin_handle(FailingHook))
        .build();
    let mut handle = open_with_default(&SharedStore::default());
    handle.mount(backend).unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    ks.lookup_mut("user/app/x").unwrap().set_string("new");

    // the data is durable before the hook runs, so the call succeeds
    assert_eq!(handle.set(&mut ks, &mut parent).unwrap(), SetStatus::Committed);
    assert!(has_warning(&parent, WarningKind::CommitFailed));
    assert_eq!(store.lock().commits, 1);
    assert_eq!(store.lock().data["user/app/x"], "new");
}

/// Resolver that resolves a location and reports a change.
struct LocationResolver;

impl Plugin for LocationResolver {
    fn name(&self) -> &str {
        "location"
    }

    fn get(&mut self, _ks: &mut KeySet, parent: &mut Key) -> Result<UpdateVerdict> {
        parent.set_string("resolved://app");
        Ok(UpdateVerdict::Changed)
    }
}

/// Resolver that cannot reach its store.
struct UnreachableResolver;

impl Plugin for UnreachableResolver {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn get(&mut self, _ks: &mut KeySet, _parent: &mut Key) -> Result<UpdateVerdict> {
        Err(KeystoneError::InvalidArgument("store unreachable".to_string()))
    }
}

#[test]
fn test_locations_resolved_before_a_failed_get_are_kept() {
    let mut handle = open_with_default(&SharedStore::default());
    handle
        .mount(
            BackendBuilder::new(Key::new("user/app"))
                .get_resolver(plugin_handle(LocationResolver))
                .build(),
        )
        .unwrap();
    handle
        .mount(
            BackendBuilder::new(Key::new("user/app/deep"))
                .get_resolver(plugin_handle(UnreachableResolver))
                .build(),
        )
        .unwrap();

    let mut ks = KeySet::new();
    let mut parent = Key::new("user/app");
    let err = handle.get(&mut ks, &mut parent).unwrap_err();
    assert!(matches!(err, KeystoneError::Plugin { .. }));
    // the first mountpoint resolved before the second failed; its
    // location must survive the error
    assert_eq!(parent.string(), Some("resolved://app"));
}

#[test]
fn test_keys_of_uninvolved_backends_survive_a_get() {
    let store_a = seeded(&[("user/app/x", "1")]);
    let store_b = seeded(&[("system/db/conn", "tcp")]);
    let mut handle = open_with_default(&SharedStore::default());
    handle.mount(memory_backend("user/app", &store_a)).unwrap();
    handle.mount(memory_backend("system/db", &store_b)).unwrap();

    let mut ks = KeySet::new();
    ks.append(Key::with_value("user/app/x", "stale"));
    let mut parked = Key::with_value("system/db/conn", "keep me");
    parked.mark_clean();
    ks.append(parked);

    // parent scopes the read to user/app; system/db's backend is not
    // part of the call, so its key must round-trip untouched even
    // though the store behind it says otherwise
    let mut parent = Key::new("user/app");
    handle.get(&mut ks, &mut parent).unwrap();
    assert_eq!(ks.lookup("user/app/x").unwrap().string(), Some("1"));
    assert_eq!(ks.lookup("system/db/conn").unwrap().string(), Some("keep me"));
}
