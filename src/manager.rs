//! The mesh cache registry and its public loading surface.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use crate::events::MeshEvent;
use crate::handles::MeshHandle;
use crate::loader::{self, Completion, LoadRequest, WorkerPool};
use crate::mesh::MeshData;
use crate::primitives;

/// Reserved registry key for the shared procedural cube. Not a filesystem
/// path; it only exists so the cube participates in interning and
/// refcounting like any other entry.
const SHARED_CUBE_KEY: &str = "__shared_cube";

/// Tuning knobs for a [`MeshManager`].
#[derive(Debug, Clone)]
pub struct MeshManagerConfig {
    /// Number of background loader threads.
    pub worker_threads: usize,
}

impl Default for MeshManagerConfig {
    fn default() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);
        Self { worker_threads }
    }
}

/// One cache entry: the interned path, the mesh slot, and the refcount.
///
/// The `OnceLock` doubles as the loaded flag: it is written exactly once,
/// and any reader that observes it set also observes the fully constructed
/// mesh (the lock's internal synchronization provides the acquire/release
/// pairing).
pub(crate) struct CacheEntry {
    path: PathBuf,
    mesh: OnceLock<MeshData>,
    refcount: AtomicU32,
    load_dispatched: AtomicBool,
}

impl CacheEntry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            mesh: OnceLock::new(),
            refcount: AtomicU32::new(1),
            load_dispatched: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.mesh.get().is_some()
    }

    /// Installs the mesh if no other execution context got there first.
    /// Returns `true` when this caller's value was published.
    pub(crate) fn publish(&self, mesh: MeshData) -> bool {
        self.mesh.set(mesh).is_ok()
    }

    /// Claims the right to dispatch a background load; only the first caller
    /// per entry gets `true`.
    fn claim_dispatch(&self) -> bool {
        self.load_dispatched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Shared read access to a loaded mesh. Holding a `MeshRef` keeps the mesh
/// memory alive even if the entry is released or evicted underneath it.
pub struct MeshRef(Arc<CacheEntry>);

impl Deref for MeshRef {
    type Target = MeshData;

    fn deref(&self) -> &MeshData {
        self.0
            .mesh
            .get()
            .expect("MeshRef is only constructed for loaded entries")
    }
}

type LoadCallback = Box<dyn FnOnce(MeshHandle) + Send>;

#[derive(Default)]
struct Registry {
    path_to_handle: HashMap<PathBuf, MeshHandle>,
    entries: HashMap<MeshHandle, Arc<CacheEntry>>,
    callbacks: HashMap<MeshHandle, Vec<LoadCallback>>,
    next_handle: u32,
}

impl Registry {
    fn allocate_handle(&mut self) -> MeshHandle {
        self.next_handle += 1;
        MeshHandle::new(self.next_handle)
    }

    fn evict(&mut self, handle: MeshHandle) {
        if let Some(entry) = self.entries.remove(&handle) {
            self.path_to_handle.remove(&entry.path);
            self.callbacks.remove(&handle);
        }
    }
}

/// Handle-based cache of mesh assets.
///
/// One `MeshManager` is constructed at startup and passed by reference to
/// every collaborator; all methods take `&self` and are safe to call from
/// any thread, with the exception that [`poll_completed`] is meant to be
/// called periodically from the single owning thread (load callbacks run on
/// whichever thread polls).
///
/// [`poll_completed`]: MeshManager::poll_completed
pub struct MeshManager {
    registry: Mutex<Registry>,
    pool: WorkerPool,
    completed_rx: Receiver<Completion>,
    events_tx: Sender<MeshEvent>,
    events_rx: Receiver<MeshEvent>,
}

impl MeshManager {
    pub fn new() -> Self {
        Self::with_config(MeshManagerConfig::default())
    }

    pub fn with_config(config: MeshManagerConfig) -> Self {
        let (completed_tx, completed_rx) = unbounded::<Completion>();
        let (events_tx, events_rx) = unbounded::<MeshEvent>();
        let pool = WorkerPool::new(config.worker_threads, completed_tx, events_tx.clone());
        Self {
            registry: Mutex::new(Registry::default()),
            pool,
            completed_rx,
            events_tx,
            events_rx,
        }
    }

    /// Notification bus carrying one [`MeshEvent`] per load attempt.
    /// Intended for a single consumer.
    ///
    /// Events are advisory: the entry behind a `Loaded` event can have been
    /// released between the background parse and the event's delivery, so
    /// consumers confirm through [`get_mesh`] rather than trusting the
    /// handle directly.
    ///
    /// [`get_mesh`]: MeshManager::get_mesh
    pub fn events(&self) -> &Receiver<MeshEvent> {
        &self.events_rx
    }

    /// Returns the existing handle for `path` with its refcount incremented,
    /// or allocates a fresh unloaded entry with refcount 1. Handles strictly
    /// increase and are never recycled.
    pub fn create_or_get_handle(&self, path: impl AsRef<Path>) -> MeshHandle {
        let path = path.as_ref();
        let mut registry = self.lock_registry();
        if let Some(&handle) = registry.path_to_handle.get(path) {
            if let Some(entry) = registry.entries.get(&handle) {
                entry.refcount.fetch_add(1, Ordering::Relaxed);
            }
            return handle;
        }

        let handle = registry.allocate_handle();
        let entry = Arc::new(CacheEntry::new(path.to_path_buf()));
        registry.entries.insert(handle, entry);
        registry.path_to_handle.insert(path.to_path_buf(), handle);
        handle
    }

    /// Increments the refcount of a live handle; unknown handles are a no-op.
    pub fn add_ref(&self, handle: MeshHandle) {
        let registry = self.lock_registry();
        if let Some(entry) = registry.entries.get(&handle) {
            entry.refcount.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Decrements the refcount; reaching zero erases the entry, its path
    /// mapping and any pending callbacks. Unknown handles are a no-op.
    pub fn release(&self, handle: MeshHandle) {
        let mut registry = self.lock_registry();
        let last_ref = match registry.entries.get(&handle) {
            Some(entry) => entry.refcount.fetch_sub(1, Ordering::AcqRel) == 1,
            None => return,
        };
        if last_ref {
            registry.evict(handle);
        }
    }

    /// Current refcount of a handle, or `None` for unknown handles.
    pub fn ref_count(&self, handle: MeshHandle) -> Option<u32> {
        let registry = self.lock_registry();
        registry
            .entries
            .get(&handle)
            .map(|e| e.refcount.load(Ordering::Relaxed))
    }

    /// Returns the mesh behind a handle, or `None` when the handle is
    /// unknown or its load has not finished.
    pub fn get_mesh(&self, handle: MeshHandle) -> Option<MeshRef> {
        let entry = self.lock_registry().entries.get(&handle).cloned()?;
        entry.is_loaded().then(|| MeshRef(entry))
    }

    /// Loads a mesh, blocking the caller for the duration of file I/O and
    /// parsing. Returns [`MeshHandle::INVALID`] on failure, in which case
    /// the claimed entry is evicted so a later call may retry. Already
    /// loaded paths return immediately with the refcount incremented.
    pub fn load_mesh_sync(&self, path: impl AsRef<Path>) -> MeshHandle {
        let path = path.as_ref();
        let handle = self.create_or_get_handle(path);
        let Some(entry) = self.entry(handle) else {
            return MeshHandle::INVALID;
        };
        if entry.is_loaded() {
            return handle;
        }

        match loader::parse_mesh(path) {
            Ok(mesh) => {
                if entry.publish(mesh) {
                    debug!("loaded mesh {} (handle {})", path.display(), handle.raw());
                    let _ = self.events_tx.send(MeshEvent::Loaded {
                        path: path.to_path_buf(),
                        handle,
                    });
                }
                handle
            }
            Err(error) => {
                // A background load may have finished while this parse was
                // running; the entry then stays and the failure is ignored.
                let mut registry = self.lock_registry();
                if registry
                    .entries
                    .get(&handle)
                    .is_some_and(|e| e.is_loaded())
                {
                    return handle;
                }
                registry.evict(handle);
                drop(registry);

                warn!("failed to load mesh {}: {}", path.display(), error);
                let _ = self.events_tx.send(MeshEvent::LoadFailed {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
                MeshHandle::INVALID
            }
        }
    }

    /// Requests a background load and returns the handle immediately. The
    /// mesh becomes observable through [`get_mesh`] only after the parse
    /// finishes; callbacks registered for the handle fire on the first
    /// [`poll_completed`] after that.
    ///
    /// [`get_mesh`]: MeshManager::get_mesh
    /// [`poll_completed`]: MeshManager::poll_completed
    pub fn load_mesh_async(&self, path: impl AsRef<Path>) -> MeshHandle {
        let path = path.as_ref();
        let handle = self.create_or_get_handle(path);
        let Some(entry) = self.entry(handle) else {
            return handle;
        };
        if entry.is_loaded() || !entry.claim_dispatch() {
            return handle;
        }

        self.pool.dispatch(LoadRequest {
            handle,
            path: entry.path.clone(),
            entry,
        });
        handle
    }

    /// Registers a continuation to run when the handle's background load is
    /// observed complete by [`poll_completed`]. Callbacks always execute on
    /// the polling thread and are dropped after firing once. Unknown handles
    /// are a no-op.
    ///
    /// [`poll_completed`]: MeshManager::poll_completed
    pub fn register_load_callback<F>(&self, handle: MeshHandle, callback: F)
    where
        F: FnOnce(MeshHandle) + Send + 'static,
    {
        let mut registry = self.lock_registry();
        if registry.entries.contains_key(&handle) {
            registry
                .callbacks
                .entry(handle)
                .or_default()
                .push(Box::new(callback));
        }
    }

    /// Drains the completion queue. Successful completions fire (and
    /// discard) the handle's callbacks on this thread; failed completions
    /// evict their entry so the path can be retried, unless a later load
    /// already succeeded on it.
    pub fn poll_completed(&self) {
        while let Ok(completion) = self.completed_rx.try_recv() {
            match completion.error {
                None => {
                    let callbacks = {
                        let mut registry = self.lock_registry();
                        registry
                            .callbacks
                            .remove(&completion.handle)
                            .unwrap_or_default()
                    };
                    // Run outside the lock so callbacks may reenter the
                    // manager.
                    for callback in callbacks {
                        callback(completion.handle);
                    }
                }
                Some(error) => {
                    // The failure record may be stale: a later load can have
                    // succeeded on the same entry before this poll. Only a
                    // still-unloaded entry is evicted.
                    let mut registry = self.lock_registry();
                    let still_unloaded = registry
                        .entries
                        .get(&completion.handle)
                        .is_some_and(|e| !e.is_loaded());
                    if still_unloaded {
                        debug!(
                            "evicting failed entry {} (handle {}): {}",
                            completion.path.display(),
                            completion.handle.raw(),
                            error
                        );
                        registry.evict(completion.handle);
                    }
                }
            }
        }
    }

    /// Handle to the shared procedural unit cube, generated on first use and
    /// interned under a reserved key. Each call increments the refcount,
    /// exactly like [`create_or_get_handle`].
    ///
    /// [`create_or_get_handle`]: MeshManager::create_or_get_handle
    pub fn get_shared_cube_handle(&self) -> MeshHandle {
        let handle = self.create_or_get_handle(SHARED_CUBE_KEY);
        if let Some(entry) = self.entry(handle) {
            if !entry.is_loaded() {
                entry.publish(primitives::unit_cube());
            }
        }
        handle
    }

    fn entry(&self, handle: MeshHandle) -> Option<Arc<CacheEntry>> {
        self.lock_registry().entries.get(&handle).cloned()
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .expect("mesh registry lock poisoned")
    }
}

impl Default for MeshManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MeshManager {
        MeshManager::with_config(MeshManagerConfig { worker_threads: 2 })
    }

    #[test]
    fn interning_returns_same_handle_and_bumps_refcount() {
        let manager = manager();
        let a = manager.create_or_get_handle("meshes/rock.obj");
        let b = manager.create_or_get_handle("meshes/rock.obj");
        assert_eq!(a, b);
        assert_eq!(manager.ref_count(a), Some(2));
    }

    #[test]
    fn distinct_paths_get_distinct_handles() {
        let manager = manager();
        let a = manager.create_or_get_handle("a.obj");
        let b = manager.create_or_get_handle("b.obj");
        assert_ne!(a, b);
    }

    #[test]
    fn release_to_zero_erases_and_handles_never_recycle() {
        let manager = manager();
        let first = manager.create_or_get_handle("meshes/rock.obj");
        manager.release(first);
        assert_eq!(manager.ref_count(first), None);

        let second = manager.create_or_get_handle("meshes/rock.obj");
        assert!(second.raw() > first.raw());
    }

    #[test]
    fn add_ref_and_release_on_unknown_handles_are_noops() {
        let manager = manager();
        manager.add_ref(MeshHandle::new(42));
        manager.release(MeshHandle::new(42));
        manager.release(MeshHandle::INVALID);
    }

    #[test]
    fn partial_release_keeps_entry() {
        let manager = manager();
        let h = manager.create_or_get_handle("x.obj");
        manager.add_ref(h);
        manager.release(h);
        assert_eq!(manager.ref_count(h), Some(1));
    }

    #[test]
    fn get_mesh_is_none_for_unloaded_or_unknown() {
        let manager = manager();
        let h = manager.create_or_get_handle("never_loaded.obj");
        assert!(manager.get_mesh(h).is_none());
        assert!(manager.get_mesh(MeshHandle::new(999)).is_none());
    }

    #[test]
    fn shared_cube_interns_and_refcounts() {
        let manager = manager();
        let a = manager.get_shared_cube_handle();
        let b = manager.get_shared_cube_handle();
        let c = manager.get_shared_cube_handle();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(manager.ref_count(a), Some(3));

        let cube = manager.get_mesh(a).expect("cube is loaded eagerly");
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
    }

    #[test]
    fn mesh_ref_outlives_eviction() {
        let manager = manager();
        let h = manager.get_shared_cube_handle();
        let mesh = manager.get_mesh(h).expect("loaded");
        manager.release(h);
        assert!(manager.get_mesh(h).is_none());
        // The clone taken before release still reads valid data.
        assert_eq!(mesh.vertices.len(), 24);
    }

    #[test]
    fn sync_load_failure_returns_invalid_and_evicts() {
        let manager = manager();
        let handle = manager.load_mesh_sync("/definitely/not/here.obj");
        assert_eq!(handle, MeshHandle::INVALID);

        // The claimed entry was evicted, so a retry allocates fresh state.
        let retry = manager.create_or_get_handle("/definitely/not/here.obj");
        assert_eq!(manager.ref_count(retry), Some(1));

        let event = manager.events().try_recv().expect("failure event");
        assert!(matches!(event, MeshEvent::LoadFailed { .. }));
    }

    #[test]
    fn sync_load_success_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tri.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").expect("write");

        let manager = manager();
        let first = manager.load_mesh_sync(&path);
        assert!(first.is_valid());
        let second = manager.load_mesh_sync(&path);
        assert_eq!(first, second);
        assert_eq!(manager.ref_count(first), Some(2));

        // Exactly one Loaded event despite two calls.
        assert!(matches!(
            manager.events().try_recv(),
            Ok(MeshEvent::Loaded { .. })
        ));
        assert!(manager.events().try_recv().is_err());
    }

    #[test]
    fn callback_on_unknown_handle_is_dropped() {
        let manager = manager();
        manager.register_load_callback(MeshHandle::new(7), |_| {
            panic!("must never fire");
        });
        manager.poll_completed();
    }
}
