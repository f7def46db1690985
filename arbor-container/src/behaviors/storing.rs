//! Thread-scoped storage for the storing behavior.
//!
//! Every calling thread gets its own memo table. A caller can take a snapshot
//! of the current thread's table, install a different one (for example one
//! per unit of work), reset it, or invalidate it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::thread_table::ThreadTable;

use crate::implementation::Instance;
use crate::key::ComponentKey;

/// Memo slot for one component.
#[derive(Clone, Default)]
pub(crate) struct Slot {
    pub(crate) instance: Option<Instance>,
    pub(crate) started: bool,
    pub(crate) disposed: bool,
}

/// One thread's memo table. Clones share the same table.
#[derive(Clone, Default)]
pub struct StoreSnapshot(Arc<Mutex<HashMap<ComponentKey, Slot>>>);

impl StoreSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of components with a slot in this table.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.0.lock().contains_key(key)
    }
}

impl fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSnapshot")
            .field("len", &self.len())
            .finish()
    }
}

enum ThreadCache {
    Active(StoreSnapshot),
    /// Passes through without memoizing until reset or replaced.
    Invalidated,
}

/// Per-thread memo tables shared by every component of one storing behavior.
///
/// A thread's table is dropped when the thread exits.
///
/// # Examples
/// ```
/// use arbor_container::behaviors::Store;
///
/// let store = Store::new();
/// let request_cache = store.reset_cache_for_thread();
/// assert_eq!(request_cache.len(), 0);
///
/// // ... serve a request ...
///
/// store.put_cache_for_thread(request_cache);
/// assert_eq!(store.cache_size(), 0);
/// ```
#[derive(Default)]
pub struct Store {
    threads: ThreadTable<ThreadCache>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// The calling thread's table, created on first use.
    ///
    /// An invalidated thread gets a detached empty table.
    pub fn cache_for_thread(&self) -> StoreSnapshot {
        let entry = self
            .threads
            .current_or_insert_with(|| ThreadCache::Active(StoreSnapshot::new()));
        match &*entry {
            ThreadCache::Active(snapshot) => snapshot.clone(),
            ThreadCache::Invalidated => StoreSnapshot::new(),
        }
    }

    /// Installs `snapshot` as the calling thread's table.
    pub fn put_cache_for_thread(&self, snapshot: StoreSnapshot) {
        trace!(entries = snapshot.len(), "Installing thread cache");
        self.threads.set_current(ThreadCache::Active(snapshot));
    }

    /// Replaces the calling thread's table with a fresh one and returns it.
    pub fn reset_cache_for_thread(&self) -> StoreSnapshot {
        let fresh = StoreSnapshot::new();
        self.threads.set_current(ThreadCache::Active(fresh.clone()));
        fresh
    }

    /// Stops memoizing on the calling thread until the next reset or put.
    pub fn invalidate_cache_for_thread(&self) {
        self.threads.set_current(ThreadCache::Invalidated);
    }

    /// Size of the calling thread's table.
    pub fn cache_size(&self) -> usize {
        match self.threads.current() {
            Some(entry) => match &*entry {
                ThreadCache::Active(snapshot) => snapshot.len(),
                ThreadCache::Invalidated => 0,
            },
            None => 0,
        }
    }

    /// Drops every thread's table.
    pub fn clear(&self) {
        self.threads.clear();
    }

    /// Number of live threads holding a table.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Runs `f` on the calling thread's slot for `key`.
    ///
    /// `None` when the thread is invalidated.
    pub(crate) fn with_slot<R>(&self, key: &ComponentKey, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        let snapshot = {
            let entry = self
                .threads
                .current_or_insert_with(|| ThreadCache::Active(StoreSnapshot::new()));
            match &*entry {
                ThreadCache::Active(snapshot) => snapshot.clone(),
                ThreadCache::Invalidated => return None,
            }
        };

        let mut table = snapshot.0.lock();
        Some(f(table.entry(key.clone()).or_default()))
    }

    /// Forgets `key` in the calling thread's table.
    pub(crate) fn remove_slot(&self, key: &ComponentKey) -> Option<Slot> {
        let snapshot = match self.threads.current() {
            Some(entry) => match &*entry {
                ThreadCache::Active(snapshot) => snapshot.clone(),
                ThreadCache::Invalidated => return None,
            },
            None => return None,
        };
        snapshot.0.lock().remove(key)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("threads", &self.thread_count())
            .finish()
    }
}
