//! Maps keyed by the calling thread that forget a thread when it exits.
//!
//! Each thread that gets an entry also holds an exit guard in thread-local
//! storage. When the thread ends, the guard removes the thread's entry from
//! every table still alive, so values stored for short-lived threads are
//! dropped with the thread instead of piling up.

use std::cell::RefCell;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use tracing::trace;

trait ForgetThread {
    fn forget(&self, thread: ThreadId);
}

impl<V: 'static> ForgetThread for DashMap<ThreadId, V> {
    fn forget(&self, thread: ThreadId) {
        self.remove(&thread);
    }
}

struct ExitGuard {
    thread: ThreadId,
    tables: Vec<Weak<dyn ForgetThread>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        for table in self.tables.drain(..) {
            if let Some(table) = table.upgrade() {
                table.forget(self.thread);
            }
        }
    }
}

thread_local! {
    static EXIT_GUARD: RefCell<ExitGuard> = RefCell::new(ExitGuard {
        thread: thread::current().id(),
        tables: Vec::new(),
    });
}

pub(crate) struct ThreadTable<V: 'static> {
    map: Arc<DashMap<ThreadId, V>>,
}

impl<V: 'static> ThreadTable<V> {
    pub(crate) fn new() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// The calling thread's entry, created with `init` on first use.
    pub(crate) fn current_or_insert_with(&self, init: impl FnOnce() -> V) -> RefMut<'_, ThreadId, V> {
        match self.map.entry(thread::current().id()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                let entry = entry.insert(init());
                self.watch_current_thread();
                entry
            }
        }
    }

    pub(crate) fn current(&self) -> Option<Ref<'_, ThreadId, V>> {
        self.map.get(&thread::current().id())
    }

    pub(crate) fn set_current(&self, value: V) {
        if self.map.insert(thread::current().id(), value).is_none() {
            self.watch_current_thread();
        }
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }

    /// Threads that currently have an entry.
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    fn watch_current_thread(&self) {
        let map: Arc<dyn ForgetThread> = self.map.clone();
        let watched = Arc::downgrade(&map);
        let address = Arc::as_ptr(&self.map) as *const ();

        // Fails only while the thread is already tearing down its locals.
        let _ = EXIT_GUARD.try_with(|guard| {
            let mut guard = guard.borrow_mut();
            guard.tables.retain(|table| table.strong_count() > 0);
            if !guard
                .tables
                .iter()
                .any(|table| table.as_ptr() as *const () == address)
            {
                trace!(thread = ?guard.thread, "Watching thread exit");
                guard.tables.push(watched);
            }
        });
    }
}

impl<V: 'static> Clone for ThreadTable<V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<V: 'static> Default for ThreadTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exited_threads_are_forgotten() {
        let table = Arc::new(ThreadTable::<u32>::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let table = table.clone();
                thread::spawn(move || {
                    *table.current_or_insert_with(|| 0) += i;
                    table.set_current(i);
                    assert_eq!(*table.current().unwrap(), i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 0);
    }

    #[test]
    fn live_threads_keep_their_entry() {
        let table = ThreadTable::<&str>::new();
        table.set_current("main");
        table.set_current("again");
        assert_eq!(table.len(), 1);
        assert_eq!(*table.current().unwrap(), "again");

        table.clear();
        assert!(table.current().is_none());
    }

    #[test]
    fn dropped_tables_do_not_outlive_the_guard() {
        let table = ThreadTable::<u8>::new();
        table.set_current(1);
        let weak = Arc::downgrade(&table.map);
        drop(table);
        assert!(weak.upgrade().is_none());
    }
}
