//! Multi-subscriber event fan-out.
//!
//! `invoke` snapshots the subscriber list under the registry lock and calls
//! the snapshot after releasing it, so a callback may register or unregister
//! callbacks (including itself) without deadlocking. Each entry carries its
//! own re-entrant gate: a call holds the gate, and unregistering clears the
//! entry's liveness flag under the same gate. Once `unregister` (or the
//! handle's drop) returns, that callback can no longer be called from any
//! in-flight snapshot.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

struct Entry<T> {
    id: u64,
    callback: Box<dyn Fn(&T) + Send + Sync>,
    live: ReentrantMutex<Cell<bool>>,
}

impl<T> Entry<T> {
    fn call(&self, args: &T) {
        let live = self.live.lock();
        if live.get() {
            (self.callback)(args);
        }
    }

    fn retire(&self) {
        self.live.lock().set(false);
    }
}

struct RegistryInner<T> {
    entries: Mutex<Vec<Arc<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T> RegistryInner<T> {
    fn remove(&self, id: u64) -> Option<Arc<Entry<T>>> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(index))
    }
}

/// Thread-safe list of subscribers for events of type `T`.
///
/// Cloning yields another handle onto the same subscriber list.
pub struct CallbackRegistry<T: 'static> {
    inner: Arc<RegistryInner<T>>,
}

impl<T: 'static> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe `callback`. It stays registered until the returned handle is
    /// dropped or unregistered.
    #[must_use = "dropping the handle unregisters the callback"]
    pub fn register<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            id,
            callback: Box::new(callback),
            live: ReentrantMutex::new(Cell::new(true)),
        });
        self.inner.entries.lock().push(Arc::clone(&entry));

        let registry: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        CallbackHandle {
            id,
            unregister: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(id);
                }
                entry.retire();
            })),
        }
    }

    /// Call every current subscriber with `args`.
    pub fn invoke(&self, args: &T) {
        let snapshot: Vec<Arc<Entry<T>>> = self.inner.entries.lock().clone();
        for entry in snapshot {
            entry.call(args);
        }
    }

    /// Drop every subscriber. Outstanding handles become no-ops.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.entries.lock());
        for entry in removed {
            entry.retire();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for CallbackRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry").field("len", &self.len()).finish()
    }
}

/// Subscription handle returned by [`CallbackRegistry::register`].
pub struct CallbackHandle {
    id: u64,
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback now. Later calls (and the drop) do nothing.
    pub fn unregister(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }

    pub fn is_registered(&self) -> bool {
        self.unregister.is_some()
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn every_subscriber_is_called() {
        let registry = CallbackRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let total = Arc::clone(&total);
                registry.register(move |v: &u32| {
                    total.fetch_add(*v as usize, Ordering::SeqCst);
                })
            })
            .collect();

        registry.invoke(&5);
        assert_eq!(total.load(Ordering::SeqCst), 15);
        assert_eq!(registry.len(), 3);
        drop(handles);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_handle_is_never_called_again() {
        let registry = CallbackRegistry::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let handle = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.invoke(&());
        drop(handle);
        registry.invoke(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = CallbackRegistry::<()>::new();
        let mut handle = registry.register(|_| {});
        let _other = registry.register(|_| {});

        handle.unregister();
        handle.unregister();
        assert!(!handle.is_registered());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let registry = CallbackRegistry::<()>::new();
        let handle = registry.register(|_| {});
        drop(registry);
        drop(handle);
    }

    #[test]
    fn clear_retires_outstanding_handles() {
        let registry = CallbackRegistry::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let handle = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.clear();
        registry.invoke(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(handle);
    }

    #[test]
    fn callback_may_register_during_invoke() {
        let registry = CallbackRegistry::<()>::new();
        let spawned = Arc::new(Mutex::new(Vec::new()));

        let r = registry.clone();
        let s = Arc::clone(&spawned);
        let _handle = registry.register(move |_| {
            s.lock().push(r.register(|_| {}));
        });

        registry.invoke(&());
        assert_eq!(registry.len(), 2);
        assert_eq!(spawned.lock().len(), 1);
    }

    #[test]
    fn callback_may_unregister_itself() {
        let registry = CallbackRegistry::<()>::new();
        let slot: Arc<Mutex<Option<CallbackHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&slot);
        let c = Arc::clone(&calls);
        let handle = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            let taken = s.lock().take();
            drop(taken);
        });
        *slot.lock() = Some(handle);

        registry.invoke(&());
        registry.invoke(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn drop_during_concurrent_invoke_stops_calls() {
        let registry = CallbackRegistry::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let c = Arc::clone(&calls);
        let handle = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_micros(50));
        });
        let _busy = registry.register(|_| thread::sleep(Duration::from_micros(50)));

        let invoker = {
            let registry = registry.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    registry.invoke(&());
                }
            })
        };

        while calls.load(Ordering::SeqCst) < 10 {
            thread::yield_now();
        }
        drop(handle);
        let after_drop = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        invoker.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }
}
