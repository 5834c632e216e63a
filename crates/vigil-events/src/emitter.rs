use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, error, warn};

use crate::types::{Event, Listener, ListenerId, Registration};

/// Warn once more than ten listeners share an event kind.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Typed publish/subscribe registry.
///
/// Listeners are stored per event kind in registration order. `emit` takes a
/// snapshot of the matching listeners and calls them with no lock held, so a
/// listener may freely subscribe, unsubscribe or emit again.
pub struct EventEmitter<E: Event> {
    listeners: RwLock<HashMap<E::Kind, Vec<Registration<E>>>>,
    next_id: AtomicU64,
    /// 0 disables the leak warning.
    max_listeners: AtomicUsize,
    /// Kinds we have already warned about, so the log isn't flooded.
    warned: Mutex<HashSet<E::Kind>>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    pub fn with_max_listeners(max: usize) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_listeners: AtomicUsize::new(max),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe `listener` to every future `kind` event.
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(listener), false)
    }

    /// Alias of [`on`](Self::on).
    pub fn add_listener<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on(kind, listener)
    }

    /// Subscribe `listener` to the next `kind` event only.
    pub fn once<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(listener), true)
    }

    /// Remove one listener. Returns `false` if the id is not registered for `kind`.
    pub fn remove_listener(&self, kind: E::Kind, id: ListenerId) -> bool {
        let mut map = self.listeners.write().expect("listener registry poisoned");
        let Some(regs) = map.get_mut(&kind) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != id);
        let removed = regs.len() < before;
        if regs.is_empty() {
            map.remove(&kind);
        }
        if removed {
            debug!(?kind, %id, "listener removed");
        }
        removed
    }

    /// Remove every listener for `kind`, or for all kinds when `None`.
    pub fn remove_all_listeners(&self, kind: Option<E::Kind>) {
        let mut map = self.listeners.write().expect("listener registry poisoned");
        match kind {
            Some(kind) => {
                map.remove(&kind);
            }
            None => map.clear(),
        }
    }

    pub fn set_max_listeners(&self, max: usize) {
        self.max_listeners.store(max, Ordering::Relaxed);
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners.load(Ordering::Relaxed)
    }

    /// Callbacks currently registered for `kind`, in call order.
    pub fn listeners(&self, kind: E::Kind) -> Vec<Listener<E>> {
        let map = self.listeners.read().expect("listener registry poisoned");
        map.get(&kind)
            .map(|regs| regs.iter().map(|r| Arc::clone(&r.listener)).collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        let map = self.listeners.read().expect("listener registry poisoned");
        map.get(&kind).map_or(0, Vec::len)
    }

    /// Call every listener registered for `event.kind()`.
    ///
    /// Returns `true` if at least one listener was called. A panicking
    /// listener is logged and skipped; the remaining listeners still run.
    pub fn emit(&self, event: &E) -> bool {
        let kind = event.kind();
        let snapshot: Vec<Registration<E>> = {
            let mut map = self.listeners.write().expect("listener registry poisoned");
            let Some(regs) = map.get_mut(&kind) else {
                return false;
            };
            let snapshot = regs.clone();
            // One-shot listeners leave the registry before they run.
            regs.retain(|r| !r.once);
            if regs.is_empty() {
                map.remove(&kind);
            }
            snapshot
        };

        if snapshot.is_empty() {
            return false;
        }

        for reg in &snapshot {
            let listener = Arc::clone(&reg.listener);
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(?kind, id = %reg.id, "event listener panicked");
            }
        }
        true
    }

    fn register(&self, kind: E::Kind, listener: Listener<E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut map = self.listeners.write().expect("listener registry poisoned");
            let regs = map.entry(kind).or_default();
            regs.push(Registration { id, once, listener });
            regs.len()
        };
        debug!(?kind, %id, once, "listener registered");

        let max = self.max_listeners();
        if max > 0 && count > max {
            let mut warned = self.warned.lock().expect("listener registry poisoned");
            if warned.insert(kind) {
                warn!(
                    ?kind,
                    count,
                    max,
                    "possible listener leak: more listeners than max_listeners"
                );
            }
        }
        id
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.listeners.read().expect("listener registry poisoned");
        let counts: HashMap<_, _> = map.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .field("max_listeners", &self.max_listeners())
            .finish()
    }
}
