use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A value that can be published through an [`EventEmitter`](crate::EventEmitter).
///
/// `Kind` is the closed set of event names listeners subscribe to. Using an
/// enum instead of string keys means a typo in a subscription is a compile
/// error rather than a listener that silently never fires.
pub trait Event: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Listener callback. Receives the emitted event by reference.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by `on`/`once`, used for removal.
///
/// Closures have no identity in Rust, so removal goes through this id rather
/// than by passing the same function back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A registered listener binding an id, a one-shot flag, and the callback.
pub(crate) struct Registration<E> {
    pub id: ListenerId,
    /// Removed from the registry before its first (and only) call.
    pub once: bool,
    /// Wrapped in Arc so emit can snapshot without holding the lock.
    pub listener: Listener<E>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            once: self.once,
            listener: Arc::clone(&self.listener),
        }
    }
}
