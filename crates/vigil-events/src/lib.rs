//! `vigil-events`: typed publish/subscribe emitter.
//!
//! Events are plain values implementing [`Event`]; their `Kind` is a closed
//! enum, so every subscription is checked at compile time.
//!
//! ```rust
//! use vigil_events::{Event, EventEmitter};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Kind { Tick }
//!
//! #[derive(Clone)]
//! struct Tick(u64);
//!
//! impl Event for Tick {
//!     type Kind = Kind;
//!     fn kind(&self) -> Kind { Kind::Tick }
//! }
//!
//! let emitter: EventEmitter<Tick> = EventEmitter::new();
//! emitter.on(Kind::Tick, |t: &Tick| println!("tick {}", t.0));
//! assert!(emitter.emit(&Tick(1)));
//! ```

pub mod emitter;
pub mod types;

pub use emitter::{EventEmitter, DEFAULT_MAX_LISTENERS};
pub use types::{Event, Listener, ListenerId};
