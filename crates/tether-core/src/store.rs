//! Snapshot store
//!
//! Nothing in the core mutates a snapshot in place: every transition
//! produces a new value. `Store` is the one owned location a connection's
//! or channel's *current* value lives in, with an explicit publish step.
//! Trigger closures registered with the transport each hold a cheap clone
//! of the store and read/publish successive snapshots through it.
//!
//! Single-threaded by design: the core is driven by an external event loop
//! delivering one signal at a time, so the store is `Rc`/`RefCell` and
//! deliberately not `Send`. No borrow is ever held across a user callback.

use std::cell::RefCell;
use std::rc::Rc;

/// Owned holder of the current snapshot for one connection or channel
pub struct Store<T> {
    current: Rc<RefCell<T>>,
}

impl<T: Clone> Store<T> {
    /// Create a store holding the initial snapshot.
    pub fn new(initial: T) -> Self {
        Self {
            current: Rc::new(RefCell::new(initial)),
        }
    }

    /// A clone of the current snapshot.
    ///
    /// Hands out a value, never a borrow, so user callbacks are free to
    /// read while a transition settles.
    pub fn snapshot(&self) -> T {
        self.current.borrow().clone()
    }

    /// Replace the current snapshot.
    pub fn publish(&self, next: T) {
        *self.current.borrow_mut() = next;
    }

    /// Functional update: replace the current snapshot with `f(current)`.
    pub fn update(&self, f: impl FnOnce(T) -> T) {
        let next = f(self.snapshot());
        self.publish(next);
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            current: Rc::clone(&self.current),
        }
    }
}
