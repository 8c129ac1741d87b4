use std::cell::Cell;
use std::rc::Rc;

use crate::arena::{SourceId, notifier_arena_insert, notifier_arena_remove};
use crate::observable::Subscriber;
use crate::observable::binding::track_read;

/// Change-notification handle owned by one reactive object.
///
/// A `Source` holds no data; the owner keeps its values and calls
/// [`Source::track`] on reads and [`Source::notify`] on writes. The notifier
/// slot behind it is only allocated once somebody tracks or subscribes, so
/// objects nobody observes never touch the arena.
///
/// # Usage
/// ```ignore
/// struct Counter {
///     count: Cell<i64>,
///     source: Source,
/// }
///
/// impl Counter {
///     fn get(&self) -> i64 {
///         self.source.track("count");
///         self.count.get()
///     }
///
///     fn set(&self, value: i64) {
///         if self.count.replace(value) != value {
///             self.source.notify("count");
///         }
///     }
/// }
/// ```
pub struct Source {
    id: Cell<Option<SourceId>>,
}

impl Source {
    /// Create a handle with no notifier allocated yet.
    pub const fn new() -> Self {
        Self {
            id: Cell::new(None),
        }
    }

    /// The notifier id, allocating the slot on first use.
    pub fn id(&self) -> SourceId {
        match self.id.get() {
            Some(id) => id,
            None => {
                let id = notifier_arena_insert();
                self.id.set(Some(id));
                id
            }
        }
    }

    /// The notifier id if one was ever allocated.
    pub fn existing_id(&self) -> Option<SourceId> {
        self.id.get()
    }

    /// Record a read of `property` with the active binding observer, if any.
    pub fn track(&self, property: &str) {
        track_read(self, Some(property), None);
    }

    /// Record a read of the source as a whole (used by sequences).
    pub fn track_all(&self) {
        track_read(self, None, None);
    }

    /// Tell everyone watching `property` that it changed.
    ///
    /// Nothing happens when the notifier was never allocated: nobody can be
    /// listening yet.
    pub fn notify(&self, property: &str) {
        if let Some(id) = self.existing_id() {
            id.notify_property(property);
        }
    }

    /// Subscribe to one property, or to the whole source when `property` is None.
    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber>, property: Option<&str>) -> bool {
        self.id().subscribe(subscriber, property)
    }

    /// Undo a matching [`Source::subscribe`].
    pub fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>, property: Option<&str>) -> bool {
        self.existing_id()
            .is_some_and(|id| id.unsubscribe(subscriber, property))
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            // subscribers are released outside the arena borrow
            drop(notifier_arena_remove(id));
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Source").field(&self.id.get()).finish()
    }
}

// NOTE: Source intentionally does NOT implement Clone. Two handles freeing the
// same slot would let the second drop hit whatever source reused it.
