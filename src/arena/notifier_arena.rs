// Notifier arena - storage for per-source subscriber tables
//
// Every observable object, list or execution context owns at most one slot in
// this arena. The slot is allocated lazily on the first tracked read or explicit
// subscription and freed when the owning `Source` is dropped.
//
// A slot maps property names to subscriber sets (created per name on first
// subscription) and carries one extra source-level set. Source-level
// subscribers hear about every property change plus list splices.
//
// Notification always snapshots the affected sets and releases the arena
// borrow before calling out, so subscribers may re-enter the arena freely.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slab::Slab;

use crate::hash::FastHashMap;
use crate::observable::{Change, Subscriber, SubscriberSet, notify_all};
use crate::splice::Splice;
use crate::value::Value;

thread_local! {
    static NOTIFIER_ARENA: RefCell<Slab<PropertyNotifier>> = const { RefCell::new(Slab::new()) };
    static NEXT_GENERATION: Cell<u32> = const { Cell::new(0) };
}

/// Subscriber table of one source.
pub struct PropertyNotifier {
    generation: u32,
    properties: FastHashMap<Rc<str>, SubscriberSet>,
    source_level: SubscriberSet,
}

impl PropertyNotifier {
    fn set_mut(&mut self, property: Option<&str>) -> &mut SubscriberSet {
        match property {
            Some(name) => self.properties.entry(Rc::from(name)).or_default(),
            None => &mut self.source_level,
        }
    }
}

/// Identifier of a notifier slot.
///
/// Once the owning `Source` is dropped the slot is freed and every operation
/// on a stale id becomes a no-op returning `None`/`false`. The generation stamp
/// keeps a stale id from reaching a newer source that reused the slot.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SourceId {
    index: u32,
    generation: u32,
}

impl SourceId {
    /// Convert to usize for slab indexing
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Access the notifier with a closure (read-only)
    ///
    /// Returns None if the slot has been freed (stale access).
    pub fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&PropertyNotifier) -> R,
    {
        NOTIFIER_ARENA
            .try_with(|arena| {
                arena
                    .borrow()
                    .get(self.index())
                    .filter(|notifier| notifier.generation == self.generation)
                    .map(f)
            })
            .ok()
            .flatten()
    }

    fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut PropertyNotifier) -> R,
    {
        NOTIFIER_ARENA
            .try_with(|arena| {
                arena
                    .borrow_mut()
                    .get_mut(self.index())
                    .filter(|notifier| notifier.generation == self.generation)
                    .map(f)
            })
            .ok()
            .flatten()
    }

    /// Whether the owning source is still alive.
    pub fn is_alive(self) -> bool {
        self.with(|_| ()).is_some()
    }

    /// Subscribe to one property, or to the whole source when `property` is None.
    pub fn subscribe(self, subscriber: Rc<dyn Subscriber>, property: Option<&str>) -> bool {
        self.with_mut(|notifier| notifier.set_mut(property).subscribe(subscriber))
            .unwrap_or(false)
    }

    /// Undo a matching [`SourceId::subscribe`].
    pub fn unsubscribe(self, subscriber: &Rc<dyn Subscriber>, property: Option<&str>) -> bool {
        self.unsubscribe_addr(crate::observable::subscriber_addr(subscriber), property)
    }

    pub(crate) fn unsubscribe_addr(self, addr: *const (), property: Option<&str>) -> bool {
        self.with_mut(|notifier| match property {
            Some(name) => notifier
                .properties
                .get_mut(name)
                .is_some_and(|set| set.unsubscribe_addr(addr)),
            None => notifier.source_level.unsubscribe_addr(addr),
        })
        .unwrap_or(false)
    }

    /// Number of subscribers on one property (or on the source level).
    pub fn subscriber_count(self, property: Option<&str>) -> usize {
        self.with(|notifier| match property {
            Some(name) => notifier.properties.get(name).map_or(0, SubscriberSet::len),
            None => notifier.source_level.len(),
        })
        .unwrap_or(0)
    }

    /// Tell subscribers of `property`, then source-level subscribers, that it changed.
    pub fn notify_property(self, property: &str) {
        let Some(subscribers) = self.with(|notifier| {
            let mut subscribers = notifier
                .properties
                .get(property)
                .map(SubscriberSet::snapshot)
                .unwrap_or_default();
            subscribers.extend(notifier.source_level.snapshot());
            subscribers
        }) else {
            return;
        };
        notify_all(
            subscribers,
            &Change::Property {
                source: self,
                name: property,
            },
        );
    }

    /// Deliver a list edit script to source-level subscribers.
    pub fn notify_splices(self, splices: &[Splice<Value>]) {
        let Some(subscribers) = self.with(|notifier| notifier.source_level.snapshot()) else {
            return;
        };
        notify_all(
            subscribers,
            &Change::Splices {
                source: self,
                splices,
            },
        );
    }
}

/// Allocate an empty notifier and return its id
pub fn notifier_arena_insert() -> SourceId {
    let generation = NEXT_GENERATION.get();
    NEXT_GENERATION.set(generation.wrapping_add(1));
    NOTIFIER_ARENA.with_borrow_mut(|arena| {
        let entry = arena.vacant_entry();
        let key = entry.key();
        entry.insert(PropertyNotifier {
            generation,
            properties: FastHashMap::default(),
            source_level: SubscriberSet::new(),
        });
        SourceId {
            index: key as u32,
            generation,
        }
    })
}

/// Free a notifier slot
///
/// The removed table is returned so its subscribers are dropped after the arena
/// borrow ends; dropping one may free further sources. Once the thread's arena
/// is being torn down there is nothing left to free and this returns None.
pub fn notifier_arena_remove(id: SourceId) -> Option<PropertyNotifier> {
    NOTIFIER_ARENA
        .try_with(|arena| {
            let mut arena = arena.borrow_mut();
            let live = arena
                .get(id.index())
                .is_some_and(|notifier| notifier.generation == id.generation);
            live.then(|| arena.remove(id.index()))
        })
        .ok()
        .flatten()
}

/// Number of live notifier slots on this thread.
#[cfg(test)]
pub fn notifier_arena_len() -> usize {
    NOTIFIER_ARENA.with_borrow(Slab::len)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Cell<usize>);

    impl Subscriber for Counter {
        fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn stale_access_returns_none() {
        let id = notifier_arena_insert();
        drop(notifier_arena_remove(id));

        assert!(!id.is_alive());
        let reused = notifier_arena_insert();
        assert_eq!(reused.index(), id.index());
        assert!(!id.is_alive());
        let counter: Rc<dyn Subscriber> = Rc::new(Counter(Cell::new(0)));
        assert!(!id.subscribe(counter, Some("value")));
        id.notify_property("value");
        drop(notifier_arena_remove(reused));
    }

    #[test]
    fn property_and_source_level_subscribers_both_hear_property_changes() {
        let id = notifier_arena_insert();
        let by_name = Rc::new(Counter(Cell::new(0)));
        let whole = Rc::new(Counter(Cell::new(0)));
        id.subscribe(by_name.clone(), Some("a"));
        id.subscribe(whole.clone(), None);

        id.notify_property("a");
        id.notify_property("b");
        assert_eq!(by_name.0.get(), 1);
        assert_eq!(whole.0.get(), 2);

        id.notify_splices(&[]);
        assert_eq!(by_name.0.get(), 1);
        assert_eq!(whole.0.get(), 3);

        let by_name_dyn: Rc<dyn Subscriber> = by_name;
        assert!(id.unsubscribe(&by_name_dyn, Some("a")));
        assert_eq!(id.subscriber_count(Some("a")), 0);
        drop(notifier_arena_remove(id));
    }
}
