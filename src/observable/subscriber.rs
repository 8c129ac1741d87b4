use std::rc::Rc;

use crate::arena::SourceId;
use crate::observable::BindingObserver;
use crate::splice::Splice;
use crate::value::Value;

/// Arguments delivered to a [`Subscriber`] when something it listens to changes.
#[derive(Clone, Copy)]
pub enum Change<'a> {
    /// A named property of `source` was assigned a different value.
    Property {
        /// Notifier that fired.
        source: SourceId,
        /// Property that changed.
        name: &'a str,
    },
    /// The sequence behind `source` was mutated; splices are ascending and
    /// non-overlapping in post-change coordinates.
    Splices {
        /// Notifier of the list.
        source: SourceId,
        /// Minimal edit script for the flush cycle.
        splices: &'a [Splice<Value>],
    },
    /// A binding observer re-evaluated on a scheduler flush and wants its
    /// owner to pull the fresh value.
    Binding {
        /// Observer that fired.
        observer: &'a BindingObserver,
    },
}

impl Change<'_> {
    /// Notifier that produced this change, if any.
    pub fn source(&self) -> Option<SourceId> {
        match *self {
            Change::Property { source, .. } | Change::Splices { source, .. } => Some(source),
            Change::Binding { .. } => None,
        }
    }
}

/// Anything that wants to hear about changes.
///
/// Subscribers are always held as `Rc<dyn Subscriber>`; identity inside a
/// [`SubscriberSet`] is the address of the shared allocation.
pub trait Subscriber {
    /// Called synchronously when a watched source changes.
    fn handle_change(self: Rc<Self>, change: &Change<'_>);
}

#[inline]
pub(crate) fn subscriber_addr(subscriber: &Rc<dyn Subscriber>) -> *const () {
    Rc::as_ptr(subscriber).cast::<()>()
}

enum Slots {
    Inline([Option<Rc<dyn Subscriber>>; 2]),
    Overflow(Vec<Rc<dyn Subscriber>>),
}

/// Duplicate-free set of subscribers with two inline slots.
///
/// The first two distinct subscribers live inline; the third moves everyone into
/// an overflow list, and the set never shrinks back afterwards.
pub struct SubscriberSet {
    slots: Slots,
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberSet {
    /// Create an empty set.
    pub const fn new() -> Self {
        Self {
            slots: Slots::Inline([None, None]),
        }
    }

    /// Add a subscriber. Returns false when it was already present.
    pub fn subscribe(&mut self, subscriber: Rc<dyn Subscriber>) -> bool {
        if self.contains_addr(subscriber_addr(&subscriber)) {
            return false;
        }
        match &mut self.slots {
            Slots::Inline(inline) => {
                if let Some(free) = inline.iter_mut().find(|slot| slot.is_none()) {
                    *free = Some(subscriber);
                } else {
                    cov_mark::hit!(subscriber_set_upgraded);
                    let [first, second] = std::mem::take(inline);
                    let mut list: Vec<_> = first.into_iter().chain(second).collect();
                    list.push(subscriber);
                    self.slots = Slots::Overflow(list);
                }
            }
            Slots::Overflow(list) => list.push(subscriber),
        }
        true
    }

    /// Remove a subscriber. Returns false when it was not present.
    pub fn unsubscribe(&mut self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.unsubscribe_addr(subscriber_addr(subscriber))
    }

    pub(crate) fn unsubscribe_addr(&mut self, addr: *const ()) -> bool {
        match &mut self.slots {
            Slots::Inline(inline) => {
                for slot in inline.iter_mut() {
                    if slot
                        .as_ref()
                        .is_some_and(|s| std::ptr::addr_eq(subscriber_addr(s), addr))
                    {
                        *slot = None;
                        return true;
                    }
                }
                false
            }
            Slots::Overflow(list) => {
                match list
                    .iter()
                    .position(|s| std::ptr::addr_eq(subscriber_addr(s), addr))
                {
                    Some(position) => {
                        list.remove(position);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Whether `subscriber` is in the set.
    pub fn contains(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.contains_addr(subscriber_addr(subscriber))
    }

    fn contains_addr(&self, addr: *const ()) -> bool {
        self.iter()
            .any(|s| std::ptr::addr_eq(subscriber_addr(s), addr))
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// True once the set has moved to its overflow list.
    pub fn is_overflowed(&self) -> bool {
        matches!(self.slots, Slots::Overflow(_))
    }

    fn iter(&self) -> impl Iterator<Item = &Rc<dyn Subscriber>> {
        let (inline, overflow): (&[Option<Rc<dyn Subscriber>>], &[Rc<dyn Subscriber>]) =
            match &self.slots {
                Slots::Inline(inline) => (inline, &[]),
                Slots::Overflow(list) => (&[], list),
            };
        inline.iter().flatten().chain(overflow)
    }

    /// Clone out the current subscribers in notification order.
    ///
    /// Notifying from a snapshot lets handlers subscribe or unsubscribe while
    /// the notification is in flight.
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        self.iter().cloned().collect()
    }

    /// Deliver `change` to every subscriber present when the call started.
    pub fn notify(&self, change: &Change<'_>) {
        notify_all(self.snapshot(), change);
    }
}

pub(crate) fn notify_all(subscribers: Vec<Rc<dyn Subscriber>>, change: &Change<'_>) {
    for subscriber in subscribers {
        subscriber.handle_change(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        label: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Subscriber for Recorder {
        fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
            self.log.borrow_mut().push(self.label);
        }
    }

    fn recorder(label: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Rc<dyn Subscriber> {
        Rc::new(Recorder {
            label,
            log: log.clone(),
        })
    }

    fn fire(set: &SubscriberSet) {
        set.notify(&Change::Property {
            source: crate::arena::notifier_arena_insert(),
            name: "value",
        });
    }

    #[test]
    fn duplicate_subscribe_is_a_no_op() {
        let log = Rc::default();
        let a = recorder("a", &log);
        let mut set = SubscriberSet::new();
        assert!(set.subscribe(a.clone()));
        assert!(!set.subscribe(a.clone()));
        assert_eq!(set.len(), 1);
        fire(&set);
        assert_eq!(*log.borrow(), ["a"]);
    }

    #[test]
    fn third_subscriber_upgrades_and_order_is_kept() {
        cov_mark::check!(subscriber_set_upgraded);
        let log = Rc::default();
        let (a, b, c) = (recorder("a", &log), recorder("b", &log), recorder("c", &log));
        let mut set = SubscriberSet::new();
        set.subscribe(a.clone());
        set.subscribe(b.clone());
        assert!(!set.is_overflowed());
        set.subscribe(c.clone());
        assert!(set.is_overflowed());

        fire(&set);
        assert_eq!(*log.borrow(), ["a", "b", "c"]);

        // never shrinks back
        set.unsubscribe(&b);
        set.unsubscribe(&c);
        assert!(set.is_overflowed());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn freed_inline_slot_is_reused() {
        let log = Rc::default();
        let (a, b, c) = (recorder("a", &log), recorder("b", &log), recorder("c", &log));
        let mut set = SubscriberSet::new();
        set.subscribe(a.clone());
        set.subscribe(b.clone());
        assert!(set.unsubscribe(&a));
        assert!(!set.unsubscribe(&a));
        set.subscribe(c.clone());
        assert!(!set.is_overflowed());
        fire(&set);
        assert_eq!(*log.borrow(), ["c", "b"]);
    }

    struct SelfRemoving {
        set: Rc<RefCell<SubscriberSet>>,
        me: RefCell<Option<Rc<dyn Subscriber>>>,
        calls: RefCell<usize>,
    }

    impl Subscriber for SelfRemoving {
        fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
            *self.calls.borrow_mut() += 1;
            if let Some(me) = self.me.borrow_mut().take() {
                self.set.borrow_mut().unsubscribe(&me);
            }
        }
    }

    #[test]
    fn handlers_may_unsubscribe_while_notified() {
        let set = Rc::new(RefCell::new(SubscriberSet::new()));
        let sub = Rc::new(SelfRemoving {
            set: set.clone(),
            me: RefCell::default(),
            calls: RefCell::new(0),
        });
        let as_dyn: Rc<dyn Subscriber> = sub.clone();
        *sub.me.borrow_mut() = Some(as_dyn.clone());
        set.borrow_mut().subscribe(as_dyn);

        let snapshot = set.borrow().snapshot();
        notify_all(
            snapshot,
            &Change::Property {
                source: crate::arena::notifier_arena_insert(),
                name: "x",
            },
        );
        assert_eq!(*sub.calls.borrow(), 1);
        assert!(set.borrow().is_empty());
    }
}
