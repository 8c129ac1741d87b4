use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::arena::SourceId;
use crate::observable::object::WeakObservable;
use crate::observable::{Change, ExecutionContext, Observable, Source, Subscriber};
use crate::scheduler::queue_update;
use crate::value::Value;

// Thread-local observer that is currently evaluating a binding.
// Reads of reactive properties report themselves to it.
thread_local! {
    static CURRENT_OBSERVER: RefCell<Option<Rc<BindingObserver>>> = const { RefCell::new(None) };
}

/// Get the observer that is currently tracking reads
pub(crate) fn current_observer() -> Option<Rc<BindingObserver>> {
    CURRENT_OBSERVER.with_borrow(Clone::clone)
}

fn set_current_observer(observer: Option<Rc<BindingObserver>>) -> Option<Rc<BindingObserver>> {
    CURRENT_OBSERVER.replace(observer)
}

/// RAII guard that restores the previous tracking observer on drop.
///
/// Restoring happens on normal return and while unwinding from a panicking
/// binding, so one failed evaluation cannot leave reads attached to the wrong
/// observer.
pub(crate) struct TrackerGuard {
    previous: Option<Rc<BindingObserver>>,
}

impl TrackerGuard {
    /// Install `observer` (or nothing) as the active tracker.
    pub(crate) fn new(observer: Option<Rc<BindingObserver>>) -> Self {
        let previous = set_current_observer(observer);
        Self { previous }
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        set_current_observer(self.previous.take());
    }
}

/// Report a reactive read to the active observer.
pub(crate) fn track_read(source: &Source, property: Option<&str>, object: Option<&Observable>) {
    if let Some(observer) = current_observer() {
        observer.watch(source.id(), property, object);
    }
}

/// Run a closure without tracking any reactive reads.
///
/// Reads inside `f` do not become dependencies of the binding that is
/// currently evaluating.
pub fn untracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = TrackerGuard::new(None);
    f()
}

type BindingFn = dyn Fn(&Value, &ExecutionContext) -> Value;

/// An expression evaluated against a source object and an execution context.
///
/// A binding is *volatile* when the set of properties it reads can change
/// between evaluations (it branches). Volatile bindings re-track their
/// dependencies on every evaluation; stable ones keep the subscriptions of the
/// first evaluation.
#[derive(Clone)]
pub struct Binding {
    eval: Rc<BindingFn>,
    volatile: bool,
}

impl Binding {
    /// A binding whose dependencies never change between evaluations.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ExecutionContext) -> Value + 'static,
    {
        Self {
            eval: Rc::new(f),
            volatile: false,
        }
    }

    /// A binding that rebuilds its dependency list on every evaluation.
    pub fn volatile<F>(f: F) -> Self
    where
        F: Fn(&Value, &ExecutionContext) -> Value + 'static,
    {
        Self {
            eval: Rc::new(f),
            volatile: true,
        }
    }

    /// A binding whose volatility is inferred from the expression's source text.
    ///
    /// This is what [`binding!`](crate::binding) expands to.
    pub fn with_source_text<F>(f: F, text: &str) -> Self
    where
        F: Fn(&Value, &ExecutionContext) -> Value + 'static,
    {
        Self {
            eval: Rc::new(f),
            volatile: is_volatile_source(text),
        }
    }

    /// A binding that always yields `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(move |_, _| value.clone())
    }

    /// Whether dependencies are rebuilt on every evaluation.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Evaluate without any tracking bookkeeping.
    pub fn evaluate(&self, source: &Value, context: &ExecutionContext) -> Value {
        (self.eval)(source, context)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("volatile", &self.volatile)
            .finish_non_exhaustive()
    }
}

/// Does an expression's text contain branching that could skip reads?
pub(crate) fn is_volatile_source(text: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "if",
        "else",
        "match",
        "then",
        "then_some",
        "and_then",
        "or_else",
        "unwrap_or_else",
        "map_or",
        "map_or_else",
    ];
    if text.contains("&&") || text.contains("||") || text.contains('?') {
        return true;
    }
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| KEYWORDS.contains(&word))
}

/// Build a [`Binding`] from a closure, inferring volatility from its body.
///
/// ```ignore
/// let name = binding!(|s, _| s.get("name"));
/// let label = binding!(|s, _| if s.get("done").is_truthy() { "done" } else { "open" });
/// assert!(!name.is_volatile());
/// assert!(label.is_volatile());
/// ```
#[macro_export]
macro_rules! binding {
    (|$source:pat_param, $context:pat_param| $body:expr) => {
        $crate::Binding::with_source_text(
            move |$source: &$crate::Value, $context: &$crate::ExecutionContext| -> $crate::Value {
                $crate::Value::from($body)
            },
            stringify!($body),
        )
    };
    (|$source:pat_param| $body:expr) => {
        $crate::binding!(|$source, _| $body)
    };
}

#[derive(Debug)]
struct DependencyRecord {
    source: SourceId,
    property: Option<Rc<str>>,
    // weak: the notifier arena holds this observer, and the object owns a slot
    object: Option<WeakObservable>,
}

struct ObserverState {
    records: Vec<DependencyRecord>,
    needs_refresh: bool,
    needs_queue: bool,
}

/// Tracks the reactive reads of one binding on behalf of one subscriber.
///
/// `observe` evaluates the binding and, when a refresh is due, records every
/// reactive read and subscribes to it. A change to any recorded dependency
/// queues one update on the scheduler; when it runs, the owning subscriber is
/// notified with [`Change::Binding`] and pulls the new value by calling
/// `observe` again.
pub struct BindingObserver {
    binding: Binding,
    subscriber: Weak<dyn Subscriber>,
    state: RefCell<ObserverState>,
}

impl BindingObserver {
    /// Create an observer that reports to `subscriber`.
    pub fn new(binding: Binding, subscriber: Weak<dyn Subscriber>) -> Rc<Self> {
        Rc::new(Self {
            binding,
            subscriber,
            state: RefCell::new(ObserverState {
                records: Vec::new(),
                needs_refresh: true,
                needs_queue: true,
            }),
        })
    }

    /// The observed binding.
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Evaluate the binding, tracking reads when a refresh is due.
    pub fn observe(self: &Rc<Self>, source: &Value, context: &ExecutionContext) -> Value {
        let refresh = {
            let mut state = self.state.borrow_mut();
            let refresh = state.needs_refresh;
            state.needs_refresh = self.binding.volatile;
            refresh
        };
        if refresh && self.has_dependencies() {
            self.disconnect_records();
        }

        let _guard = TrackerGuard::new(refresh.then(|| self.clone()));
        self.binding.evaluate(source, context)
    }

    /// Record a reactive read and subscribe to it.
    pub(crate) fn watch(
        self: &Rc<Self>,
        source: SourceId,
        property: Option<&str>,
        object: Option<&Observable>,
    ) {
        let subscriber: Rc<dyn Subscriber> = self.clone();
        source.subscribe(subscriber, property);

        let previous = {
            let mut state = self.state.borrow_mut();
            let previous = state.records.last().and_then(|record| {
                Some((record.object.as_ref()?.upgrade()?, record.property.clone()?))
            });
            state.records.push(DependencyRecord {
                source,
                property: property.map(Rc::from),
                object: object.map(Observable::downgrade),
            });
            if state.needs_refresh { None } else { previous }
        };

        // A read of `prev.name` whose value is the object now being read is a
        // property path; its shape can change, so re-track next time.
        if let Some((object, name)) = previous {
            if object.get_untracked(&name).source_id() == Some(source) {
                cov_mark::hit!(binding_chain_forces_refresh);
                self.state.borrow_mut().needs_refresh = true;
            }
        }
    }

    /// Number of recorded dependencies from the last tracked evaluation.
    pub fn dependency_count(&self) -> usize {
        self.state.borrow().records.len()
    }

    fn has_dependencies(&self) -> bool {
        !self.state.borrow().records.is_empty()
    }

    /// Unsubscribe from every recorded dependency and forget them.
    ///
    /// The next `observe` re-tracks from scratch.
    pub fn disconnect(&self) {
        self.disconnect_records();
        let mut state = self.state.borrow_mut();
        state.needs_refresh = true;
        state.needs_queue = true;
    }

    fn disconnect_records(&self) {
        let records = std::mem::take(&mut self.state.borrow_mut().records);
        let addr = std::ptr::from_ref(self).cast::<()>();
        for record in &records {
            record
                .source
                .unsubscribe_addr(addr, record.property.as_deref());
        }
        let mut state = self.state.borrow_mut();
        state.needs_queue = true;
    }

    /// Scheduler callback: re-notify the owner if we still have dependencies.
    fn call(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.records.is_empty() {
                return;
            }
            state.needs_queue = true;
        }
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.handle_change(&Change::Binding { observer: self });
        }
    }
}

impl Subscriber for BindingObserver {
    fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
        let enqueue = std::mem::replace(&mut self.state.borrow_mut().needs_queue, false);
        if enqueue {
            queue_update(move || self.call());
        }
    }
}

impl fmt::Debug for BindingObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("BindingObserver")
            .field("binding", &self.binding)
            .field("records", &state.records)
            .field("needs_refresh", &state.needs_refresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::notifier_arena_len;
    use crate::observable::ObservableType;
    use crate::scheduler::process_updates;
    use std::cell::Cell;

    #[derive(Default)]
    struct Owner {
        changes: Cell<usize>,
    }

    impl Subscriber for Owner {
        fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
            self.changes.set(self.changes.get() + 1);
        }
    }

    fn owner_and_observer(binding: Binding) -> (Rc<Owner>, Rc<BindingObserver>) {
        let owner = Rc::new(Owner::default());
        let weak: Weak<dyn Subscriber> = Rc::downgrade(&owner) as Weak<dyn Subscriber>;
        (owner, BindingObserver::new(binding, weak))
    }

    fn person() -> ObservableType {
        ObservableType::builder("Person")
            .property("first")
            .property("last")
            .property("friend")
            .build()
            .unwrap()
    }

    #[test]
    fn macro_infers_volatility() {
        let stable = crate::binding!(|s, _| s.get("a"));
        let branching = crate::binding!(|s, _| if s.get("a").is_truthy() {
            s.get("b")
        } else {
            s.get("c")
        });
        let logical = crate::binding!(|s, _| s.get("a").is_truthy() && s.get("b").is_truthy());
        assert!(!stable.is_volatile());
        assert!(branching.is_volatile());
        assert!(logical.is_volatile());
    }

    #[test]
    fn volatility_keywords_match_whole_words() {
        assert!(!is_volatile_source("s . get (\"gift\")"));
        assert!(is_volatile_source("match s { _ => 1 }"));
        assert!(is_volatile_source("a ? b : c"));
    }

    #[test]
    fn changes_are_queued_once_per_flush() {
        let ty = person();
        let object = Observable::new(&ty);
        let (owner, observer) = owner_and_observer(Binding::new(|s, _| {
            Value::from(format!("{} {}", s.get("first"), s.get("last")))
        }));
        let source = Value::from(object.clone());
        let ctx = ExecutionContext::new();
        observer.observe(&source, &ctx);
        assert_eq!(observer.dependency_count(), 2);

        object.set("first", "Ada").unwrap();
        object.set("last", "Lovelace").unwrap();
        assert_eq!(process_updates(), 1);
        assert_eq!(owner.changes.get(), 1);

        object.set("first", "Grace").unwrap();
        process_updates();
        assert_eq!(owner.changes.get(), 2);
    }

    #[test]
    fn independent_reads_keep_subscriptions_without_retracking() {
        let ty = person();
        let object = Observable::new(&ty);
        let (_owner, observer) = owner_and_observer(Binding::new(|s, _| {
            Value::from(format!("{}{}", s.get("first"), s.get("last")))
        }));
        let source = Value::from(object.clone());
        let ctx = ExecutionContext::new();
        observer.observe(&source, &ctx);
        let id = object.source().id();
        assert_eq!(id.subscriber_count(Some("first")), 1);

        // second evaluation does not track, subscriptions stay
        observer.observe(&source, &ctx);
        assert_eq!(observer.dependency_count(), 2);
        assert_eq!(id.subscriber_count(Some("first")), 1);
    }

    #[test]
    fn property_chain_is_retracked_when_intermediate_changes() {
        cov_mark::check!(binding_chain_forces_refresh);
        let ty = person();
        let root = Observable::new(&ty);
        let first_friend = Observable::new(&ty);
        let second_friend = Observable::new(&ty);
        first_friend.set("first", "Ann").unwrap();
        second_friend.set("first", "Bob").unwrap();
        root.set("friend", first_friend.clone()).unwrap();

        let (owner, observer) = owner_and_observer(Binding::new(|s, _| s.get("friend").get("first")));
        let source = Value::from(root.clone());
        let ctx = ExecutionContext::new();

        assert_eq!(observer.observe(&source, &ctx), Value::from("Ann"));
        // a chained read keeps re-tracking on every evaluation
        assert_eq!(observer.observe(&source, &ctx), Value::from("Ann"));
        assert_eq!(observer.dependency_count(), 2);

        root.set("friend", second_friend.clone()).unwrap();
        process_updates();
        assert_eq!(owner.changes.get(), 1);
        assert_eq!(observer.observe(&source, &ctx), Value::from("Bob"));

        // the old intermediate no longer drives the binding
        first_friend.set("first", "Zed").unwrap();
        process_updates();
        assert_eq!(owner.changes.get(), 1);

        second_friend.set("first", "Bea").unwrap();
        process_updates();
        assert_eq!(owner.changes.get(), 2);
    }

    #[test]
    fn disconnect_stops_notifications() {
        let ty = person();
        let object = Observable::new(&ty);
        let (owner, observer) = owner_and_observer(Binding::new(|s, _| s.get("first")));
        let source = Value::from(object.clone());
        observer.observe(&source, &ExecutionContext::new());
        observer.disconnect();
        assert_eq!(observer.dependency_count(), 0);

        object.set("first", "x").unwrap();
        process_updates();
        assert_eq!(owner.changes.get(), 0);
    }

    #[test]
    fn tracker_is_restored_after_panicking_binding() {
        let (_owner, observer) = owner_and_observer(Binding::new(|_, _| panic!("boom")));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observer.observe(&Value::Null, &ExecutionContext::new());
        }));
        assert!(result.is_err());
        assert!(current_observer().is_none());
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let ty = person();
        let object = Observable::new(&ty);
        let (_owner, observer) = owner_and_observer(Binding::new(|s, _| {
            let _ = untracked(|| s.get("last"));
            s.get("first")
        }));
        observer.observe(&Value::from(object), &ExecutionContext::new());
        assert_eq!(observer.dependency_count(), 1);
    }

    #[test]
    fn dropping_the_object_frees_its_slot_while_observed() {
        let ty = person();
        let before = notifier_arena_len();
        let object = Observable::new(&ty);
        let (_owner, observer) = owner_and_observer(Binding::new(|s, _| s.get("first")));
        observer.observe(&Value::from(object.clone()), &ExecutionContext::new());
        assert_eq!(notifier_arena_len(), before + 1);

        drop(object);
        assert_eq!(notifier_arena_len(), before);
        assert_eq!(observer.dependency_count(), 1);
    }

    #[test]
    fn thread_exits_cleanly_with_live_subscriptions() {
        let worker = std::thread::spawn(|| {
            let ty = person();
            let root = Observable::new(&ty);
            let friend = Observable::new(&ty);
            root.set("friend", friend.clone()).unwrap();
            let (_owner, observer) =
                owner_and_observer(Binding::new(|s, _| s.get("friend").get("first")));
            observer.observe(&Value::from(root.clone()), &ExecutionContext::new());
            // left queued; the scheduler drops it at thread exit
            friend.set("first", "Ann").unwrap();
            (observer.dependency_count(), root.source().id().subscriber_count(Some("friend")))
        });
        assert_eq!(worker.join().unwrap(), (2, 1));
    }
}
