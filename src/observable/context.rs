use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dom::Event;
use crate::observable::Source;
use crate::value::Value;

thread_local! {
    static DEFAULT_CONTEXT: Rc<ExecutionContext> = ExecutionContext::new();
    static CURRENT_EVENT: RefCell<Option<Event>> = const { RefCell::new(None) };
}

/// Restores the previously dispatched event when dropped.
struct EventGuard {
    previous: Option<Event>,
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        CURRENT_EVENT.set(self.previous.take());
    }
}

/// Run `f` with `event` visible through [`ExecutionContext::event`].
pub(crate) fn with_event<R>(event: &Event, f: impl FnOnce() -> R) -> R {
    let _guard = EventGuard {
        previous: CURRENT_EVENT.replace(Some(event.clone())),
    };
    f()
}

/// Ambient information available to a binding besides its source.
///
/// Inside a repeated list every item view gets its own context carrying the
/// item's `index` and the list `length`. Both are reactive: bindings that
/// read them update when the item moves.
pub struct ExecutionContext {
    parent: Value,
    parent_context: Option<Rc<ExecutionContext>>,
    index: Cell<usize>,
    length: Cell<usize>,
    source: Source,
}

impl ExecutionContext {
    /// A root context with no parent.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            parent: Value::Null,
            parent_context: None,
            index: Cell::new(0),
            length: Cell::new(0),
            source: Source::new(),
        })
    }

    /// The shared root context used by [`ViewTemplate::render`](crate::ViewTemplate::render).
    pub fn default_context() -> Rc<Self> {
        DEFAULT_CONTEXT.with(Rc::clone)
    }

    /// A context nested under `parent_context`, whose enclosing source is `parent`.
    pub fn child(parent: Value, parent_context: &Rc<ExecutionContext>) -> Rc<Self> {
        Rc::new(Self {
            parent,
            parent_context: Some(parent_context.clone()),
            index: Cell::new(0),
            length: Cell::new(0),
            source: Source::new(),
        })
    }

    /// Source of the enclosing view (Null at the root).
    pub fn parent(&self) -> &Value {
        &self.parent
    }

    /// Context of the enclosing view.
    pub fn parent_context(&self) -> Option<&Rc<ExecutionContext>> {
        self.parent_context.as_ref()
    }

    /// Position of the current item in its list (tracked).
    pub fn index(&self) -> usize {
        self.source.track("index");
        self.index.get()
    }

    /// Length of the list the current item belongs to (tracked).
    pub fn length(&self) -> usize {
        self.source.track("length");
        self.length.get()
    }

    pub(crate) fn set_index(&self, index: usize) {
        if self.index.replace(index) != index {
            self.source.notify("index");
        }
    }

    pub(crate) fn set_length(&self, length: usize) {
        if self.length.replace(length) != length {
            self.source.notify("length");
        }
    }

    /// Index is even.
    pub fn is_even(&self) -> bool {
        self.index() % 2 == 0
    }

    /// Index is odd.
    pub fn is_odd(&self) -> bool {
        self.index() % 2 != 0
    }

    /// First item of the list.
    pub fn is_first(&self) -> bool {
        self.index() == 0
    }

    /// Last item of the list.
    pub fn is_last(&self) -> bool {
        self.index() + 1 == self.length()
    }

    /// Neither first nor last.
    pub fn is_in_middle(&self) -> bool {
        !self.is_first() && !self.is_last()
    }

    /// The event being dispatched to an event binding, if any.
    pub fn event(&self) -> Option<Event> {
        CURRENT_EVENT.with_borrow(Clone::clone)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("index", &self.index.get())
            .field("length", &self.length.get())
            .field("has_parent_context", &self.parent_context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_helpers() {
        let ctx = ExecutionContext::new();
        ctx.set_length(3);
        assert!(ctx.is_first() && ctx.is_even() && !ctx.is_last());
        ctx.set_index(1);
        assert!(ctx.is_in_middle() && ctx.is_odd());
        ctx.set_index(2);
        assert!(ctx.is_last());
    }

    #[test]
    fn child_links_to_parent() {
        let root = ExecutionContext::new();
        let child = ExecutionContext::child(Value::from("outer"), &root);
        assert_eq!(child.parent(), &Value::from("outer"));
        assert!(Rc::ptr_eq(child.parent_context().unwrap(), &root));
    }

    #[test]
    fn event_is_visible_only_during_dispatch() {
        let ctx = ExecutionContext::new();
        let event = Event::new("click");
        let seen = with_event(&event, || ctx.event().map(|e| e.kind().to_owned()));
        assert_eq!(seen.as_deref(), Some("click"));
        assert!(ctx.event().is_none());
    }
}
