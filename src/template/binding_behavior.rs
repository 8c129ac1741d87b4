use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dom::{Event, ListenerId, Node};
use crate::hash::FastHashMap;
use crate::observable::{
    Binding, BindingObserver, Change, ExecutionContext, Subscriber, untracked, with_event,
};
use crate::policy;
use crate::template::{Aspect, Behavior, View, ViewTemplate};
use crate::value::Value;

/// Behavior for a binding directive at `target`.
pub(crate) fn create_binding_behavior(
    binding: &Binding,
    aspect: &Aspect,
    target: Node,
) -> Box<dyn Behavior> {
    match aspect {
        Aspect::Event(kind) => Box::new(EventBehavior::new(binding.clone(), kind.clone(), target)),
        aspect => Box::new(BindingBehavior::new(binding.clone(), aspect.clone(), target)),
    }
}

type Bound = Option<(Value, Rc<ExecutionContext>)>;

/// A nested view rendered by a content binding.
struct Composed {
    view: View,
    template: ViewTemplate,
    /// Inserted in front of the target and bound.
    is_composed: bool,
    /// Unbound by the owner's unbind; the next update only rebinds it.
    needs_bind_only: bool,
}

#[derive(Default)]
struct ClassState {
    versions: FastHashMap<String, u64>,
    version: u64,
}

struct BindingCore {
    target: Node,
    aspect: Aspect,
    observer: Rc<BindingObserver>,
    bound: RefCell<Bound>,
    classes: RefCell<ClassState>,
    content: RefCell<Option<Composed>>,
}

/// Reflects a binding's value onto one node.
pub(crate) struct BindingBehavior {
    core: Rc<BindingCore>,
}

impl BindingBehavior {
    pub(crate) fn new(binding: Binding, aspect: Aspect, target: Node) -> Self {
        let core = Rc::new_cyclic(|core: &Weak<BindingCore>| {
            let subscriber: Weak<dyn Subscriber> = core.clone();
            BindingCore {
                target,
                aspect,
                observer: BindingObserver::new(binding, subscriber),
                bound: RefCell::new(None),
                classes: RefCell::default(),
                content: RefCell::new(None),
            }
        });
        Self { core }
    }
}

impl Behavior for BindingBehavior {
    fn bind(&mut self, source: &Value, context: &Rc<ExecutionContext>) {
        *self.core.bound.borrow_mut() = Some((source.clone(), context.clone()));
        self.core.refresh();
    }

    fn unbind(&mut self) {
        self.core.bound.borrow_mut().take();
        self.core.observer.disconnect();
        if let Some(composed) = self.core.content.borrow_mut().as_mut() {
            if composed.is_composed {
                composed.view.unbind();
                composed.needs_bind_only = true;
            }
        }
    }
}

impl Drop for BindingBehavior {
    fn drop(&mut self) {
        self.core.observer.disconnect();
    }
}

impl Subscriber for BindingCore {
    fn handle_change(self: Rc<Self>, change: &Change<'_>) {
        if let Change::Binding { .. } = change {
            self.refresh();
        }
    }
}

impl BindingCore {
    /// Evaluate the binding against the bound source and write the result.
    fn refresh(&self) {
        let Some((source, context)) = self.bound.borrow().clone() else {
            return;
        };
        let value = self.observer.observe(&source, &context);
        match &self.aspect {
            Aspect::Content => self.update_content(value, &source, &context),
            Aspect::Attribute(name) => {
                if value.is_null() {
                    self.target.remove_attribute(name);
                } else {
                    self.target.set_attribute(name, &value.to_string());
                }
            }
            Aspect::BooleanAttribute(name) => {
                self.target.toggle_attribute(name, value.is_truthy());
            }
            Aspect::Property(name) => self.target.set_property(name, value),
            Aspect::InnerHtml => {
                let html = policy::create_html(&value.to_string());
                self.target.set_property("innerHTML", html);
            }
            Aspect::ClassList => self.update_classes(&value),
            // event bindings never reach a BindingCore
            Aspect::Event(_) => {}
        }
    }

    fn update_content(&self, value: Value, source: &Value, context: &Rc<ExecutionContext>) {
        // taken out so nested binds never see this cell borrowed
        let mut composed = self.content.borrow_mut().take();
        match value {
            Value::Template(template) => {
                self.target.set_text_content("");
                if composed
                    .as_ref()
                    .is_some_and(|c| !c.template.ptr_eq(&template))
                {
                    if let Some(old) = composed.take() {
                        old.view.dispose();
                    }
                }
                let composed = composed.get_or_insert_with(|| Composed {
                    view: template.create(None),
                    template,
                    is_composed: false,
                    needs_bind_only: false,
                });
                if !composed.is_composed {
                    composed.is_composed = true;
                    composed.view.bind(source, context);
                    composed.view.insert_before(self.target);
                } else if composed.needs_bind_only {
                    composed.needs_bind_only = false;
                    composed.view.bind(source, context);
                }
            }
            other => {
                if let Some(composed) = composed.as_mut() {
                    if composed.is_composed {
                        composed.is_composed = false;
                        composed.view.remove();
                        if composed.needs_bind_only {
                            composed.needs_bind_only = false;
                        } else {
                            composed.view.unbind();
                        }
                    }
                }
                self.target.set_text_content(&other.to_string());
            }
        }
        *self.content.borrow_mut() = composed;
    }

    /// Add the names in `value` at the current version, then drop names
    /// still stamped with the previous one.
    fn update_classes(&self, value: &Value) {
        let mut state = self.classes.borrow_mut();
        let version = state.version;
        if !value.is_null() {
            for name in value.to_string().split_whitespace() {
                state.versions.insert(name.to_owned(), version);
                self.target.add_class(name);
            }
        }
        state.version = version + 1;
        if version == 0 {
            return;
        }
        let stale = version - 1;
        for (name, _) in state.versions.iter().filter(|(_, v)| **v == stale) {
            self.target.remove_class(name);
        }
    }
}

struct EventCore {
    target: Node,
    kind: Rc<str>,
    binding: Binding,
    bound: RefCell<Bound>,
    listener: Cell<Option<ListenerId>>,
}

/// Calls a binding when its event reaches the target.
///
/// The default action is prevented unless the binding returns `true`.
pub(crate) struct EventBehavior {
    core: Rc<EventCore>,
}

impl EventBehavior {
    pub(crate) fn new(binding: Binding, kind: Rc<str>, target: Node) -> Self {
        Self {
            core: Rc::new(EventCore {
                target,
                kind,
                binding,
                bound: RefCell::new(None),
                listener: Cell::new(None),
            }),
        }
    }
}

impl EventCore {
    fn handle_event(&self, event: &Event) {
        let Some((source, context)) = self.bound.borrow().clone() else {
            return;
        };
        let result = with_event(event, || untracked(|| self.binding.evaluate(&source, &context)));
        if result != Value::Bool(true) {
            event.prevent_default();
        }
    }
}

impl Behavior for EventBehavior {
    fn bind(&mut self, source: &Value, context: &Rc<ExecutionContext>) {
        *self.core.bound.borrow_mut() = Some((source.clone(), context.clone()));
        if self.core.listener.get().is_none() {
            let core = Rc::downgrade(&self.core);
            let id = self.core.target.add_event_listener(&self.core.kind, move |event| {
                if let Some(core) = core.upgrade() {
                    core.handle_event(event);
                }
            });
            self.core.listener.set(Some(id));
        }
    }

    fn unbind(&mut self) {
        self.core.bound.borrow_mut().take();
        if let Some(id) = self.core.listener.take() {
            self.core.target.remove_event_listener(id);
        }
    }
}
