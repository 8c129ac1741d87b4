use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::dom::Node;
use crate::observable::ExecutionContext;
use crate::template::Behavior;
use crate::value::Value;

/// Creates the behavior an attached directive puts on its element.
pub trait AttachedBehaviorFactory {
    /// Behavior for `target`.
    fn create_behavior(&self, target: Node) -> Box<dyn Behavior>;
}

impl<F> AttachedBehaviorFactory for F
where
    F: Fn(Node) -> Box<dyn Behavior>,
{
    fn create_behavior(&self, target: Node) -> Box<dyn Behavior> {
        self(target)
    }
}

/// Directive attaching a custom behavior to the element it is placed on.
#[derive(Clone)]
pub struct AttachedDirective {
    name: Rc<str>,
    factory: Rc<dyn AttachedBehaviorFactory>,
}

impl AttachedDirective {
    /// Wrap `factory`; `name` only shows up in diagnostics.
    pub fn new(name: &str, factory: impl AttachedBehaviorFactory + 'static) -> Self {
        Self {
            name: Rc::from(name),
            factory: Rc::new(factory),
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn create_behavior(&self, target: Node) -> Box<dyn Behavior> {
        self.factory.create_behavior(target)
    }
}

impl fmt::Debug for AttachedDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachedDirective").field(&self.name).finish()
    }
}

/// Assigns the element to property `name` of the source on bind.
pub fn reference(name: &str) -> AttachedDirective {
    let property: Rc<str> = Rc::from(name);
    AttachedDirective::new("ref", move |target: Node| -> Box<dyn Behavior> {
        Box::new(RefBehavior {
            target,
            property: property.clone(),
        })
    })
}

struct RefBehavior {
    target: Node,
    property: Rc<str>,
}

impl Behavior for RefBehavior {
    fn bind(&mut self, source: &Value, _context: &Rc<ExecutionContext>) {
        let Some(object) = source.as_object() else {
            warn!(property = &*self.property, "reference target is not an object");
            return;
        };
        // already reported through the property system's warning
        let _ = object.set(&self.property, self.target);
    }

    fn unbind(&mut self) {}
}
