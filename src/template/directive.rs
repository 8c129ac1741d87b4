use std::fmt;
use std::rc::Rc;

use crate::observable::{Binding, ExecutionContext};
use crate::template::{AttachedDirective, RepeatDirective, ViewTemplate};
use crate::value::Value;

/// What a template placeholder stands for.
///
/// Placeholders index into the directive list supplied alongside the markup.
#[derive(Clone, Debug)]
pub enum Directive {
    /// An expression bound to text content or to an attribute-like target.
    Binding(Binding),
    /// List rendering at a structural marker.
    Repeat(RepeatDirective),
    /// A user behavior attached to an element.
    Attached(AttachedDirective),
}

impl From<Binding> for Directive {
    fn from(binding: Binding) -> Self {
        Directive::Binding(binding)
    }
}

impl From<RepeatDirective> for Directive {
    fn from(directive: RepeatDirective) -> Self {
        Directive::Repeat(directive)
    }
}

impl From<AttachedDirective> for Directive {
    fn from(directive: AttachedDirective) -> Self {
        Directive::Attached(directive)
    }
}

/// How a binding writes to its target node, chosen from the attribute name.
#[derive(Clone, PartialEq, Eq)]
pub enum Aspect {
    /// Text content; template values compose nested views.
    Content,
    /// Plain attribute: set when non-null, removed when null.
    Attribute(Rc<str>),
    /// `?name`: present (empty) when truthy.
    BooleanAttribute(Rc<str>),
    /// `:name`: direct property assignment.
    Property(Rc<str>),
    /// `class` or `:classList`: whitespace-separated names merged into the
    /// class list.
    ClassList,
    /// `:innerHTML`: the string goes through the HTML policy first.
    InnerHtml,
    /// `@name`: event listener.
    Event(Rc<str>),
}

impl Aspect {
    /// Aspect for a binding placed in attribute `name`.
    pub fn from_attribute(name: &str) -> Self {
        match name.split_at_checked(1) {
            Some((":", "classList")) => Aspect::ClassList,
            Some((":", "innerHTML")) => Aspect::InnerHtml,
            Some((":", property)) => Aspect::Property(Rc::from(property)),
            Some(("?", attribute)) => Aspect::BooleanAttribute(Rc::from(attribute)),
            Some(("@", event)) => Aspect::Event(Rc::from(event)),
            _ if name == "class" => Aspect::ClassList,
            _ => Aspect::Attribute(Rc::from(name)),
        }
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Content => f.write_str("Content"),
            Aspect::Attribute(name) => write!(f, "Attribute({name})"),
            Aspect::BooleanAttribute(name) => write!(f, "BooleanAttribute(?{name})"),
            Aspect::Property(name) => write!(f, "Property(:{name})"),
            Aspect::ClassList => f.write_str("ClassList"),
            Aspect::InnerHtml => f.write_str("InnerHtml"),
            Aspect::Event(name) => write!(f, "Event(@{name})"),
        }
    }
}

/// Content that renders `template` while `condition` is truthy and nothing
/// otherwise.
pub fn when(condition: Binding, template: ViewTemplate) -> Binding {
    let volatile = condition.is_volatile();
    let select = move |source: &Value, context: &ExecutionContext| {
        if condition.evaluate(source, context).is_truthy() {
            Value::Template(template.clone())
        } else {
            Value::Null
        }
    };
    if volatile {
        Binding::volatile(select)
    } else {
        Binding::new(select)
    }
}
