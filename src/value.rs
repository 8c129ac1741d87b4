//! Dynamic values flowing through bindings, properties and lists.

use std::fmt;
use std::rc::Rc;

use crate::arena::SourceId;
use crate::dom::Node;
use crate::observable::{Observable, ObservableList};
use crate::template::ViewTemplate;

/// A value produced by a binding or stored in a reactive property.
///
/// Primitives compare by value; objects, lists, templates and nodes compare by
/// identity, which is what property writes use to decide whether to notify.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value. Renders as empty text and removes attributes.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number. Integral values render without a fractional part.
    Number(f64),
    /// Shared string.
    Str(Rc<str>),
    /// Reactive object.
    Object(Observable),
    /// Reactive sequence.
    List(ObservableList),
    /// Template; content bindings compose it as a nested view.
    Template(ViewTemplate),
    /// Node of the render tree.
    Node(Node),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by conditionals and boolean attributes.
    ///
    /// Null, false, zero, NaN and the empty string are falsy; everything else
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::List(_) | Value::Template(_) | Value::Node(_) => true,
        }
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric payload.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the object payload.
    pub fn as_object(&self) -> Option<&Observable> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrow the list payload.
    pub fn as_list(&self) -> Option<&ObservableList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Borrow the template payload.
    pub fn as_template(&self) -> Option<&ViewTemplate> {
        match self {
            Value::Template(template) => Some(template),
            _ => None,
        }
    }

    /// The node payload.
    pub fn as_node(&self) -> Option<Node> {
        match self {
            Value::Node(node) => Some(*node),
            _ => None,
        }
    }

    /// Tracked read of `property` on an object value; Null for anything else.
    ///
    /// Chains such as `source.get("a").get("b")` are what the binding observer
    /// recognizes as property paths.
    pub fn get(&self, property: &str) -> Value {
        match self {
            Value::Object(object) => object.get(property),
            _ => Value::Null,
        }
    }

    /// Notifier of an object or list value, if it has been allocated.
    pub(crate) fn source_id(&self) -> Option<SourceId> {
        match self {
            Value::Object(object) => object.source().existing_id(),
            Value::List(list) => list.source().existing_id(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Template(a), Value::Template(b)) => a.ptr_eq(b),
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Object(object) => write!(f, "[object {}]", object.observable_type().name()),
            Value::List(list) => {
                for (i, item) in list.to_vec_untracked().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Template(_) => f.write_str("[template]"),
            Value::Node(node) => f.write_str(&node.outer_html()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Value::List(list) => f.debug_tuple("List").field(list).finish(),
            Value::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Value::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl From<Observable> for Value {
    fn from(value: Observable) -> Self {
        Value::Object(value)
    }
}

impl From<ObservableList> for Value {
    fn from(value: ObservableList) -> Self {
        Value::List(value)
    }
}

impl From<ViewTemplate> for Value {
    fn from(value: ViewTemplate) -> Self {
        Value::Template(value)
    }
}

impl From<Node> for Value {
    fn from(value: Node) -> Self {
        Value::Node(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
