use std::fmt;
use std::rc::Rc;

use crate::dom::Node;
use crate::observable::ExecutionContext;
use crate::value::Value;

/// Runtime logic bound to one structural position of a view.
///
/// A behavior is created against its target node when the view is created,
/// then bound to the view's source and unbound again any number of times.
pub trait Behavior {
    /// Start reflecting `source` onto the target.
    fn bind(&mut self, source: &Value, context: &Rc<ExecutionContext>);

    /// Stop observing; the target keeps its last rendered state.
    fn unbind(&mut self);
}

/// One instance of a compiled template.
///
/// A view owns the contiguous run of nodes cloned from its template, from
/// `first_node` to `last_node`, and the behaviors attached to them. While not
/// inserted anywhere those nodes live in a private holder fragment.
///
/// Removal is reversible. Disposal consumes the view. Dropping a view unbinds
/// its behaviors and frees the holder fragment, but leaves inserted nodes in
/// place; use [`View::dispose`] to take them out of the tree.
pub struct View {
    fragment: Node,
    first: Node,
    last: Node,
    behaviors: Vec<Box<dyn Behavior>>,
    source: Option<Value>,
    context: Option<Rc<ExecutionContext>>,
}

impl View {
    /// A view over the children of `fragment`.
    ///
    /// The fragment must have at least one child.
    pub(crate) fn new(fragment: Node, behaviors: Vec<Box<dyn Behavior>>) -> Self {
        let (first, last) = match (fragment.first_child(), fragment.last_child()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                let anchor = Node::comment("");
                fragment.append_child(anchor);
                (anchor, anchor)
            }
        };
        Self {
            fragment,
            first,
            last,
            behaviors,
            source: None,
            context: None,
        }
    }

    /// First node of the view.
    pub fn first_node(&self) -> Node {
        self.first
    }

    /// Last node of the view.
    pub fn last_node(&self) -> Node {
        self.last
    }

    /// Nodes of the view in order.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = vec![self.first];
        let mut current = self.first;
        while current != self.last {
            match current.next_sibling() {
                Some(next) => {
                    nodes.push(next);
                    current = next;
                }
                None => break,
            }
        }
        nodes
    }

    /// Currently bound source.
    pub fn source(&self) -> Option<&Value> {
        self.source.as_ref()
    }

    /// Context the view was bound with.
    pub fn context(&self) -> Option<&Rc<ExecutionContext>> {
        self.context.as_ref()
    }

    /// Whether the view is bound.
    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    /// Number of behaviors.
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    /// Bind every behavior to `source`.
    ///
    /// Binding the source the view is already bound to does nothing.
    /// Otherwise each behavior is unbound from the old source, then bound to
    /// the new one, in order.
    pub fn bind(&mut self, source: &Value, context: &Rc<ExecutionContext>) {
        if self.source.as_ref() == Some(source) {
            return;
        }
        let rebinding = self.source.is_some();
        self.source = Some(source.clone());
        self.context = Some(context.clone());
        for behavior in &mut self.behaviors {
            if rebinding {
                behavior.unbind();
            }
            behavior.bind(source, context);
        }
    }

    /// Unbind every behavior. Does nothing when unbound.
    pub fn unbind(&mut self) {
        if self.source.take().is_none() {
            return;
        }
        for behavior in &mut self.behaviors {
            behavior.unbind();
        }
    }

    /// Move the view's nodes in front of `reference`.
    pub fn insert_before(&self, reference: Node) {
        let Some(parent) = reference.parent() else {
            return;
        };
        if self.fragment.has_children() {
            parent.insert_before(self.fragment, Some(reference));
            return;
        }
        if reference.previous_sibling() == Some(self.last) {
            return;
        }
        for node in self.nodes() {
            parent.insert_before(node, Some(reference));
        }
    }

    /// Move the view's nodes to the end of `parent`.
    pub fn append_to(&self, parent: Node) {
        if self.fragment.has_children() {
            parent.append_child(self.fragment);
            return;
        }
        for node in self.nodes() {
            parent.append_child(node);
        }
    }

    /// Take the view's nodes out of the tree, keeping them for reinsertion.
    pub fn remove(&self) {
        for node in self.nodes() {
            self.fragment.append_child(node);
        }
    }

    /// Take the view out of the tree, unbind it and free its nodes.
    pub fn dispose(mut self) {
        let nodes = self.nodes();
        self.unbind();
        for node in nodes {
            node.release();
        }
    }

    /// Dispose views that sit next to each other in one parent, in order.
    ///
    /// The whole node run is cut out of the parent at once.
    pub fn dispose_contiguous_batch(views: Vec<View>) {
        let (Some(first), Some(last)) = (views.first(), views.last()) else {
            return;
        };
        let (start, end) = (first.first, last.last);
        let contiguous = start.parent().is_some() && start.parent() == end.parent();
        if !contiguous {
            views.into_iter().for_each(View::dispose);
            return;
        }
        for mut view in views {
            view.unbind();
        }
        Node::release_sibling_run(start, end);
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.unbind();
        self.fragment.release();
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("first", &self.first)
            .field("last", &self.last)
            .field("behaviors", &self.behaviors.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}
