//! Render tree used as the host for compiled templates.
//!
//! [`Node`] is a `Copy` handle into the thread-local node arena. It offers the
//! small DOM-like surface templates need: named string attributes, named
//! properties, event listeners and tree edits (insert before, append, remove,
//! clone). Operations on a released node are ignored (writes log a warning)
//! and reads return empty results.

use std::cell::Cell;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use tracing::warn;

use crate::arena::node_arena::{
    ElementData, Listener, try_with_tree_mut, with_tree, with_tree_mut,
};
use crate::arena::{NodeData, NodeId, NodeKind, node_arena_insert};
use crate::template::markup::parse_fragment;
use crate::value::Value;

/// Elements that never have children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Kind of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Element.
    Element,
    /// Text.
    Text,
    /// Comment.
    Comment,
    /// Document fragment.
    Fragment,
}

/// Identifier returned by [`Node::add_event_listener`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

thread_local! {
    static NEXT_LISTENER_ID: Cell<u64> = const { Cell::new(0) };
}

struct EventInner {
    kind: Rc<str>,
    detail: Value,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    target: Cell<Option<Node>>,
    current_target: Cell<Option<Node>>,
}

/// An event dispatched through the render tree. Cloning shares the event.
#[derive(Clone)]
pub struct Event(Rc<EventInner>);

impl Event {
    /// A bubbling event of type `kind`.
    pub fn new(kind: &str) -> Self {
        Self::with_detail(kind, Value::Null)
    }

    /// A bubbling event carrying `detail`.
    pub fn with_detail(kind: &str, detail: impl Into<Value>) -> Self {
        Self(Rc::new(EventInner {
            kind: Rc::from(kind),
            detail: detail.into(),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            target: Cell::new(None),
            current_target: Cell::new(None),
        }))
    }

    /// Event type.
    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    /// Payload given at construction.
    pub fn detail(&self) -> &Value {
        &self.0.detail
    }

    /// Cancel the default action.
    pub fn prevent_default(&self) {
        self.0.default_prevented.set(true);
    }

    /// Whether a listener cancelled the default action.
    pub fn default_prevented(&self) -> bool {
        self.0.default_prevented.get()
    }

    /// Stop bubbling after the current node's listeners.
    pub fn stop_propagation(&self) {
        self.0.propagation_stopped.set(true);
    }

    /// Node the event was dispatched on.
    pub fn target(&self) -> Option<Node> {
        self.0.target.get()
    }

    /// Node whose listeners are running.
    pub fn current_target(&self) -> Option<Node> {
        self.0.current_target.get()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.0.kind)
            .field("detail", &self.0.detail)
            .field("default_prevented", &self.0.default_prevented.get())
            .finish()
    }
}

/// Handle to a node of the render tree.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Node(NodeId);

impl Node {
    fn create(kind: NodeKind) -> Self {
        Self(node_arena_insert(kind))
    }

    /// A new unattached element.
    pub fn element(tag: &str) -> Self {
        Self::create(NodeKind::Element(ElementData {
            tag: Rc::from(tag.to_ascii_lowercase()),
            attributes: Default::default(),
            properties: Default::default(),
            listeners: Vec::new(),
        }))
    }

    /// A new unattached text node.
    pub fn text(data: &str) -> Self {
        Self::create(NodeKind::Text(data.to_owned()))
    }

    /// A new unattached comment.
    pub fn comment(data: &str) -> Self {
        Self::create(NodeKind::Comment(data.to_owned()))
    }

    /// A new empty fragment.
    pub fn fragment() -> Self {
        Self::create(NodeKind::Fragment)
    }

    /// Arena id of this node.
    pub fn id(self) -> NodeId {
        self.0
    }

    /// Whether the node has not been released.
    pub fn is_alive(self) -> bool {
        self.0.is_alive()
    }

    fn read<R>(self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.0.with(f)
    }

    fn write<R>(self, what: &'static str, f: impl FnOnce(&mut NodeData) -> R) -> Option<R> {
        let result = self.0.with_mut(f);
        if result.is_none() {
            warn!(node = ?self.0, operation = what, "write to released node");
        }
        result
    }

    /// Node kind, or None for a released node.
    pub fn node_type(self) -> Option<NodeType> {
        self.read(|node| match node.kind {
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::Fragment => NodeType::Fragment,
        })
    }

    /// Lower-cased tag name of an element.
    pub fn tag_name(self) -> Option<Rc<str>> {
        self.read(|node| match &node.kind {
            NodeKind::Element(element) => Some(element.tag.clone()),
            _ => None,
        })
        .flatten()
    }

    // -- tree navigation -----------------------------------------------------

    /// Parent node.
    pub fn parent(self) -> Option<Node> {
        self.read(|node| node.parent).flatten().map(Node)
    }

    /// First child.
    pub fn first_child(self) -> Option<Node> {
        self.read(|node| node.first_child).flatten().map(Node)
    }

    /// Last child.
    pub fn last_child(self) -> Option<Node> {
        self.read(|node| node.last_child).flatten().map(Node)
    }

    /// Next sibling.
    pub fn next_sibling(self) -> Option<Node> {
        self.read(|node| node.next_sibling).flatten().map(Node)
    }

    /// Previous sibling.
    pub fn previous_sibling(self) -> Option<Node> {
        self.read(|node| node.previous_sibling).flatten().map(Node)
    }

    /// Children in order.
    pub fn children(self) -> Vec<Node> {
        with_tree(|tree| tree.children(self.0)).into_iter().map(Node).collect()
    }

    /// Whether the node has any children.
    pub fn has_children(self) -> bool {
        self.first_child().is_some()
    }

    // -- tree edits ----------------------------------------------------------

    /// Append `child` (or a fragment's children) at the end.
    pub fn append_child(self, child: Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is None.
    ///
    /// A node that is already attached somewhere is moved. Inserting a fragment
    /// moves its children and leaves it empty. Inserting a node into itself or
    /// one of its descendants, or before a node that is not a child of `self`,
    /// is ignored.
    pub fn insert_before(self, child: Node, reference: Option<Node>) {
        let inserted = with_tree_mut(|tree| {
            if tree.get(self.0).is_none() || tree.get(child.0).is_none() {
                return Err("released node");
            }
            if let Some(reference) = reference {
                if tree.get(reference.0).and_then(|r| r.parent) != Some(self.0) {
                    return Err("reference is not a child");
                }
                if reference == child {
                    return Ok(());
                }
            }
            if tree.is_inclusive_ancestor(child.0, self.0) {
                return Err("would create a cycle");
            }
            let moved = match tree.get(child.0).map(|c| matches!(c.kind, NodeKind::Fragment)) {
                Some(true) => tree.children(child.0),
                _ => vec![child.0],
            };
            for id in moved {
                tree.unlink(id);
                tree.link_before(self.0, id, reference.map(|r| r.0));
            }
            Ok(())
        });
        if let Err(reason) = inserted {
            warn!(parent = ?self.0, child = ?child.0, reason, "insert ignored");
        }
    }

    /// Detach `child` from this node.
    pub fn remove_child(self, child: Node) {
        if child.parent() == Some(self) {
            child.detach();
        }
    }

    /// Detach this node from its parent, keeping it alive.
    pub fn detach(self) {
        with_tree_mut(|tree| tree.unlink(self.0));
    }

    /// Detach and free this node with all its descendants.
    pub fn release(self) {
        let freed = try_with_tree_mut(|tree| tree.remove_subtree(self.0));
        drop(freed);
    }

    /// Detach and free the sibling run `first..=last` with one relink of the
    /// parent.
    pub(crate) fn release_sibling_run(first: Node, last: Node) {
        let freed = try_with_tree_mut(|tree| tree.remove_sibling_run(first.0, last.0));
        drop(freed);
    }

    /// Free every child of this node.
    pub fn release_children(self) {
        for child in self.children() {
            child.release();
        }
    }

    /// Copy this node; with `deep`, copy the whole subtree.
    ///
    /// Attributes are copied; properties and listeners are not.
    pub fn clone_node(self, deep: bool) -> Node {
        let kind = self.read(|node| match &node.kind {
            NodeKind::Element(element) => NodeKind::Element(ElementData {
                tag: element.tag.clone(),
                attributes: element.attributes.clone(),
                properties: Default::default(),
                listeners: Vec::new(),
            }),
            NodeKind::Text(data) => NodeKind::Text(data.clone()),
            NodeKind::Comment(data) => NodeKind::Comment(data.clone()),
            NodeKind::Fragment => NodeKind::Fragment,
        });
        let copy = Node::create(kind.unwrap_or(NodeKind::Fragment));
        if deep {
            for child in self.children() {
                copy.append_child(child.clone_node(true));
            }
        }
        copy
    }

    // -- character data ------------------------------------------------------

    /// Data of a text or comment node.
    pub fn data(self) -> Option<String> {
        self.read(|node| match &node.kind {
            NodeKind::Text(data) | NodeKind::Comment(data) => Some(data.clone()),
            _ => None,
        })
        .flatten()
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(self) -> String {
        with_tree(|tree| match tree.get(self.0).map(|node| &node.kind) {
            Some(NodeKind::Text(data) | NodeKind::Comment(data)) => data.clone(),
            Some(_) => {
                let mut out = String::new();
                for id in tree.subtree(self.0) {
                    if let Some(NodeKind::Text(data)) = tree.get(id).map(|n| &n.kind) {
                        out.push_str(data);
                    }
                }
                out
            }
            None => String::new(),
        })
    }

    /// Replace the text of this node.
    ///
    /// Text and comment nodes get new data in place. Elements and fragments lose
    /// their children and get a single text child (none for empty text).
    pub fn set_text_content(self, text: &str) {
        let in_place = self.write("set_text_content", |node| match &mut node.kind {
            NodeKind::Text(data) | NodeKind::Comment(data) => {
                if data != text {
                    data.clear();
                    data.push_str(text);
                }
                true
            }
            _ => false,
        });
        if in_place == Some(false) {
            self.release_children();
            if !text.is_empty() {
                self.append_child(Node::text(text));
            }
        }
    }

    // -- attributes ----------------------------------------------------------

    fn element_data<R>(self, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
        self.read(|node| match &node.kind {
            NodeKind::Element(element) => Some(f(element)),
            _ => None,
        })
        .flatten()
    }

    fn element_mut<R>(self, what: &'static str, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
        self.write(what, |node| match &mut node.kind {
            NodeKind::Element(element) => Some(f(element)),
            _ => None,
        })
        .flatten()
    }

    /// Value of attribute `name`.
    pub fn get_attribute(self, name: &str) -> Option<String> {
        self.element_data(|element| element.attributes.get(name).cloned())
            .flatten()
    }

    /// Whether attribute `name` is present.
    pub fn has_attribute(self, name: &str) -> bool {
        self.element_data(|element| element.attributes.contains_key(name))
            .unwrap_or(false)
    }

    /// Set attribute `name`.
    pub fn set_attribute(self, name: &str, value: &str) {
        self.element_mut("set_attribute", |element| {
            match element.attributes.get_mut(name) {
                Some(existing) => {
                    existing.clear();
                    existing.push_str(value);
                }
                None => {
                    element.attributes.insert(Rc::from(name), value.to_owned());
                }
            }
        });
    }

    /// Remove attribute `name`.
    pub fn remove_attribute(self, name: &str) {
        self.element_mut("remove_attribute", |element| {
            element.attributes.shift_remove(name);
        });
    }

    /// Attributes in document order.
    pub fn attributes(self) -> Vec<(String, String)> {
        self.element_data(|element| {
            element
                .attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Set an attribute to the empty string when `on`, remove it otherwise.
    pub fn toggle_attribute(self, name: &str, on: bool) {
        if on {
            self.set_attribute(name, "");
        } else {
            self.remove_attribute(name);
        }
    }

    // -- class list ----------------------------------------------------------

    /// Class names from the `class` attribute.
    pub fn class_list(self) -> Vec<String> {
        self.get_attribute("class")
            .map(|classes| classes.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Whether the `class` attribute contains `class`.
    pub fn has_class(self, class: &str) -> bool {
        self.get_attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Add a class name if missing.
    pub fn add_class(self, class: &str) {
        if class.is_empty() || self.has_class(class) {
            return;
        }
        let mut classes = self.get_attribute("class").unwrap_or_default();
        if !classes.trim().is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attribute("class", classes.trim_start());
    }

    /// Remove a class name if present.
    pub fn remove_class(self, class: &str) {
        let Some(classes) = self.get_attribute("class") else {
            return;
        };
        let kept: Vec<&str> = classes.split_whitespace().filter(|c| *c != class).collect();
        self.set_attribute("class", &kept.join(" "));
    }

    // -- properties ----------------------------------------------------------

    /// Value of property `name` (Null when unset).
    pub fn get_property(self, name: &str) -> Value {
        self.element_data(|element| element.properties.get(name).cloned())
            .flatten()
            .unwrap_or_default()
    }

    /// Assign property `name`.
    ///
    /// `innerHTML` is interpreted: the string is parsed as markup and replaces
    /// the element's children (unparsable markup is inserted as text).
    pub fn set_property(self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if name == "innerHTML" {
            self.set_inner_html(&value.to_string());
        }
        let previous = self.element_mut("set_property", |element| {
            element.properties.insert(Rc::from(name), value)
        });
        // dropped outside the arena borrow
        drop(previous);
    }

    fn set_inner_html(self, html: &str) {
        self.release_children();
        match parse_fragment(html) {
            Ok(fragment) => {
                self.append_child(fragment);
                fragment.release();
            }
            Err(error) => {
                warn!(%error, "innerHTML is not valid markup, inserting as text");
                self.append_child(Node::text(html));
            }
        }
    }

    // -- events --------------------------------------------------------------

    /// Register `handler` for events of type `kind`.
    pub fn add_event_listener(self, kind: &str, handler: impl Fn(&Event) + 'static) -> ListenerId {
        let id = NEXT_LISTENER_ID.get();
        NEXT_LISTENER_ID.set(id + 1);
        self.element_mut("add_event_listener", |element| {
            element.listeners.push(Listener {
                id,
                kind: Rc::from(kind),
                handler: Rc::new(handler),
            });
        });
        ListenerId(id)
    }

    /// Unregister a listener. Returns false when it was not registered here.
    pub fn remove_event_listener(self, listener: ListenerId) -> bool {
        let removed = self
            .0
            .with_mut(|node| match &mut node.kind {
                NodeKind::Element(element) => {
                    let position = element.listeners.iter().position(|l| l.id == listener.0)?;
                    Some(element.listeners.remove(position))
                }
                _ => None,
            })
            .flatten();
        removed.is_some()
    }

    /// Number of listeners registered on this node.
    pub fn listener_count(self) -> usize {
        self.element_data(|element| element.listeners.len()).unwrap_or(0)
    }

    /// Dispatch `event` to this node, then bubble to its ancestors.
    ///
    /// Returns false when a listener called [`Event::prevent_default`].
    pub fn dispatch_event(self, event: &Event) -> bool {
        event.0.target.set(Some(self));
        let mut current = Some(self);
        while let Some(node) = current {
            event.0.current_target.set(Some(node));
            // listeners are cloned out so handlers may edit the tree
            let handlers: Vec<Rc<dyn Fn(&Event)>> = node
                .element_data(|element| {
                    element
                        .listeners
                        .iter()
                        .filter(|l| *l.kind == *event.kind())
                        .map(|l| l.handler.clone())
                        .collect()
                })
                .unwrap_or_default();
            for handler in handlers {
                handler(event);
            }
            if event.0.propagation_stopped.get() {
                break;
            }
            current = node.parent();
        }
        event.0.current_target.set(None);
        !event.default_prevented()
    }

    // -- serialization -------------------------------------------------------

    /// Markup of this node and its subtree.
    pub fn outer_html(self) -> String {
        let mut out = String::new();
        with_tree(|tree| serialize(tree, self.0, &mut out));
        out
    }

    /// Markup of this node's children.
    pub fn inner_html(self) -> String {
        let mut out = String::new();
        with_tree(|tree| {
            for child in tree.children(self.0) {
                serialize(tree, child, &mut out);
            }
        });
        out
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn serialize(tree: &crate::arena::node_arena::NodeTree, id: NodeId, out: &mut String) {
    let Some(node) = tree.get(id) else {
        return;
    };
    match &node.kind {
        NodeKind::Text(data) => escape_text(data, out),
        NodeKind::Comment(data) => {
            let _ = write!(out, "<!--{data}-->");
        }
        NodeKind::Fragment => {
            for child in tree.children(id) {
                serialize(tree, child, out);
            }
        }
        NodeKind::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attributes {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    escape_attribute(value, out);
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&&*element.tag) {
                return;
            }
            for child in tree.children(id) {
                serialize(tree, child, out);
            }
            let _ = write!(out, "</{}>", element.tag);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_type() {
            Some(kind) => f
                .debug_struct("Node")
                .field("id", &self.0)
                .field("type", &kind)
                .finish(),
            None => f.debug_tuple("Node").field(&"released").finish(),
        }
    }
}

/// Pre-order walk over the descendants of a root node.
pub(crate) struct TreeWalker {
    root: Node,
    current: Node,
}

impl TreeWalker {
    pub(crate) fn new(root: Node) -> Self {
        Self {
            root,
            current: root,
        }
    }

    /// Advance to the next node in document order below the root.
    pub(crate) fn next_node(&mut self) -> Option<Node> {
        if let Some(child) = self.current.first_child() {
            self.current = child;
            return Some(child);
        }
        let mut node = self.current;
        while node != self.root {
            if let Some(sibling) = node.next_sibling() {
                self.current = sibling;
                return Some(sibling);
            }
            node = node.parent()?;
        }
        None
    }
}
