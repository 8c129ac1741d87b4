// Node arena - storage for the render tree
//
// Nodes are slab entries linked through parent / first child / last child /
// previous sibling / next sibling ids. `NodeTree` keeps the link surgery in one
// place so every structural edit happens inside a single arena borrow.
//
// Node payloads can own arbitrary values (element properties, listener
// closures). Removal hands the payload back to the caller, which must drop it
// after the borrow ends: a dropped value may release further nodes.

use std::cell::RefCell;
use std::rc::Rc;

use slab::Slab;

use crate::dom::Event;
use crate::hash::{FastHashMap, FastIndexMap};
use crate::value::Value;

thread_local! {
    static NODE_ARENA: RefCell<NodeTree> = RefCell::new(NodeTree::default());
}

/// Registered event listener.
pub(crate) struct Listener {
    pub(crate) id: u64,
    pub(crate) kind: Rc<str>,
    pub(crate) handler: Rc<dyn Fn(&Event)>,
}

/// Payload of an element node.
pub struct ElementData {
    pub(crate) tag: Rc<str>,
    pub(crate) attributes: FastIndexMap<Rc<str>, String>,
    pub(crate) properties: FastHashMap<Rc<str>, Value>,
    pub(crate) listeners: Vec<Listener>,
}

/// What a node is.
pub enum NodeKind {
    /// Element with attributes, properties and listeners.
    Element(ElementData),
    /// Text node.
    Text(String),
    /// Comment node.
    Comment(String),
    /// Document fragment; inserting it moves its children.
    Fragment,
}

/// One arena entry.
pub struct NodeData {
    generation: u32,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) previous_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
}

/// Unique identifier for a node in the arena.
///
/// Releasing a node frees its slot; accessing a stale NodeId returns None.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Convert to usize for slab indexing
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Access the node with a closure (read-only)
    ///
    /// Returns None if the node has been released (stale access) or the
    /// thread's arena is already torn down.
    pub fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&NodeData) -> R,
    {
        NODE_ARENA
            .try_with(|tree| tree.borrow().get(self).map(f))
            .ok()
            .flatten()
    }

    /// Access the node mutably with a closure
    ///
    /// Returns None if the node has been released (stale access) or the
    /// thread's arena is already torn down.
    pub fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut NodeData) -> R,
    {
        NODE_ARENA
            .try_with(|tree| tree.borrow_mut().get_mut(self).map(f))
            .ok()
            .flatten()
    }

    /// Whether the node is still allocated.
    pub fn is_alive(self) -> bool {
        self.with(|_| ()).is_some()
    }
}

/// The slab plus link bookkeeping.
#[derive(Default)]
pub struct NodeTree {
    slab: Slab<NodeData>,
    next_generation: u32,
}

impl NodeTree {
    pub(crate) fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.slab
            .get(id.index())
            .filter(|node| node.generation == id.generation)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slab
            .get_mut(id.index())
            .filter(|node| node.generation == id.generation)
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let index = self.slab.insert(NodeData {
            generation,
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            previous_sibling: None,
            next_sibling: None,
        });
        NodeId {
            index: index as u32,
            generation,
        }
    }

    /// Cut `id` out of its parent's child list.
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let Some((parent, previous, next)) = self
            .get(id)
            .map(|node| (node.parent, node.previous_sibling, node.next_sibling))
        else {
            return;
        };
        let Some(parent) = parent else {
            return;
        };
        match previous.and_then(|p| self.get_mut(p)) {
            Some(previous) => previous.next_sibling = next,
            None => {
                if let Some(parent) = self.get_mut(parent) {
                    parent.first_child = next;
                }
            }
        }
        match next.and_then(|n| self.get_mut(n)) {
            Some(next) => next.previous_sibling = previous,
            None => {
                if let Some(parent) = self.get_mut(parent) {
                    parent.last_child = previous;
                }
            }
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
            node.previous_sibling = None;
            node.next_sibling = None;
        }
    }

    /// Link an unattached `child` under `parent`, before `reference` or at the end.
    pub(crate) fn link_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let previous = match reference {
            Some(reference) => self.get(reference).and_then(|r| r.previous_sibling),
            None => self.get(parent).and_then(|p| p.last_child),
        };
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
            node.previous_sibling = previous;
            node.next_sibling = reference;
        }
        match previous.and_then(|p| self.get_mut(p)) {
            Some(previous) => previous.next_sibling = Some(child),
            None => {
                if let Some(parent) = self.get_mut(parent) {
                    parent.first_child = Some(child);
                }
            }
        }
        match reference.and_then(|r| self.get_mut(r)) {
            Some(reference) => reference.previous_sibling = Some(child),
            None => {
                if let Some(parent) = self.get_mut(parent) {
                    parent.last_child = Some(child);
                }
            }
        }
    }

    /// Child ids in order.
    pub(crate) fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut next = self.get(id).and_then(|node| node.first_child);
        while let Some(child) = next {
            children.push(child);
            next = self.get(child).and_then(|node| node.next_sibling);
        }
        children
    }

    /// `id` and all its descendants, pre-order.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.get(current).is_none() {
                continue;
            }
            out.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub(crate) fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|n| n.parent);
        }
        false
    }

    /// Unlink `id` and free it with its whole subtree.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeData> {
        self.unlink(id);
        self.subtree(id)
            .into_iter()
            .filter_map(|node| self.slab.try_remove(node.index()))
            .collect()
    }

    /// Free the sibling run `first..=last` with every subtree in it, relinking
    /// the parent once.
    pub(crate) fn remove_sibling_run(&mut self, first: NodeId, last: NodeId) -> Vec<NodeData> {
        let run = self.sibling_run(first, last);
        let (parent, previous, next) = match (self.get(first), self.get(last)) {
            (Some(f), Some(l)) => (f.parent, f.previous_sibling, l.next_sibling),
            _ => return Vec::new(),
        };
        if let Some(parent) = parent {
            match previous.and_then(|p| self.get_mut(p)) {
                Some(previous) => previous.next_sibling = next,
                None => {
                    if let Some(parent) = self.get_mut(parent) {
                        parent.first_child = next;
                    }
                }
            }
            match next.and_then(|n| self.get_mut(n)) {
                Some(next) => next.previous_sibling = previous,
                None => {
                    if let Some(parent) = self.get_mut(parent) {
                        parent.last_child = previous;
                    }
                }
            }
        }
        let mut removed = Vec::new();
        for node in run {
            for id in self.subtree(node) {
                removed.extend(self.slab.try_remove(id.index()));
            }
        }
        removed
    }

    /// Ids from `first` to `last` following next-sibling links.
    pub(crate) fn sibling_run(&self, first: NodeId, last: NodeId) -> Vec<NodeId> {
        let mut run = Vec::new();
        let mut current = Some(first);
        while let Some(node) = current {
            run.push(node);
            if node == last {
                break;
            }
            current = self.get(node).and_then(|n| n.next_sibling);
        }
        run
    }
}

/// Read access to the whole tree.
pub(crate) fn with_tree<R>(f: impl FnOnce(&NodeTree) -> R) -> R {
    NODE_ARENA.with_borrow(f)
}

/// Write access to the whole tree.
pub(crate) fn with_tree_mut<R>(f: impl FnOnce(&mut NodeTree) -> R) -> R {
    NODE_ARENA.with_borrow_mut(f)
}

/// Write access that does nothing once the thread's arena is torn down.
///
/// Used on release paths, which also run from destructors at thread exit.
pub(crate) fn try_with_tree_mut<R>(f: impl FnOnce(&mut NodeTree) -> R) -> Option<R> {
    NODE_ARENA.try_with(|tree| f(&mut tree.borrow_mut())).ok()
}

/// Allocate an unattached node and return its id
pub fn node_arena_insert(kind: NodeKind) -> NodeId {
    NODE_ARENA.with_borrow_mut(|tree| tree.insert(kind))
}

/// Number of live nodes on this thread (test-only)
#[cfg(test)]
pub(crate) fn node_arena_len() -> usize {
    NODE_ARENA.with_borrow(|tree| tree.slab.len())
}
