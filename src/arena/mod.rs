// Arena-based storage for notifier tables and render-tree nodes
//
// This module provides two separate arenas:
// - Notifier arena: subscriber tables of reactive sources, keyed by SourceId
// - Node arena: the render tree (elements, text, comments, fragments), keyed by NodeId
//
// Both arenas are thread-local slabs behind a RefCell. Ids carry a generation
// stamp, so a stale id never reaches a newer entry that reused its slot; every
// accessor returns None for stale ids.

pub mod node_arena;
pub mod notifier_arena;

pub use node_arena::{NodeData, NodeId, NodeKind, node_arena_insert};
pub use notifier_arena::{SourceId, notifier_arena_insert, notifier_arena_remove};

#[cfg(test)]
pub use notifier_arena::notifier_arena_len;
