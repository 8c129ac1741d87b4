#![deny(missing_docs)]

//! Fine-grained reactive templates.
//!
//! Declarative markup with embedded expressions is compiled once into a
//! skeleton plus positional behaviors, then stamped out into views whose
//! nodes update incrementally as the data they read changes. Lists are
//! reconciled through a minimal-edit diff.
//!
//! # Quick Start
//!
//! ```ignore
//! use reaktiv_view::{html, binding, repeat, Node, Observable, ObservableType, Value, process_updates};
//!
//! let todo = ObservableType::builder("Todo").property("title").property("done").build()?;
//! let item = html()
//!     .markup("<li ?data-done=")
//!     .bind(binding!(|s| s.get("done")))
//!     .markup(">")
//!     .bind(binding!(|s| s.get("title")))
//!     .markup("</li>")
//!     .build()?;
//!
//! let list_type = ObservableType::builder("TodoList").property("items").build()?;
//! let model = Observable::new(&list_type);
//! model.set("items", items.clone())?;
//!
//! let page = html()
//!     .markup("<ul>")
//!     .directive(repeat(binding!(|s| s.get("items")), item))
//!     .markup("</ul>")
//!     .build()?;
//! let view = page.render(&Value::from(model), Node::element("main"));
//!
//! items.push(Observable::with_values(&todo, [("title", "write docs")])?);
//! process_updates(); // one new <li>, nothing else touched
//! ```
//!
//! # Core Types
//!
//! - [`Observable`] / [`ObservableType`] - objects with declared reactive properties.
//! - [`ObservableList`] - a sequence whose edits are delivered as [`Splice`]s.
//! - [`Binding`] - an expression over a source and an [`ExecutionContext`].
//! - [`ViewTemplate`] - markup plus directives, compiled once, instantiated as [`View`]s.
//! - [`Node`] - handle into the render tree views are built in.
//!
//! # Updates
//!
//! Writes never touch the tree directly. A changed dependency queues one task
//! per binding on the thread's update queue; [`process_updates`] (or the
//! host's tick trigger, see [`set_tick_trigger`]) drains it.
//!
//! ```ignore
//! model.set("title", "new")?;   // queued
//! process_updates();            // applied
//!
//! Transaction::run(|| {
//!     model.set("a", 1)?;
//!     model.set("b", 2)?;
//! });                           // applied once, at the end
//! ```
//!
//! # Placeholders
//!
//! [`TemplateBuilder`] writes these for you. Hand-written markup may use them
//! directly with [`ViewTemplate::new`]:
//!
//! - `MARKER{N}MARKER` in text or an attribute value binds directive `N`.
//! - `<!--MARKER:N-->` places a structural directive such as [`repeat`].
//!
//! The attribute name selects how a binding applies: `name` (attribute),
//! `:name` (property), `?name` (boolean attribute), `@name` (event).

// Internal modules
pub(crate) mod arena;
mod dom;
mod error;
mod hash;
mod observable;
mod policy;
mod scheduler;
mod splice;
mod template;
mod transaction;
mod value;

// Core types
pub use arena::{NodeId, SourceId};
pub use dom::{Event, ListenerId, Node, NodeType};
pub use error::{Error, Result};
pub use observable::{
    Binding, BindingObserver, Change, ExecutionContext, Observable, ObservableList,
    ObservableType, PropertyDescriptor, Source, Subscriber, SubscriberSet, TypeBuilder, untracked,
};
pub use splice::{Splice, apply_splices, calc_splices, diff, merge_splices, project_splices};
pub use template::{
    Aspect, AttachedBehaviorFactory, AttachedDirective, Behavior, Directive, MARKER,
    RepeatDirective, RepeatOptions, TemplateBuilder, View, ViewTemplate, html, reference, repeat,
    when,
};
pub use transaction::{Transaction, is_transaction_active};
pub use value::Value;

// Configuration
pub use policy::{HtmlPolicy, set_html_policy};

// Update queue (for host event loops)
pub use scheduler::{
    DEFAULT_COMPACTION_THRESHOLD, NextUpdate, clear_tick_trigger, is_update_scheduled,
    next_update, pending_update_count, process_updates, queue_update, set_tick_trigger,
};

#[cfg(test)]
mod tests;
