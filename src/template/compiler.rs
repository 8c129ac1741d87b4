//! Template compilation.
//!
//! The parsed markup is walked once in document order. Every placeholder is
//! replaced by a plain skeleton node (or removed, for attributes) and turned
//! into a [`BehaviorFactory`] remembering the structural index of its target:
//! the node's position in that same walk. Instantiating a view clones the
//! skeleton and walks the clone, handing each factory the node at its index.

use std::rc::Rc;

use tracing::debug;

use crate::dom::{Node, NodeType, TreeWalker};
use crate::error::{Error, Result};
use crate::observable::{Binding, ExecutionContext};
use crate::template::attached::AttachedDirective;
use crate::template::binding_behavior::create_binding_behavior;
use crate::template::repeat::RepeatDirective;
use crate::template::{Aspect, Behavior, Directive, Part, block_index, parse_content};
use crate::value::Value;

/// What a factory builds.
#[derive(Clone, Debug)]
pub(crate) enum FactoryKind {
    Binding { binding: Binding, aspect: Aspect },
    Repeat(RepeatDirective),
    Attached(AttachedDirective),
}

/// Creates one behavior for the node at `target_index`.
#[derive(Clone, Debug)]
pub(crate) struct BehaviorFactory {
    pub(crate) target_index: usize,
    pub(crate) kind: FactoryKind,
}

impl BehaviorFactory {
    pub(crate) fn create_behavior(&self, target: Node) -> Box<dyn Behavior> {
        match &self.kind {
            FactoryKind::Binding { binding, aspect } => {
                create_binding_behavior(binding, aspect, target)
            }
            FactoryKind::Repeat(directive) => directive.create_behavior(target),
            FactoryKind::Attached(directive) => directive.create_behavior(target),
        }
    }
}

/// Result of compiling a template.
#[derive(Debug)]
pub(crate) struct CompiledTemplate {
    /// Skeleton cloned for every view.
    pub(crate) fragment: Node,
    /// Factories for nodes of the view, ascending by target index.
    pub(crate) view_factories: Vec<BehaviorFactory>,
    /// Factories applied to the host element passed to `create`.
    pub(crate) host_factories: Vec<BehaviorFactory>,
    /// Structural index of the first walked node: -1 when a leading anchor
    /// was inserted, else 0.
    pub(crate) target_offset: isize,
}

struct CompilationContext<'a> {
    directives: &'a [Directive],
    target_index: isize,
    factories: Vec<BehaviorFactory>,
    /// A content or structural placeholder sits at the first node.
    leading_placeholder: bool,
}

impl CompilationContext<'_> {
    fn add_factory(&mut self, kind: FactoryKind) {
        self.factories.push(BehaviorFactory {
            target_index: usize::try_from(self.target_index).unwrap_or_default(),
            kind,
        });
    }

    /// Factory for directive `index` used in text or at a structural marker.
    fn add_content_factory(&mut self, index: usize) {
        if self.target_index == 0 {
            self.leading_placeholder = true;
        }
        let kind = match &self.directives[index] {
            Directive::Binding(binding) => FactoryKind::Binding {
                binding: binding.clone(),
                aspect: Aspect::Content,
            },
            Directive::Repeat(repeat) => FactoryKind::Repeat(repeat.clone()),
            Directive::Attached(attached) => FactoryKind::Attached(attached.clone()),
        };
        self.add_factory(kind);
    }

    /// Factory for attribute `name` whose value split into `parts`.
    fn attribute_factory(&self, name: &str, parts: Vec<Part>) -> FactoryKind {
        if let [Part::Directive(index)] = parts[..] {
            return match &self.directives[index] {
                Directive::Binding(binding) => FactoryKind::Binding {
                    binding: binding.clone(),
                    aspect: Aspect::from_attribute(name),
                },
                Directive::Repeat(repeat) => FactoryKind::Repeat(repeat.clone()),
                Directive::Attached(attached) => FactoryKind::Attached(attached.clone()),
            };
        }
        FactoryKind::Binding {
            binding: self.aggregate(parts),
            aspect: Aspect::from_attribute(name),
        }
    }

    /// One binding concatenating every part of an interpolated value.
    fn aggregate(&self, parts: Vec<Part>) -> Binding {
        enum Piece {
            Literal(Rc<str>),
            Binding(Binding),
        }
        let mut volatile = false;
        let pieces: Vec<Piece> = parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Literal(text) => Some(Piece::Literal(Rc::from(text))),
                Part::Directive(index) => match &self.directives[index] {
                    Directive::Binding(binding) => {
                        volatile |= binding.is_volatile();
                        Some(Piece::Binding(binding.clone()))
                    }
                    // rejected by `validate`
                    _ => None,
                },
            })
            .collect();
        let concat = move |source: &Value, context: &ExecutionContext| {
            let mut output = String::new();
            for piece in &pieces {
                match piece {
                    Piece::Literal(text) => output.push_str(text),
                    Piece::Binding(binding) => {
                        output.push_str(&binding.evaluate(source, context).to_string());
                    }
                }
            }
            Value::from(output)
        };
        if volatile {
            Binding::volatile(concat)
        } else {
            Binding::new(concat)
        }
    }

    fn compile_attributes(&mut self, node: Node) {
        for (name, value) in node.attributes() {
            if let Some(parts) = parse_content(&value) {
                node.remove_attribute(&name);
                let kind = self.attribute_factory(&name, parts);
                self.add_factory(kind);
            }
        }
    }

    fn compile_host_attributes(&mut self, attributes: &[(String, String)]) {
        for (name, value) in attributes {
            let kind = match parse_content(value) {
                Some(parts) => self.attribute_factory(name, parts),
                None => FactoryKind::Binding {
                    binding: Binding::constant(value.as_str()),
                    aspect: Aspect::from_attribute(name),
                },
            };
            self.add_factory(kind);
        }
    }

    fn compile_content(&mut self, node: Node, walker: &mut TreeWalker) {
        let Some(parts) = node.data().as_deref().and_then(parse_content) else {
            return;
        };
        let Some(parent) = node.parent() else {
            return;
        };
        let mut last = node;
        for (i, part) in parts.into_iter().enumerate() {
            let current = if i == 0 {
                node
            } else {
                let inserted = Node::text("");
                parent.insert_before(inserted, last.next_sibling());
                inserted
            };
            match part {
                Part::Literal(text) => current.set_text_content(&text),
                Part::Directive(index) => {
                    current.set_text_content(" ");
                    self.add_content_factory(index);
                }
            }
            last = current;
            self.target_index += 1;
            if current != node {
                walker.next_node();
            }
        }
        self.target_index -= 1;
    }
}

/// Compile `fragment` in place into a skeleton plus factories.
///
/// `validate` must have accepted the same input.
pub(crate) fn compile(
    fragment: Node,
    host_attributes: &[(String, String)],
    directives: &[Directive],
) -> CompiledTemplate {
    let mut context = CompilationContext {
        directives,
        target_index: -1,
        factories: Vec::new(),
        leading_placeholder: false,
    };
    context.compile_host_attributes(host_attributes);
    let host_factories = std::mem::take(&mut context.factories);

    context.target_index = -1;
    let mut walker = TreeWalker::new(fragment);
    while let Some(node) = walker.next_node() {
        context.target_index += 1;
        match node.node_type() {
            Some(NodeType::Element) => context.compile_attributes(node),
            Some(NodeType::Text) => context.compile_content(node, &mut walker),
            Some(NodeType::Comment) => {
                if let Some(index) = node.data().as_deref().and_then(block_index) {
                    context.add_content_factory(index);
                }
            }
            Some(NodeType::Fragment) | None => {}
        }
    }

    // Content and structural directives insert nodes in front of their
    // placeholder, so a placeholder as first node (or a lone dynamic node)
    // cannot bound the view.
    let children = fragment.children().len();
    let mut target_offset = 0;
    if context.leading_placeholder || (children == 1 && !directives.is_empty()) {
        cov_mark::hit!(template_anchor_inserted);
        fragment.insert_before(Node::comment(""), fragment.first_child());
        target_offset = -1;
    } else if children == 0 {
        fragment.append_child(Node::comment(""));
    }

    debug!(
        view_factories = context.factories.len(),
        host_factories = host_factories.len(),
        target_offset,
        "compiled template"
    );
    CompiledTemplate {
        fragment,
        view_factories: context.factories,
        host_factories,
        target_offset,
    }
}

/// Check every placeholder in `fragment` and the host attributes against
/// `directives`.
pub(crate) fn validate(
    fragment: Node,
    host_attributes: &[(String, String)],
    directives: &[Directive],
) -> Result<()> {
    let count = directives.len();
    let directive = |index: usize| {
        directives
            .get(index)
            .ok_or(Error::DirectiveIndexOutOfRange { index, count })
    };
    let check_attribute = |value: &str| -> Result<()> {
        let Some(parts) = parse_content(value) else {
            return Ok(());
        };
        let single = parts.len() == 1;
        for part in parts {
            let Part::Directive(index) = part else {
                continue;
            };
            match directive(index)? {
                Directive::Binding(_) => {}
                Directive::Repeat(_) => {
                    return Err(Error::MisplacedDirective {
                        index,
                        context: "in an attribute",
                    });
                }
                Directive::Attached(_) if !single => {
                    return Err(Error::MisplacedDirective {
                        index,
                        context: "inside an interpolated attribute",
                    });
                }
                Directive::Attached(_) => {}
            }
        }
        Ok(())
    };

    for (_, value) in host_attributes {
        check_attribute(value)?;
    }
    let mut walker = TreeWalker::new(fragment);
    while let Some(node) = walker.next_node() {
        match node.node_type() {
            Some(NodeType::Element) => {
                for (_, value) in node.attributes() {
                    check_attribute(&value)?;
                }
            }
            Some(NodeType::Text) => {
                let parts = node.data().as_deref().and_then(parse_content);
                for part in parts.into_iter().flatten() {
                    if let Part::Directive(index) = part {
                        if let Directive::Attached(_) = directive(index)? {
                            return Err(Error::MisplacedDirective {
                                index,
                                context: "in text content",
                            });
                        }
                    }
                }
            }
            Some(NodeType::Comment) => {
                if let Some(index) = node.data().as_deref().and_then(block_index) {
                    if let Directive::Attached(_) = directive(index)? {
                        return Err(Error::MisplacedDirective {
                            index,
                            context: "at a structural marker",
                        });
                    }
                }
            }
            Some(NodeType::Fragment) | None => {}
        }
    }
    Ok(())
}
