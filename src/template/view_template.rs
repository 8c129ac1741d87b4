use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::dom::{Node, TreeWalker};
use crate::error::Result;
use crate::observable::{Binding, ExecutionContext};
use crate::policy;
use crate::template::compiler::{CompiledTemplate, compile, validate};
use crate::template::markup::parse_fragment;
use crate::template::{Directive, View};
use crate::value::Value;

struct TemplateInner {
    /// Parsed markup; compiled in place on first use.
    content: Node,
    host_attributes: Vec<(String, String)>,
    directives: Vec<Directive>,
    compiled: OnceCell<CompiledTemplate>,
}

impl Drop for TemplateInner {
    fn drop(&mut self) {
        self.content.release();
    }
}

/// Markup plus directives, compiled once into a factory for views.
///
/// Cloning shares the template; identity is what content bindings and list
/// rendering compare.
#[derive(Clone)]
pub struct ViewTemplate(Rc<TemplateInner>);

impl ViewTemplate {
    /// Parse `markup` whose placeholders index into `directives`.
    ///
    /// The markup passes through the installed HTML policy first. When its
    /// first element is a `<template>`, that element's children are the view
    /// content and its attributes become bindings on the host element given
    /// to [`create`](Self::create).
    pub fn new(markup: &str, directives: Vec<Directive>) -> Result<Self> {
        let fragment = parse_fragment(&policy::create_html(markup))?;
        let template_root = fragment
            .children()
            .into_iter()
            .find(|node| node.tag_name().is_some())
            .filter(|node| node.tag_name().as_deref() == Some("template"));
        let (content, host_attributes) = match template_root {
            Some(root) => {
                let content = Node::fragment();
                for child in root.children() {
                    content.append_child(child);
                }
                let attributes = root.attributes();
                fragment.release();
                (content, attributes)
            }
            None => (fragment, Vec::new()),
        };
        if let Err(error) = validate(content, &host_attributes, &directives) {
            content.release();
            return Err(error);
        }
        Ok(Self(Rc::new(TemplateInner {
            content,
            host_attributes,
            directives,
            compiled: OnceCell::new(),
        })))
    }

    fn compiled(&self) -> &CompiledTemplate {
        let inner = &*self.0;
        inner
            .compiled
            .get_or_init(|| compile(inner.content, &inner.host_attributes, &inner.directives))
    }

    /// Number of directives.
    pub fn directive_count(&self) -> usize {
        self.0.directives.len()
    }

    /// Instantiate an unbound view; host bindings attach to `host`.
    pub fn create(&self, host: Option<Node>) -> View {
        let compiled = self.compiled();
        let fragment = compiled.fragment.clone_node(true);
        let mut behaviors = Vec::with_capacity(
            compiled.view_factories.len() + host.map_or(0, |_| compiled.host_factories.len()),
        );

        let mut walker = TreeWalker::new(fragment);
        let mut target_index = compiled.target_offset;
        let mut node = walker.next_node();
        for factory in &compiled.view_factories {
            while let Some(current) = node {
                if usize::try_from(target_index).ok() == Some(factory.target_index) {
                    behaviors.push(factory.create_behavior(current));
                    break;
                }
                node = walker.next_node();
                target_index += 1;
            }
        }
        if let Some(host) = host {
            for factory in &compiled.host_factories {
                behaviors.push(factory.create_behavior(host));
            }
        }
        View::new(fragment, behaviors)
    }

    /// Create a view for `host`, bind it to `source` with the default
    /// context and append it to `host`.
    pub fn render(&self, source: &Value, host: Node) -> View {
        let mut view = self.create(Some(host));
        view.bind(source, &ExecutionContext::default_context());
        view.append_to(host);
        view
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ViewTemplate> for Binding {
    fn from(template: ViewTemplate) -> Self {
        Binding::constant(template)
    }
}

impl fmt::Debug for ViewTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewTemplate")
            .field("directives", &self.0.directives.len())
            .field("compiled", &self.0.compiled.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding;
    use crate::template::{html, interpolation};

    #[test]
    fn static_markup_renders_as_written() {
        let template = ViewTemplate::new("<p>hi</p><p>there</p>", Vec::new()).unwrap();
        let host = Node::element("div");
        let view = template.render(&Value::Null, host);
        assert_eq!(host.inner_html(), "<p>hi</p><p>there</p>");
        assert_eq!(view.behavior_count(), 0);
    }

    #[test]
    fn compiles_once_for_many_views() {
        let template = html()
            .markup("<b>")
            .bind(binding!(|s| s.clone()))
            .markup("</b>")
            .build()
            .unwrap();
        let host = Node::element("div");
        let _a = template.render(&Value::from("a"), host);
        let _b = template.render(&Value::from("b"), host);
        assert_eq!(host.text_content(), "ab");
        assert!(format!("{template:?}").contains("compiled: true"));
    }

    #[test]
    fn template_root_binds_the_host() {
        let markup = format!(
            "<template role=list title=\"{}\"><i>x</i></template>",
            interpolation(0)
        );
        let template = ViewTemplate::new(&markup, vec![binding!(|s| s.clone()).into()]).unwrap();
        let host = Node::element("my-list");
        let _view = template.render(&Value::from("items"), host);
        // the lone <i> is preceded by the view's anchor comment
        assert_eq!(
            host.outer_html(),
            "<my-list role=\"list\" title=\"items\"><!----><i>x</i></my-list>"
        );
    }

    #[test]
    fn out_of_range_directive_is_rejected() {
        let markup = format!("<p>{}</p>", interpolation(1));
        let error = ViewTemplate::new(&markup, vec![Binding::constant(1).into()]).unwrap_err();
        assert!(error.is_markup_error());
    }
}
