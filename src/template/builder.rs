use crate::error::Result;
use crate::observable::Binding;
use crate::template::{
    Directive, ViewTemplate, attached_marker, block_marker, interpolation,
};

/// Start a template.
///
/// ```ignore
/// let item = html()
///     .markup("<li class=\"")
///     .bind(binding!(|s| s.get("kind")))
///     .markup("\">")
///     .bind(binding!(|s| s.get("label")))
///     .markup("</li>")
///     .build()?;
/// ```
pub fn html() -> TemplateBuilder {
    TemplateBuilder::new()
}

/// Accumulates markup and directives, writing the placeholder for each
/// directive where it is added.
///
/// Bindings become interpolation placeholders, valid in text and inside
/// attribute values. Repeats become structural comments. Attached directives
/// become an attribute of the element whose start tag is open.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    markup: String,
    directives: Vec<Directive>,
}

impl TemplateBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal markup.
    pub fn markup(mut self, markup: &str) -> Self {
        self.markup.push_str(markup);
        self
    }

    /// Append a binding placeholder.
    pub fn bind(self, binding: Binding) -> Self {
        self.directive(binding)
    }

    /// Append the placeholder for `directive`.
    pub fn directive(mut self, directive: impl Into<Directive>) -> Self {
        let directive = directive.into();
        let index = self.directives.len();
        let placeholder = match &directive {
            Directive::Binding(_) => interpolation(index),
            Directive::Repeat(_) => block_marker(index),
            Directive::Attached(_) => attached_marker(index),
        };
        self.markup.push_str(&placeholder);
        self.directives.push(directive);
        self
    }

    /// Markup written so far, placeholders included.
    pub fn source(&self) -> &str {
        &self.markup
    }

    /// Parse and validate the accumulated template.
    pub fn build(self) -> Result<ViewTemplate> {
        ViewTemplate::new(&self.markup, self.directives)
    }
}
