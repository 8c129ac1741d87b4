// Template engine
//
// Markup carries three kinds of placeholders, all built around MARKER:
// - interpolation `MARKER{N}MARKER` in text and attribute values
// - structural comments `<!--MARKER:N-->` for block directives
// - attached attributes ` MARKER-N="MARKER{N}MARKER"` for node behaviors
// N indexes the directive list supplied with the markup.
//
// `compiler` turns the parsed markup into a skeleton fragment plus positional
// behavior factories; `view_template` caches that result and stamps out
// `View`s; the behavior modules implement what runs at each position.

mod attached;
mod binding_behavior;
mod builder;
mod compiler;
mod directive;
pub(crate) mod markup;
mod repeat;
mod view;
mod view_template;

pub use attached::{AttachedBehaviorFactory, AttachedDirective, reference};
pub use builder::{TemplateBuilder, html};
pub use directive::{Aspect, Directive, when};
pub use repeat::{RepeatDirective, RepeatOptions, repeat};
pub use view::{Behavior, View};
pub use view_template::ViewTemplate;

/// Token that delimits placeholders in template markup.
pub const MARKER: &str = "rkv-7f3a9c";

/// `MARKER{index}MARKER`.
pub(crate) fn interpolation(index: usize) -> String {
    format!("{MARKER}{{{index}}}{MARKER}")
}

/// `<!--MARKER:index-->`.
pub(crate) fn block_marker(index: usize) -> String {
    format!("<!--{MARKER}:{index}-->")
}

/// ` MARKER-index="MARKER{index}MARKER"`.
pub(crate) fn attached_marker(index: usize) -> String {
    format!(" {MARKER}-{index}=\"{}\"", interpolation(index))
}

/// Directive index of a structural comment, if `data` is one.
pub(crate) fn block_index(data: &str) -> Option<usize> {
    data.strip_prefix(MARKER)?.strip_prefix(':')?.parse().ok()
}

/// One piece of a text or attribute value split on the interpolation marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Part {
    Literal(String),
    Directive(usize),
}

/// Split `value` into literal and placeholder parts.
///
/// Returns None when the value holds no placeholder. Empty literals are
/// dropped. A fragment between markers that is not `{N}` stays literal.
pub(crate) fn parse_content(value: &str) -> Option<Vec<Part>> {
    if !value.contains(MARKER) {
        return None;
    }
    let mut parts = Vec::new();
    let mut literal = String::new();
    for (i, piece) in value.split(MARKER).enumerate() {
        let index = (i % 2 == 1)
            .then(|| piece.strip_prefix('{')?.strip_suffix('}')?.parse::<usize>().ok())
            .flatten();
        match index {
            Some(index) => {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Directive(index));
            }
            None => {
                if i % 2 == 1 {
                    literal.push_str(MARKER);
                }
                literal.push_str(piece);
            }
        }
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    parts
        .iter()
        .any(|part| matches!(part, Part::Directive(_)))
        .then_some(parts)
}
