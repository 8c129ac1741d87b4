//! Error types for template parsing, property access and global configuration.

use thiserror::Error;

/// Errors reported by the template engine and the reactive property system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The markup ended while a construct was still open.
    #[error("unexpected end of markup while parsing {context}")]
    UnexpectedEof {
        /// What the parser was reading when the input ran out.
        context: &'static str,
    },

    /// A `<!--` comment was never terminated.
    #[error("unclosed comment starting at byte {position}")]
    UnclosedComment {
        /// Byte offset of the comment opener.
        position: usize,
    },

    /// A tag could not be parsed.
    #[error("malformed tag at byte {position}")]
    MalformedTag {
        /// Byte offset of the offending `<`.
        position: usize,
    },

    /// A closing tag does not match the innermost open element.
    #[error("closing tag </{found}> at byte {position} does not match open element <{expected}>")]
    MismatchedClosingTag {
        /// Tag name of the innermost open element.
        expected: String,
        /// Tag name found in the closing tag.
        found: String,
        /// Byte offset of the closing tag.
        position: usize,
    },

    /// A closing tag appeared with no element open.
    #[error("closing tag </{tag}> at byte {position} has no open element")]
    UnexpectedClosingTag {
        /// Tag name found in the closing tag.
        tag: String,
        /// Byte offset of the closing tag.
        position: usize,
    },

    /// An element was still open at the end of the markup.
    #[error("element <{tag}> is never closed")]
    UnclosedElement {
        /// Tag name of the unclosed element.
        tag: String,
    },

    /// A placeholder refers past the end of the directive list.
    #[error("placeholder refers to directive {index} but only {count} directives were supplied")]
    DirectiveIndexOutOfRange {
        /// Index embedded in the placeholder.
        index: usize,
        /// Number of directives supplied with the markup.
        count: usize,
    },

    /// A structural or attached directive sits where only a binding may go.
    #[error("directive {index} cannot be used {context}")]
    MisplacedDirective {
        /// Index of the directive.
        index: usize,
        /// Where it was found.
        context: &'static str,
    },

    /// A write targeted a property the object's type never declared.
    #[error("type {type_name} has no reactive property `{property}`")]
    UnknownProperty {
        /// Name of the observable type.
        type_name: String,
        /// Requested property name.
        property: String,
    },

    /// A type declared the same property twice (directly or through its base).
    #[error("property `{property}` is declared more than once on type {type_name}")]
    DuplicateProperty {
        /// Name of the observable type being registered.
        type_name: String,
        /// Property declared twice.
        property: String,
    },

    /// The process-wide HTML policy was already installed.
    #[error("the HTML policy can only be set once")]
    HtmlPolicyAlreadySet,
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for errors raised while parsing template markup.
    pub fn is_markup_error(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedEof { .. }
                | Error::UnclosedComment { .. }
                | Error::MalformedTag { .. }
                | Error::MismatchedClosingTag { .. }
                | Error::UnexpectedClosingTag { .. }
                | Error::UnclosedElement { .. }
                | Error::DirectiveIndexOutOfRange { .. }
                | Error::MisplacedDirective { .. }
        )
    }
}
