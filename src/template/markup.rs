//! Markup parser producing render-tree fragments.
//!
//! Accepts the HTML subset templates are written in: elements with quoted,
//! unquoted or valueless attributes, void and self-closed elements, text,
//! comments and character references. Closing tags must match; there is no
//! implied-end-tag recovery.

use crate::dom::{Node, VOID_ELEMENTS};
use crate::error::{Error, Result};

/// Parse `markup` into a new fragment node.
///
/// On error every node created so far is released.
pub(crate) fn parse_fragment(markup: &str) -> Result<Node> {
    let root = Node::fragment();
    let mut parser = Parser {
        input: markup,
        pos: 0,
        open: vec![(root, String::new())],
    };
    match parser.run() {
        Ok(()) => Ok(root),
        Err(error) => {
            root.release();
            Err(error)
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Open elements, the fragment root first.
    open: Vec<(Node, String)>,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn current(&self) -> Node {
        self.open.last().map_or_else(Node::fragment, |(node, _)| *node)
    }

    fn run(&mut self) -> Result<()> {
        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.comment()?;
            } else if rest.starts_with("</") {
                self.end_tag()?;
            } else if rest.starts_with("<!") {
                // doctype and other declarations carry nothing for templates
                let end = rest.find('>').ok_or(Error::UnexpectedEof {
                    context: "declaration",
                })?;
                self.pos += end + 1;
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.start_tag()?;
            } else {
                self.text();
            }
        }
        match self.open.len() {
            1 => Ok(()),
            _ => Err(Error::UnclosedElement {
                tag: self.open.last().map(|(_, tag)| tag.clone()).unwrap_or_default(),
            }),
        }
    }

    fn comment(&mut self) -> Result<()> {
        let start = self.pos;
        let body = &self.input[start + 4..];
        let end = body
            .find("-->")
            .ok_or(Error::UnclosedComment { position: start })?;
        self.current().append_child(Node::comment(&body[..end]));
        self.pos = start + 4 + end + 3;
        Ok(())
    }

    fn text(&mut self) {
        let rest = self.rest();
        // a '<' that cannot open markup is plain text
        let end = rest
            .char_indices()
            .skip(1)
            .find(|&(i, c)| {
                c == '<'
                    && rest[i + 1..]
                        .starts_with(|n: char| n.is_ascii_alphabetic() || n == '/' || n == '!')
            })
            .map_or(rest.len(), |(i, _)| i);
        let text = decode_entities(&rest[..end]);
        self.current().append_child(Node::text(&text));
        self.pos += end;
    }

    fn end_tag(&mut self) -> Result<()> {
        let start = self.pos;
        let rest = &self.input[start + 2..];
        let end = rest.find('>').ok_or(Error::UnexpectedEof {
            context: "closing tag",
        })?;
        let tag = rest[..end].trim().to_ascii_lowercase();
        if tag.is_empty() || !tag.chars().all(is_name_char) {
            return Err(Error::MalformedTag { position: start });
        }
        if self.open.len() == 1 {
            return Err(Error::UnexpectedClosingTag {
                tag,
                position: start,
            });
        }
        let expected = self.open.last().map(|(_, t)| t.as_str()).unwrap_or_default();
        if expected != tag {
            return Err(Error::MismatchedClosingTag {
                expected: expected.to_owned(),
                found: tag,
                position: start,
            });
        }
        self.open.pop();
        self.pos = start + 2 + end + 1;
        Ok(())
    }

    fn start_tag(&mut self) -> Result<()> {
        let start = self.pos;
        self.pos += 1;
        let name = self.take_while(is_name_char).to_ascii_lowercase();
        let element = Node::element(&name);
        self.current().append_child(element);

        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(Error::UnexpectedEof { context: "tag" });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            let attribute = self.take_while(|c| {
                !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'')
            });
            if attribute.is_empty() {
                return Err(Error::MalformedTag { position: start });
            }
            let attribute = attribute.to_owned();
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value()?
            } else {
                String::new()
            };
            if !element.has_attribute(&attribute) {
                element.set_attribute(&attribute, &value);
            }
        };

        if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
            self.open.push((element, name));
        }
        Ok(())
    }

    fn attribute_value(&mut self) -> Result<String> {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            Some(_) => {
                let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
                return Ok(decode_entities(raw));
            }
            None => return Err(Error::UnexpectedEof { context: "attribute value" }),
        };
        let end = rest[1..].find(quote).ok_or(Error::UnexpectedEof {
            context: "attribute value",
        })?;
        let value = decode_entities(&rest[1..1 + end]);
        self.pos += end + 2;
        Ok(value)
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &str {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !predicate(c))
            .unwrap_or(self.input.len() - start);
        self.pos += len;
        &self.input[start..start + len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Replace character references; unknown ones stay as written.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let name = &rest[1..end];
            let c = match name {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                "nbsp" => '\u{a0}',
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                        None => name.strip_prefix('#')?.parse().ok()?,
                    };
                    char::from_u32(code)?
                }
            };
            Some((c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(markup: &str) -> String {
        let fragment = parse_fragment(markup).unwrap();
        let html = fragment.outer_html();
        fragment.release();
        html
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        assert_eq!(
            round_trip("<div id=main class='a b'><input disabled><br/>hi <b>there</b></div>"),
            "<div id=\"main\" class=\"a b\"><input disabled><br>hi <b>there</b></div>"
        );
    }

    #[test]
    fn keeps_comments_and_stray_angle_brackets() {
        assert_eq!(round_trip("a < b<!--c-->"), "a &lt; b<!--c-->");
    }

    #[test]
    fn decodes_character_references() {
        let fragment = parse_fragment("&lt;&#65;&#x42;&amp;&unknown;").unwrap();
        assert_eq!(fragment.text_content(), "<AB&&unknown;");
        fragment.release();
    }

    #[test]
    fn attribute_names_keep_their_case() {
        let fragment = parse_fragment("<p :innerHTML=x></p>").unwrap();
        let p = fragment.first_child().unwrap();
        assert_eq!(p.get_attribute(":innerHTML").as_deref(), Some("x"));
        fragment.release();
    }

    #[test]
    fn reports_structural_errors() {
        assert_eq!(
            parse_fragment("<div></span>"),
            Err(Error::MismatchedClosingTag {
                expected: "div".into(),
                found: "span".into(),
                position: 5,
            })
        );
        assert_eq!(
            parse_fragment("</p>"),
            Err(Error::UnexpectedClosingTag {
                tag: "p".into(),
                position: 0,
            })
        );
        assert_eq!(
            parse_fragment("<ul><li>"),
            Err(Error::UnclosedElement { tag: "li".into() })
        );
        assert_eq!(
            parse_fragment("x<!-- open"),
            Err(Error::UnclosedComment { position: 1 })
        );
        assert_eq!(
            parse_fragment("<a href=\"x"),
            Err(Error::UnexpectedEof {
                context: "attribute value"
            })
        );
    }

    #[test]
    fn failed_parse_releases_nodes() {
        let before = crate::arena::node_arena::node_arena_len();
        assert!(parse_fragment("<div><p>text</div>").is_err());
        assert_eq!(crate::arena::node_arena::node_arena_len(), before);
    }
}
