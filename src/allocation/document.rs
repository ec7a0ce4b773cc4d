//! Recursive-descent reader for the allocation document format.
//!
//! Allocation files are written in an XML-like syntax: a prolog, comments,
//! nested elements with quoted attributes, text content, and the usual
//! named/numeric character references. This module parses exactly that
//! subset into an [`Element`] tree. It is not a general XML parser (no
//! namespaces, CDATA, or DTDs) and the allocation format needs none of
//! those.
//!
//! Errors carry the line and column of the offending byte so a bad edit to
//! a live file is easy to find.

use thiserror::Error;

/// A well-formedness error in the allocation document.
#[derive(Debug, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct DocumentError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// One element of the document tree: name, attributes in document order,
/// child elements, and accumulated text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text content with surrounding ASCII whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Parse a complete document into its single top-level element.
pub fn parse_document(src: &str) -> Result<Element, DocumentError> {
    let mut reader = Reader::new(src);
    reader.skip_misc()?;
    let root = reader.parse_element()?;
    reader.skip_misc()?;
    if !reader.at_end() {
        return Err(reader.error("content after the top-level element"));
    }
    Ok(root)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    fn error(&self, message: impl Into<String>) -> DocumentError {
        let consumed = &self.src[..self.pos.min(self.src.len())];
        let line = consumed.bytes().filter(|&b| b == b'\n').count() + 1;
        let column = consumed
            .rsplit_once('\n')
            .map(|(_, tail)| tail.chars().count())
            .unwrap_or_else(|| consumed.chars().count())
            + 1;
        DocumentError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_ascii_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, `<?...?>` prologs, and `<!-- -->` comments.
    fn skip_misc(&mut self) -> Result<(), DocumentError> {
        loop {
            self.skip_ascii_whitespace();
            if self.starts_with("<?") {
                self.skip_until("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_until("-->")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_until(&mut self, terminator: &str) -> Result<(), DocumentError> {
        match self.src[self.pos..].find(terminator) {
            Some(offset) => {
                self.pos += offset + terminator.len();
                Ok(())
            }
            None => Err(self.error(format!("unterminated '{terminator}' section"))),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), DocumentError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    /// An element or attribute name: leading letter or underscore, then
    /// letters, digits, '-', '_', or '.'.
    fn read_name(&mut self) -> Result<&'a str, DocumentError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => return Err(self.error("expected a name")),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(&self.src[start..self.pos])
    }

    fn parse_element(&mut self) -> Result<Element, DocumentError> {
        self.expect(b'<')?;
        let name = self.read_name()?.to_string();
        let mut element = Element {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        };

        // Attribute list, ending at '>' or the self-closing '/>'.
        loop {
            self.skip_ascii_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let attr_name = self.read_name()?.to_string();
                    self.skip_ascii_whitespace();
                    self.expect(b'=')?;
                    self.skip_ascii_whitespace();
                    let quote = match self.peek() {
                        Some(q @ (b'"' | b'\'')) => q,
                        _ => return Err(self.error("expected a quoted attribute value")),
                    };
                    self.pos += 1;
                    let value = self.read_text(&[quote])?;
                    self.expect(quote)?;
                    element.attributes.push((attr_name, value));
                }
                None => return Err(self.error("unterminated element start tag")),
            }
        }

        // Content: text, comments, and child elements up to the close tag.
        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.read_name()?;
                if close != element.name {
                    return Err(self.error(format!(
                        "mismatched close tag '</{close}>' for '<{}>'",
                        element.name
                    )));
                }
                self.skip_ascii_whitespace();
                self.expect(b'>')?;
                return Ok(element);
            } else if self.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if self.peek() == Some(b'<') {
                element.children.push(self.parse_element()?);
            } else if self.at_end() {
                return Err(self.error(format!("unclosed element '<{}>'", element.name)));
            } else {
                let chunk = self.read_text(&[b'<'])?;
                element.text.push_str(&chunk);
            }
        }
    }

    /// Read text up to (not including) any stop byte, decoding character
    /// references along the way.
    fn read_text(&mut self, stops: &[u8]) -> Result<String, DocumentError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Ok(out),
                Some(b) if stops.contains(&b) => return Ok(out),
                Some(b'&') => out.push(self.read_char_reference()?),
                Some(_) => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if b == b'&' || stops.contains(&b) {
                            break;
                        }
                        self.pos += 1;
                    }
                    out.push_str(&self.src[start..self.pos]);
                }
            }
        }
    }

    fn read_char_reference(&mut self) -> Result<char, DocumentError> {
        debug_assert_eq!(self.peek(), Some(b'&'));
        let start = self.pos;
        self.pos += 1;
        let end = match self.src[self.pos..].find(';') {
            Some(offset) if offset <= 8 => self.pos + offset,
            _ => return Err(self.error("unterminated character reference")),
        };
        let src = self.src;
        let body = &src[self.pos..end];
        self.pos = end + 1;
        let decoded = match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| body.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        decoded.ok_or_else(|| {
            self.pos = start;
            self.error(format!("unknown character reference '&{body};'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_text() {
        let doc = parse_document(
            "<?xml version=\"1.0\"?>\n\
             <allocations>\n\
               <queue name=\"queueA\">\n\
                 <maxRunningApps>3</maxRunningApps>\n\
               </queue>\n\
             </allocations>",
        )
        .unwrap();

        assert_eq!(doc.name, "allocations");
        assert_eq!(doc.children.len(), 1);
        let queue = &doc.children[0];
        assert_eq!(queue.attr("name"), Some("queueA"));
        assert_eq!(queue.children[0].trimmed_text(), "3");
    }

    #[test]
    fn parses_self_closing_and_single_quotes() {
        let doc = parse_document("<allocations><rule name='default' /></allocations>").unwrap();
        assert_eq!(doc.children[0].attr("name"), Some("default"));
        assert!(doc.children[0].children.is_empty());
    }

    #[test]
    fn skips_comments() {
        let doc = parse_document(
            "<allocations><!-- give queue A a limit --><queue name=\"a\"/></allocations>",
        )
        .unwrap();
        assert_eq!(doc.children.len(), 1);
    }

    #[test]
    fn decodes_character_references() {
        let doc = parse_document("<q name=\"&#xa0;\">a &amp; b</q>").unwrap();
        assert_eq!(doc.attr("name"), Some("\u{00a0}"));
        assert_eq!(doc.trimmed_text(), "a & b");
    }

    #[test]
    fn rejects_mismatched_close_tag() {
        let err = parse_document("<allocations><queue></pool></allocations>").unwrap_err();
        assert!(err.message.contains("mismatched"));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_document("<allocations/><extra/>").is_err());
    }

    #[test]
    fn error_positions_are_one_based() {
        let err = parse_document("<a>\n  <b>\n</a>").unwrap_err();
        assert_eq!(err.line, 3);
    }
}
