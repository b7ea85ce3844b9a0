//! Generic element carrier
//!
//! Every frame body is one flat element: a name, an ordered attribute list
//! and text content. Only the subset of XML the signaling peers emit is
//! understood: no nesting, no comments, no CDATA. A leading `<?xml ...?>`
//! declaration is skipped.

use crate::{Error, Result};

/// One protocol element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    /// Insertion order is kept on the wire
    pub attributes: Vec<(String, String)>,
    pub content: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            content: String::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Look up an attribute value by name (first match wins)
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Render as element text
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.name.len() * 2 + self.content.len() + 16);
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, true, &mut out);
            out.push('"');
        }
        out.push('>');
        escape_into(&self.content, false, &mut out);
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
        out
    }

    /// Parse element text
    pub fn parse(text: &str) -> Result<Self> {
        let mut cursor = Cursor::new(skip_declaration(text.trim())?);

        cursor.expect('<')?;
        let name = cursor.take_name()?;
        let mut element = Element::new(name);

        loop {
            cursor.skip_whitespace();
            match cursor.peek() {
                Some('>') => {
                    cursor.bump();
                    break;
                }
                Some('/') => {
                    cursor.bump();
                    cursor.expect('>')?;
                    return cursor.finish(element);
                }
                Some(_) => {
                    let attr = cursor.take_name()?;
                    cursor.skip_whitespace();
                    cursor.expect('=')?;
                    cursor.skip_whitespace();
                    let value = cursor.take_quoted()?;
                    element.attributes.push((attr.to_string(), unescape(value)?));
                }
                None => return Err(Error::Malformed("unterminated start tag".into())),
            }
        }

        let raw = cursor.take_until('<');
        element.content = unescape(raw)?;

        cursor.expect('<')?;
        cursor.expect('/')?;
        let closing = cursor.take_name()?;
        if closing != element.name {
            return Err(Error::Malformed(format!(
                "<{}> closed by </{}>",
                element.name, closing
            )));
        }
        cursor.skip_whitespace();
        cursor.expect('>')?;
        cursor.finish(element)
    }
}

fn skip_declaration(text: &str) -> Result<&str> {
    if let Some(rest) = text.strip_prefix("<?") {
        let end = rest
            .find("?>")
            .ok_or_else(|| Error::Malformed("unterminated declaration".into()))?;
        Ok(rest[end + 2..].trim_start())
    } else {
        Ok(text)
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(Error::Malformed(format!(
                "expected '{}' at offset {}, found '{}'",
                expected, self.pos, c
            ))),
            None => Err(Error::Malformed(format!(
                "expected '{}' at offset {}, found end of input",
                expected, self.pos
            ))),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn take_name(&mut self) -> Result<&'a str> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.bump();
        }
        if self.pos == start {
            return Err(Error::Malformed(format!("expected a name at offset {}", start)));
        }
        Ok(&self.text[start..self.pos])
    }

    fn take_quoted(&mut self) -> Result<&'a str> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(Error::Malformed("attribute value must be quoted".into())),
        };
        self.bump();
        let rest = self.rest();
        let end = rest
            .find(quote)
            .ok_or_else(|| Error::Malformed("unterminated attribute value".into()))?;
        let value = &rest[..end];
        if value.contains('<') {
            return Err(Error::Malformed("'<' in attribute value".into()));
        }
        self.pos += end + quote.len_utf8();
        Ok(value)
    }

    fn take_until(&mut self, stop: char) -> &'a str {
        let rest = self.rest();
        let end = rest.find(stop).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn finish(mut self, element: Element) -> Result<Element> {
        self.skip_whitespace();
        if self.pos != self.text.len() {
            return Err(Error::Malformed(format!(
                "trailing data after </{}>",
                element.name
            )));
        }
        Ok(element)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' if attribute => out.push_str("&#xD;"),
            '\n' if attribute => out.push_str("&#xA;"),
            '\t' if attribute => out.push_str("&#x9;"),
            _ => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| Error::Malformed("unterminated entity reference".into()))?;
        let entity = &after[..semi];
        let decoded = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_ref(entity)?,
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_char_ref(entity: &str) -> Result<char> {
    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };

    code.and_then(char::from_u32)
        .ok_or_else(|| Error::Malformed(format!("unknown entity &{};", entity)))
}
