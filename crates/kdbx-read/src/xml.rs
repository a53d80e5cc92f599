//! Minimal XML pull parser
//!
//! Just enough XML for the KeePass 2 payload: start/end/self-closing tags,
//! quoted and bare attributes, processing instructions, character data with
//! the predefined entities. The reader walks tags lazily over a borrowed
//! string; `read_from_current` scopes a sub-reader to one element so each
//! parse function only ever sees its own subtree.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// One scanned tag. `is_open && is_close` marks a self-closing tag;
/// `position` is the byte range of the tag in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub is_meta: bool,
    pub is_open: bool,
    pub is_close: bool,
    pub position: (usize, usize),
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

pub struct XmlReader<'a> {
    contents: &'a str,
    current: XmlElement,
}

impl<'a> XmlReader<'a> {
    pub fn new(contents: &'a str) -> Result<Self> {
        let first = read_next_tag(contents, 0)?
            .ok_or_else(|| Error::Xml("no elements found".into()))?;
        Ok(Self {
            contents,
            current: first,
        })
    }

    pub fn current(&self) -> &XmlElement {
        &self.current
    }

    /// A sub-reader covering the current element and its subtree. The outer
    /// reader advances past the element.
    pub fn read_from_current(&mut self) -> Result<XmlReader<'a>> {
        let end = if self.current.is_close {
            self.current.clone()
        } else {
            self.find_end_of_current_element()?.ok_or_else(|| {
                Error::Xml(format!("unclosed element {:?}", self.current.name))
            })?
        };

        let reader = XmlReader::new(&self.contents[self.current.position.0..end.position.1])?;
        self.skip_current_element()?;
        Ok(reader)
    }

    /// Advances to the next opening tag. Returns false at end of input.
    pub fn read_next_start_element(&mut self) -> Result<bool> {
        let mut position = self.current.position.1;
        while let Some(tag) = read_next_tag(self.contents, position)? {
            position = tag.position.1;
            if tag.is_open {
                self.current = tag;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Moves past the current element, subtree included.
    pub fn skip_current_element(&mut self) -> Result<()> {
        if !self.current.is_open {
            return Ok(());
        }

        if self.current.is_close {
            // Self-closing: the tag is its own end tag, so scanning resumes
            // right after it and the next sibling stays visible.
            self.current.is_open = false;
        } else {
            self.current = self.find_end_of_current_element()?.ok_or_else(|| {
                Error::Xml(format!("unclosed element {:?}", self.current.name))
            })?;
        }
        Ok(())
    }

    /// The character data of the current element, entities decoded. Leaves
    /// the reader on the element's closing tag.
    pub fn read_element_text(&mut self) -> Result<String> {
        if !self.current.is_open {
            return Err(Error::Xml(format!(
                "cannot read text from non-open element {:?}",
                self.current.name
            )));
        }
        if self.current.is_close {
            return Ok(String::new());
        }

        let text_start = self.current.position.1;
        let end = self.find_end_of_current_element()?.ok_or_else(|| {
            Error::Xml(format!("unclosed element {:?}", self.current.name))
        })?;
        let text = &self.contents[text_start..end.position.0];
        self.current = end;
        decode_entities(text)
    }

    fn find_end_of_current_element(&self) -> Result<Option<XmlElement>> {
        let mut depth = 0usize;
        let mut position = self.current.position.1;

        while let Some(tag) = read_next_tag(self.contents, position)? {
            position = tag.position.1;
            if tag.is_meta || tag.name != self.current.name {
                continue;
            }
            if tag.is_open && tag.is_close {
                // Self-closing same-name child, no scope change.
            } else if tag.is_open {
                depth += 1;
            } else if depth > 0 {
                depth -= 1;
            } else {
                return Ok(Some(tag));
            }
        }
        Ok(None)
    }
}

fn read_next_tag(contents: &str, start: usize) -> Result<Option<XmlElement>> {
    let Some(open) = contents[start..].find('<') else {
        return Ok(None);
    };
    let open = start + open;
    let Some(close) = contents[open..].find('>') else {
        return Ok(None);
    };
    let close = open + close;

    let position = (open, close + 1);
    let mut inside = &contents[open + 1..close];
    let mut is_meta = false;
    let mut is_open = true;
    let mut is_close = false;

    if let Some(stripped) = inside.strip_prefix('?') {
        is_meta = true;
        is_open = false;
        inside = stripped.strip_suffix('?').unwrap_or(stripped);
    }
    if let Some(stripped) = inside.strip_suffix('/') {
        is_close = true;
        inside = stripped;
    }
    if let Some(stripped) = inside.strip_prefix('/') {
        is_open = false;
        is_close = true;
        inside = stripped;
    }

    let inside = inside.trim();
    let (name, rest) = match inside.find(char::is_whitespace) {
        Some(split) => (&inside[..split], &inside[split..]),
        None => (inside, ""),
    };

    Ok(Some(XmlElement {
        name: name.to_owned(),
        attributes: split_attributes(rest)?,
        is_meta,
        is_open,
        is_close,
        position,
    }))
}

fn split_attributes(input: &str) -> Result<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    let mut remaining = input.trim_start();

    while !remaining.is_empty() {
        let name_end = remaining
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(remaining.len());
        let name = &remaining[..name_end];
        if name.is_empty() {
            return Err(Error::Xml(format!("unexpected attribute format {remaining:?}")));
        }
        remaining = &remaining[name_end..];

        let value = if let Some(rest) = remaining.strip_prefix('=') {
            let quote = rest
                .chars()
                .next()
                .ok_or_else(|| Error::Xml("attribute value missing".into()))?;
            if quote != '"' && quote != '\'' {
                return Err(Error::Xml(format!("unquoted attribute value for {name:?}")));
            }
            let rest = &rest[1..];
            let end = rest
                .find(quote)
                .ok_or_else(|| Error::Xml(format!("unterminated attribute value for {name:?}")))?;
            let value = decode_entities(&rest[..end])?;
            remaining = &rest[end + 1..];
            value
        } else {
            // Bare attribute, present means true.
            "true".to_owned()
        };

        if attributes.insert(name.to_owned(), value).is_some() {
            return Err(Error::DuplicateAttribute(name.to_owned()));
        }
        remaining = remaining.trim_start();
    }

    Ok(attributes)
}

/// Decodes the predefined entities plus decimal and hex character
/// references. Unknown entities are fatal.
pub fn decode_entities(input: &str) -> Result<String> {
    if !input.contains('&') {
        return Ok(input.to_owned());
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let end = rest
            .find(';')
            .ok_or_else(|| Error::Xml("unterminated entity".into()))?;
        let entity = &rest[1..end];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse))
                    .transpose()
                    .ok()
                    .flatten()
                    .ok_or_else(|| Error::Xml(format!("unknown entity {entity:?}")))?;
                out.push(
                    char::from_u32(code)
                        .ok_or_else(|| Error::Xml(format!("invalid character reference {entity:?}")))?,
                );
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
