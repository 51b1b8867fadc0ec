//! XML document tree for decoded `application/xml` and `text/xml` bodies.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::DecodeError;

/// An XML element with its attributes, text, and children.
///
/// Mixed content is kept in the `ElementTree` style: `text` holds the
/// content before the first child, and each child's `tail` holds the content
/// that follows it inside the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified tag name (prefix included).
    pub tag: String,
    /// Attributes, excluding namespace declarations.
    pub attrs: BTreeMap<String, String>,
    /// Text before the first child.
    pub text: String,
    /// Text after this element's end tag, up to the next sibling.
    pub tail: String,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Parse an XML document and return its root element.
pub fn parse_document(input: &str) -> Result<XmlElement, DecodeError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    // Open elements, innermost last. The root is finished when the stack empties.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DecodeError::xml(e.to_string()))?;

        match event {
            Event::Start(e) => {
                if root.is_some() {
                    return Err(DecodeError::xml("content after root element"));
                }
                stack.push(start_element(&reader, &e));
            }
            Event::Empty(e) => {
                if root.is_some() {
                    return Err(DecodeError::xml("content after root element"));
                }
                let element = start_element(&reader, &e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(DecodeError::xml("unexpected end tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(e) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| DecodeError::xml(e.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Event::GeneralRef(e) => {
                let entity = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| DecodeError::xml(e.to_string()))?;
                let text = decode_entity(&entity)?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(DecodeError::xml("unexpected end of document"));
    }
    root.ok_or_else(|| DecodeError::xml("document has no root element"))
}

fn start_element(reader: &Reader<&[u8]>, e: &BytesStart) -> XmlElement {
    let name = e.name();
    let tag = reader.decoder().decode(name.as_ref()).map_or_else(
        |_| String::from_utf8_lossy(name.as_ref()).into_owned(),
        std::borrow::Cow::into_owned,
    );

    let mut attrs = BTreeMap::new();
    for attr in e.attributes().flatten() {
        let key = reader.decoder().decode(attr.key.as_ref()).map_or_else(
            |_| String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            std::borrow::Cow::into_owned,
        );
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            std::borrow::Cow::into_owned,
        );
        attrs.insert(key, value);
    }

    XmlElement {
        tag,
        attrs,
        ..Default::default()
    }
}

/// Append text to the innermost open element: its text, or its last child's tail.
///
/// Whitespace outside the root is ignored; anything else there is an error.
fn append_text(stack: &mut [XmlElement], text: &str) -> Result<(), DecodeError> {
    let Some(node) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(DecodeError::xml("text outside root element"));
    };
    match node.children.last_mut() {
        Some(last_child) => last_child.tail.push_str(text),
        None => node.text.push_str(text),
    }
    Ok(())
}

/// Resolve a predefined or numeric entity reference.
fn decode_entity(entity: &str) -> Result<String, DecodeError> {
    let resolved = match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        s if s.starts_with("#x") || s.starts_with("#X") => {
            u32::from_str_radix(&s[2..], 16).ok().and_then(char::from_u32)
        }
        s if s.starts_with('#') => s[1..].parse::<u32>().ok().and_then(char::from_u32),
        _ => None,
    };
    resolved
        .map(String::from)
        .ok_or_else(|| DecodeError::xml(format!("unknown entity: &{entity};")))
}
