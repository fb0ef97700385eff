//! Generic XML to JSON-value tree conversion.
//!
//! Webhook bodies are arbitrary XML documents whose shape differs per
//! notification type, so instead of typed serde structs the document is folded
//! into a [`serde_json::Value`] tree:
//!
//! - an element holding only text (or nothing) becomes a string,
//! - an element with attributes or children becomes an object, with
//!   attributes under [`ATTRIBUTES_KEY`] and its own text under [`TEXT_KEY`],
//! - sibling elements sharing a tag name are collected into an array.
//!
//! Text is kept as written, including surrounding whitespace. Text that is
//! whitespace only, such as indentation between child elements, is dropped
//! unless it came from a CDATA section.
//!
//! ```xml
//! <account><account_code>1</account_code><total type="integer">10</total></account>
//! ```
//!
//! becomes
//!
//! ```json
//! {"account": {"account_code": "1", "total": {"$": {"type": "integer"}, "_": "10"}}}
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

/// Object key holding an element's attributes.
pub const ATTRIBUTES_KEY: &str = "$";

/// Object key holding an element's text when it also has attributes or children.
///
/// Child elements literally named `_` share this key: the element's own text
/// comes first, followed by the children's values, all collected into one
/// array. The same holds for `$` and [`ATTRIBUTES_KEY`].
pub const TEXT_KEY: &str = "_";

/// An element that has been opened but not yet closed.
#[derive(Debug, Default)]
struct Frame {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
    cdata: bool,
}

impl Frame {
    fn open(start: &BytesStart<'_>, position: usize) -> ParseResult<Self> {
        let name = utf8(start.name().as_ref(), position)?.to_string();
        if name.is_empty() {
            return Err(ParseError::InvalidXmlStructure(format!(
                "element without a name at byte {position}"
            )));
        }

        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| malformed(position, e))?;
            let key = utf8(attribute.key.as_ref(), position)?.to_string();
            let value = attribute
                .unescape_value()
                .map_err(|e| malformed(position, e))?;
            attributes.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn into_value(mut self) -> Value {
        if !self.cdata && self.text.trim().is_empty() {
            self.text.clear();
        }

        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(self.attributes));
        }
        if !self.text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        for (name, value) in self.children {
            insert_child(&mut object, name, value);
        }
        Value::Object(object)
    }
}

/// Add `value` under `name`, turning repeated names into an array.
fn insert_child(object: &mut Map<String, Value>, name: String, value: Value) {
    match object.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            object.insert(name, value);
        }
    }
}

fn utf8(bytes: &[u8], position: usize) -> ParseResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| malformed(position, e))
}

fn malformed(position: usize, error: impl std::fmt::Display) -> ParseError {
    ParseError::MalformedXml {
        position,
        message: error.to_string(),
    }
}

/// Parse an XML document into its root tag name and the root element's value.
///
/// Declarations, comments, processing instructions and doctypes are skipped.
/// Exactly one root element is allowed and no text may appear outside it.
pub fn parse_document(xml: &str) -> ParseResult<(String, Value)> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|e| malformed(position, e))?;

        match event {
            Event::Start(start) => {
                reject_second_root(&root, position)?;
                stack.push(Frame::open(&start, position)?);
            }
            Event::Empty(start) => {
                reject_second_root(&root, position)?;
                let frame = Frame::open(&start, position)?;
                close(frame, &mut stack, &mut root);
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or_else(|| {
                    ParseError::InvalidXmlStructure(format!(
                        "closing tag without an open element at byte {position}"
                    ))
                })?;
                close(frame, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| malformed(position, e))?;
                append_text(&mut stack, &text, false, position)?;
            }
            Event::CData(data) => {
                let bytes = data.into_inner();
                let text = utf8(&bytes, position)?;
                append_text(&mut stack, text, true, position)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::InvalidXmlStructure(format!(
            "unclosed element <{}>",
            open.name
        )));
    }

    root.ok_or(ParseError::MissingRootElement)
}

fn reject_second_root(root: &Option<(String, Value)>, position: usize) -> ParseResult<()> {
    match root {
        Some((name, _)) => Err(ParseError::InvalidXmlStructure(format!(
            "second root element at byte {position} after <{name}>"
        ))),
        None => Ok(()),
    }
}

fn close(frame: Frame, stack: &mut [Frame], root: &mut Option<(String, Value)>) {
    let name = frame.name.clone();
    let value = frame.into_value();
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.children, name, value),
        None => *root = Some((name, value)),
    }
}

fn append_text(stack: &mut [Frame], text: &str, cdata: bool, position: usize) -> ParseResult<()> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            frame.cdata |= cdata;
            Ok(())
        }
        // Whitespace around the root element
        None if !cdata && text.trim().is_empty() => Ok(()),
        None => Err(ParseError::InvalidXmlStructure(format!(
            "text outside the root element at byte {position}"
        ))),
    }
}
