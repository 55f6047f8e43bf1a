//! XML property list parsing
//!
//! Turns the Apple plist XML dialect into a generic [`PlistValue`] tree.
//! Nothing in here knows about iTunes; see `schema` for that.
//!
//! Supported elements: `<plist>`, `<dict>`, `<key>`, `<array>`, `<string>`,
//! `<integer>`, `<real>`, `<true/>`, `<false/>`, `<date>`, `<data>`.
//!
//! Nesting is tracked on an explicit stack rather than by recursion, so the
//! depth of a document is bounded by memory only.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A single property list value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum PlistValue {
    Dict(Dict),
    Array(Vec<PlistValue>),
    String(String),
    Integer(Integer),
    Real(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
}

impl PlistValue {
    /// Element-style name of the variant, used in type mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            PlistValue::Dict(_) => "dict",
            PlistValue::Array(_) => "array",
            PlistValue::String(_) => "string",
            PlistValue::Integer(i) if i.as_signed().is_none() => "unsigned integer",
            PlistValue::Integer(_) => "integer",
            PlistValue::Real(_) => "real",
            PlistValue::Boolean(_) => "boolean",
            PlistValue::Date(_) => "date",
            PlistValue::Data(_) => "data",
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PlistValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            PlistValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlistValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Signed value, `None` for non-integers and values above `i64::MAX`
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PlistValue::Integer(i) => i.as_signed(),
            _ => None,
        }
    }

    pub fn as_unsigned_integer(&self) -> Option<u64> {
        match self {
            PlistValue::Integer(i) => i.as_unsigned(),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            PlistValue::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlistValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PlistValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            PlistValue::Data(d) => Some(d),
            _ => None,
        }
    }
}

/// `<integer>` content, anywhere in the `i64` or `u64` range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Integer(i128);

impl Integer {
    pub fn as_signed(self) -> Option<i64> {
        i64::try_from(self.0).ok()
    }

    pub fn as_unsigned(self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    fn parse(text: &str) -> Option<Self> {
        text.parse::<i64>()
            .map(Self::from)
            .or_else(|_| text.parse::<u64>().map(Self::from))
            .ok()
    }
}

impl From<i64> for Integer {
    fn from(value: i64) -> Self {
        Self(value as i128)
    }
}

impl From<u64> for Integer {
    fn from(value: u64) -> Self {
        Self(value as i128)
    }
}

impl Serialize for Integer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_signed() {
            Some(i) => serializer.serialize_i64(i),
            // only values above i64::MAX fail the signed conversion
            None => serializer.serialize_u64(self.0 as u64),
        }
    }
}

/// Ordered dictionary with unique keys
///
/// Iteration follows document order. Lookups go through a key index so the
/// large `Tracks` dictionary stays linear to build.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(String, PlistValue)>,
    index: HashMap<String, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new key. Returns the value back if the key already exists.
    pub fn insert(&mut self, key: String, value: PlistValue) -> std::result::Result<(), PlistValue> {
        if self.index.contains_key(&key) {
            return Err(value);
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &PlistValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Serialize for Dict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Parse an XML property list from memory
pub fn parse(bytes: &[u8]) -> Result<PlistValue> {
    let (body, offset) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, UTF8_BOM.len()),
        None => (bytes, 0),
    };
    PlistParser::new(body, offset).parse()
}

/// Read and parse an XML property list file
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<PlistValue> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&bytes)
}

/// An open container waiting for its closing tag
enum Frame {
    Dict { dict: Dict, key: Option<String> },
    Array(Vec<PlistValue>),
}

struct PlistParser<'a> {
    reader: Reader<&'a [u8]>,
    /// Bytes stripped before the reader's input (BOM)
    offset: usize,
    stack: Vec<Frame>,
    root: Option<PlistValue>,
}

impl<'a> PlistParser<'a> {
    fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self {
            reader: Reader::from_reader(bytes),
            offset,
            stack: Vec::new(),
            root: None,
        }
    }

    fn position(&self) -> usize {
        self.offset + self.reader.buffer_position()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::malformed(self.position(), message)
    }

    fn parse(mut self) -> Result<PlistValue> {
        match self.next_markup()? {
            Event::Start(e) if e.name().as_ref() == b"plist" => {}
            Event::Empty(e) if e.name().as_ref() == b"plist" => {
                return Err(self.error("empty <plist> element"));
            }
            Event::Start(e) | Event::Empty(e) => {
                return Err(self.error(format!(
                    "expected <plist> root element, found <{}>",
                    tag_name(&e)
                )));
            }
            Event::Eof => return Err(self.error("document has no root element")),
            _ => return Err(self.error("expected <plist> root element")),
        }

        let value = self.parse_body()?;

        match self.next_markup()? {
            Event::Eof => Ok(value),
            _ => Err(self.error("unexpected content after </plist>")),
        }
    }

    /// Consume everything up to and including `</plist>`
    fn parse_body(&mut self) -> Result<PlistValue> {
        loop {
            match self.next_markup()? {
                Event::Start(e) => {
                    if self.expects_key() {
                        self.require_key(&e)?;
                        let key = self.read_text("key")?;
                        self.set_key(key)?;
                        continue;
                    }
                    match e.name().as_ref() {
                        b"dict" => self.stack.push(Frame::Dict {
                            dict: Dict::new(),
                            key: None,
                        }),
                        b"array" => self.stack.push(Frame::Array(Vec::new())),
                        b"true" | b"false" => {
                            let flag = e.name().as_ref() == b"true";
                            let tag = if flag { "true" } else { "false" };
                            let text = self.read_text(tag)?;
                            if !text.trim().is_empty() {
                                return Err(self.error(format!("<{}> must be empty", tag)));
                            }
                            self.complete(PlistValue::Boolean(flag))?;
                        }
                        name => {
                            let tag = scalar_tag(name).ok_or_else(|| {
                                self.error(format!("unknown element <{}>", tag_name(&e)))
                            })?;
                            let text = self.read_text(tag)?;
                            let value = self.scalar(tag, text)?;
                            self.complete(value)?;
                        }
                    }
                }
                Event::Empty(e) => {
                    if self.expects_key() {
                        self.require_key(&e)?;
                        self.set_key(String::new())?;
                        continue;
                    }
                    let value = match e.name().as_ref() {
                        b"dict" => PlistValue::Dict(Dict::new()),
                        b"array" => PlistValue::Array(Vec::new()),
                        b"true" => PlistValue::Boolean(true),
                        b"false" => PlistValue::Boolean(false),
                        name => {
                            let tag = scalar_tag(name).ok_or_else(|| {
                                self.error(format!("unknown element <{}>", tag_name(&e)))
                            })?;
                            self.scalar(tag, String::new())?
                        }
                    };
                    self.complete(value)?;
                }
                Event::End(e) => {
                    let name = e.name();
                    match self.stack.pop() {
                        None if name.as_ref() == b"plist" => {
                            return self
                                .root
                                .take()
                                .ok_or_else(|| self.error("empty <plist> element"));
                        }
                        Some(Frame::Dict { key: Some(key), .. }) => {
                            return Err(self.error(format!("key \"{}\" has no value", key)));
                        }
                        Some(Frame::Dict { dict, key: None }) if name.as_ref() == b"dict" => {
                            self.complete(PlistValue::Dict(dict))?;
                        }
                        Some(Frame::Array(items)) if name.as_ref() == b"array" => {
                            self.complete(PlistValue::Array(items))?;
                        }
                        _ => {
                            return Err(self.error(format!(
                                "unexpected closing tag </{}>",
                                String::from_utf8_lossy(name.as_ref())
                            )));
                        }
                    }
                }
                Event::Eof => return Err(self.error("unexpected end of document, unclosed <plist>")),
                _ => return Err(self.error("unexpected markup")),
            }
        }
    }

    fn expects_key(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Dict { key: None, .. }))
    }

    fn require_key(&self, e: &BytesStart<'_>) -> Result<()> {
        if e.name().as_ref() == b"key" {
            Ok(())
        } else {
            Err(self.error(format!("expected <key> in <dict>, found <{}>", tag_name(e))))
        }
    }

    fn set_key(&mut self, key: String) -> Result<()> {
        let position = self.position();
        if let Some(Frame::Dict { dict, key: slot }) = self.stack.last_mut() {
            if dict.contains_key(&key) {
                return Err(Error::malformed(position, format!("duplicate key \"{}\"", key)));
            }
            *slot = Some(key);
        }
        Ok(())
    }

    /// Attach a finished value to the enclosing container, or make it the root
    fn complete(&mut self, value: PlistValue) -> Result<()> {
        let position = self.position();
        match self.stack.last_mut() {
            Some(Frame::Array(items)) => items.push(value),
            Some(Frame::Dict { dict, key }) => {
                let key = key
                    .take()
                    .ok_or_else(|| Error::malformed(position, "value without a <key> in <dict>"))?;
                if dict.insert(key, value).is_err() {
                    return Err(Error::malformed(position, "duplicate key in <dict>"));
                }
            }
            None => {
                if self.root.is_some() {
                    return Err(Error::malformed(position, "<plist> holds more than one value"));
                }
                self.root = Some(value);
            }
        }
        Ok(())
    }

    fn scalar(&self, tag: &str, text: String) -> Result<PlistValue> {
        let value = match tag {
            "string" => PlistValue::String(text),
            "integer" => Integer::parse(text.trim())
                .map(PlistValue::Integer)
                .ok_or_else(|| self.error(format!("invalid integer {:?}", text)))?,
            "real" => text
                .trim()
                .parse::<f64>()
                .map(PlistValue::Real)
                .map_err(|_| self.error(format!("invalid real {:?}", text)))?,
            "date" => DateTime::parse_from_rfc3339(text.trim())
                .map(|d| PlistValue::Date(d.with_timezone(&Utc)))
                .map_err(|e| self.error(format!("invalid date {:?}: {}", text, e)))?,
            "data" => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact.as_bytes())
                    .map(PlistValue::Data)
                    .map_err(|e| self.error(format!("invalid base64 in <data>: {}", e)))?
            }
            _ => return Err(self.error(format!("unknown element <{}>", tag))),
        };
        Ok(value)
    }

    /// Collect the character content of a leaf element up to `</tag>`
    fn read_text(&mut self, tag: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(e) => {
                    let unescaped = e
                        .unescape()
                        .map_err(|err| self.error(format!("bad text in <{}>: {}", tag, err)))?;
                    text.push_str(&unescaped);
                }
                Event::CData(e) => {
                    let raw = e.into_inner();
                    let s = std::str::from_utf8(&raw)
                        .map_err(|err| self.error(format!("bad CDATA in <{}>: {}", tag, err)))?;
                    text.push_str(s);
                }
                Event::End(e) if e.name().as_ref() == tag.as_bytes() => return Ok(text),
                Event::End(e) => {
                    return Err(self.error(format!(
                        "expected </{}>, found </{}>",
                        tag,
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                Event::Start(e) | Event::Empty(e) => {
                    return Err(self.error(format!(
                        "unexpected <{}> inside <{}>",
                        tag_name(&e),
                        tag
                    )));
                }
                Event::Eof => return Err(self.error(format!("unclosed <{}>", tag))),
                _ => {}
            }
        }
    }

    /// Next event with comments, declarations and processing instructions skipped
    fn next_event(&mut self) -> Result<Event<'a>> {
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| self.error(e.to_string()))?;
            match event {
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => continue,
                other => return Ok(other),
            }
        }
    }

    /// Next event between elements, where only whitespace text is allowed
    fn next_markup(&mut self) -> Result<Event<'a>> {
        loop {
            match self.next_event()? {
                Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => continue,
                Event::Text(_) | Event::CData(_) => {
                    return Err(self.error("unexpected text outside of a value element"));
                }
                other => return Ok(other),
            }
        }
    }
}

fn scalar_tag(name: &[u8]) -> Option<&'static str> {
    match name {
        b"string" => Some("string"),
        b"integer" => Some("integer"),
        b"real" => Some("real"),
        b"date" => Some("date"),
        b"data" => Some("data"),
        _ => None,
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}
