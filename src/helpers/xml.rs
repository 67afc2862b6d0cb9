//! XML utilities for SpreadsheetML parts.
//! `XmlReader` streams parts straight out of a zip entry, `XmlSlice` walks an
//! in-memory part with byte offsets so it can be spliced and rewritten.

use crate::error::FanoutError;
use quick_xml::escape::escape;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::ops::Range;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),

    #[error("Element <{0}> not found")]
    MissingElementError(String),
}

/// XML reader wrapper with optimized configuration for spreadsheet parsing
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a new XML reader with optimized configuration for spreadsheet parsing
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event from the reader
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, FanoutError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(FanoutError::XmlError(error)),
        }
    }
}

/// Event reader over a whole part held in memory.
///
/// Every event comes with the byte range it occupies in the source text, so callers
/// can cut a part into a verbatim prefix, an edited middle and a verbatim suffix.
/// Empty elements are reported as `Event::Empty`.
pub(crate) struct XmlSlice<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> XmlSlice<'a> {
    pub(crate) fn new(xml: &'a str) -> XmlSlice<'a> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        XmlSlice { reader }
    }

    /// Reads the next event and the span it covers
    pub(crate) fn next(&mut self) -> Result<Option<(Event<'a>, Range<usize>)>, FanoutError> {
        let start = self.reader.buffer_position() as usize;
        match self.reader.read_event()? {
            Event::Eof => Ok(None),
            event => Ok(Some((event, start..self.reader.buffer_position() as usize))),
        }
    }

    /// Returns the raw markup between the current start tag and its end tag
    pub(crate) fn inner_xml(&mut self, end: &[u8]) -> Result<Cow<'a, str>, FanoutError> {
        Ok(self.reader.read_text(QName(end))?)
    }

    /// Skips everything up to and including the end tag
    pub(crate) fn skip(&mut self, end: &[u8]) -> Result<(), FanoutError> {
        self.reader.read_to_end(QName(end))?;
        Ok(())
    }

    /// Byte offset of the next unread event
    pub(crate) fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }
}

/// What `rewrite_elements` does with one start or empty element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ElementEdit {
    /// Copy the element as written
    Keep,
    /// Write the element again from the (edited) attributes
    Rewrite,
    /// Remove the element together with its content
    Drop,
}

/// Copies a part verbatim except for the elements `edit` wants changed.
///
/// `edit` is called with the local name and attributes of every start and empty
/// element. Children of rewritten elements are still visited.
pub(crate) fn rewrite_elements<F>(xml: &str, mut edit: F) -> Result<String, FanoutError>
where
    F: FnMut(&str, &mut RawAttributes) -> ElementEdit,
{
    let mut output = String::with_capacity(xml.len());
    let mut slice = XmlSlice::new(xml);
    while let Some((event, span)) = slice.next()? {
        let (element, empty) = match &event {
            Event::Start(element) => (element, false),
            Event::Empty(element) => (element, true),
            _ => {
                output.push_str(&xml[span]);
                continue;
            }
        };
        let mut attributes = RawAttributes::from_element(element)?;
        match edit(local_name(element)?, &mut attributes) {
            ElementEdit::Keep => output.push_str(&xml[span]),
            ElementEdit::Rewrite => attributes.write_start(&mut output, &element_name(element)?, empty),
            ElementEdit::Drop if !empty => slice.skip(element.name().as_ref())?,
            ElementEdit::Drop => (),
        }
    }
    Ok(output)
}

/// Attributes of one element, kept exactly as written (values still escaped) so an
/// edited element serializes back without touching attributes nobody changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct RawAttributes(Vec<(String, String)>);

impl RawAttributes {
    pub(crate) fn from_element(element: &BytesStart) -> Result<RawAttributes, FanoutError> {
        let mut attributes = Vec::new();
        let mut iterator = element.attributes();
        iterator.with_checks(false);
        for result in iterator {
            let attribute = result?;
            let key = std::str::from_utf8(attribute.key.as_ref())?.to_owned();
            let value = std::str::from_utf8(&attribute.value)?.to_owned();
            attributes.push((key, value));
        }
        Ok(RawAttributes(attributes))
    }

    /// Raw (escaped) value of an attribute
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Unescaped value of an attribute
    pub(crate) fn text(&self, key: &str) -> Result<Option<String>, FanoutError> {
        self.get(key)
            .map(|value| unescape(value).map(Cow::into_owned))
            .transpose()
            .map_err(FanoutError::from)
    }

    /// Parses an attribute value to the specified type
    pub(crate) fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, FanoutError> {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| XmlError::ParseAttributeValueError(value.to_owned()).into())
            })
            .transpose()
    }

    /// Finds the first attribute whose local name (after any namespace prefix) matches
    pub(crate) fn key_by_local_name(&self, local_name: &str) -> Option<&str> {
        self.0
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| name.rsplit(':').next() == Some(local_name))
    }

    /// Sets a raw value, replacing an existing attribute in place or appending a new one
    pub(crate) fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| name == key) {
            Some((_, current)) => *current = value,
            None => self.0.push((key.to_owned(), value)),
        }
    }

    /// Sets a value that still needs escaping
    pub(crate) fn set_text(&mut self, key: &str, text: &str) {
        self.set(key, escape(text).into_owned());
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(name, _)| name == key)?;
        Some(self.0.remove(index).1)
    }

    /// Writes `<name attr="..."` followed by `/>` or `>` depending on `empty`
    pub(crate) fn write_start(&self, output: &mut String, name: &str, empty: bool) {
        output.push('<');
        output.push_str(name);
        for (key, value) in &self.0 {
            output.push(' ');
            output.push_str(key);
            output.push_str("=\"");
            output.push_str(&value.replace('"', "&quot;"));
            output.push('"');
        }
        output.push_str(if empty { "/>" } else { ">" });
    }

    /// Writes a complete element with optional raw inner markup
    pub(crate) fn write_element(&self, output: &mut String, name: &str, inner: Option<&str>) {
        match inner {
            Some(inner) if !inner.is_empty() => {
                self.write_start(output, name, false);
                output.push_str(inner);
                output.push_str("</");
                output.push_str(name);
                output.push('>');
            }
            _ => self.write_start(output, name, true),
        }
    }
}

/// Qualified element name as an owned string
pub(crate) fn element_name(element: &BytesStart) -> Result<String, FanoutError> {
    Ok(std::str::from_utf8(element.name().as_ref())?.to_owned())
}

/// Element name without its namespace prefix
pub(crate) fn local_name<'b>(element: &'b BytesStart) -> Result<&'b str, FanoutError> {
    let name = std::str::from_utf8(element.name().into_inner())?;
    Ok(name.rsplit(':').next().unwrap_or(name))
}

/// Namespace prefix of an element including the colon, empty when unprefixed
pub(crate) fn namespace_prefix(element: &BytesStart) -> Result<String, FanoutError> {
    let name = std::str::from_utf8(element.name().into_inner())?;
    Ok(name.rsplit_once(':').map(|(prefix, _)| format!("{prefix}:")).unwrap_or_default())
}

/// Helper trait for XML attributes providing convenient value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    /// Gets the unescaped attribute value as a string
    fn get_value(&self) -> Result<Cow<'a, str>, FanoutError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, FanoutError> {
        Ok(self.unescape_value()?)
    }
}

/// Helper trait for XML nodes providing attribute access methods
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, FanoutError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, FanoutError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends text content from BytesText event
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), FanoutError>;

    /// Appends text content from BytesRef event (handles entities and character references)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), FanoutError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), FanoutError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), FanoutError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
