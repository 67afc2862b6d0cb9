use crate::error::FanoutError;
use crate::helpers::xml::element_name;
use crate::helpers::xml::RawAttributes;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlSlice;
use crate::helpers::zip::write_zip;
use crate::helpers::zip::ZipHelper;
use quick_xml::events::Event;
use std::io::Cursor;
use zip::ZipArchive;

/// Every part of an OOXML package, held in memory in archive order.
///
/// Part names are matched case-insensitively, the way package readers do.
#[derive(Clone, Debug, Default)]
pub(crate) struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    pub(crate) fn open(bytes: &[u8]) -> Result<Package, FanoutError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let parts = zip.read_entries(|_| true)?;
        Ok(Package { parts })
    }

    fn index(&self, path: &str) -> Option<usize> {
        self.parts.iter().position(|(name, _)| name.eq_ignore_ascii_case(path))
    }

    /// Part names in archive order
    pub(crate) fn paths(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    /// Reads a part as UTF-8 text
    pub(crate) fn text(&self, path: &str) -> Result<Option<String>, FanoutError> {
        self.index(path)
            .map(|index| String::from_utf8(self.parts[index].1.clone()))
            .transpose()
            .map_err(FanoutError::from)
    }

    /// Replaces the content of a part, adding it at the end when it is new
    pub(crate) fn put(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        match self.index(path) {
            Some(index) => self.parts[index].1 = bytes,
            None => self.parts.push((path.to_owned(), bytes)),
        }
    }

    pub(crate) fn remove(&mut self, path: &str) -> bool {
        match self.index(path) {
            Some(index) => {
                self.parts.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, FanoutError> {
        write_zip(self.parts.iter().map(|(name, bytes)| (name.as_str(), bytes.as_slice())))
    }
}

/// A part whose root holds nothing but a flat list of attribute-only elements,
/// such as `[Content_Types].xml` and relationship parts.
#[derive(Clone, Debug, Default)]
pub(crate) struct FlatPart {
    prefix: String,
    pub(super) items: Vec<(String, RawAttributes)>,
    suffix: String,
}

impl FlatPart {
    pub(crate) fn parse(xml: &str) -> Result<FlatPart, FanoutError> {
        let mut slice = XmlSlice::new(xml);
        let mut prefix = None::<String>;
        let mut items = Vec::new();
        while let Some((event, span)) = slice.next()? {
            match event {
                Event::Start(_) if prefix.is_none() => prefix = Some(xml[..span.end].to_owned()),
                Event::Empty(root) if prefix.is_none() => {
                    let tag = xml[span.clone()].trim_end_matches("/>").trim_end();
                    return Ok(FlatPart {
                        prefix: format!("{}{}>", &xml[..span.start], tag),
                        items,
                        suffix: format!("</{}>{}", element_name(&root)?, &xml[span.end..]),
                    });
                }
                Event::Start(element) => {
                    items.push((element_name(&element)?, RawAttributes::from_element(&element)?));
                    slice.skip(element.name().as_ref())?;
                }
                Event::Empty(element) => {
                    items.push((element_name(&element)?, RawAttributes::from_element(&element)?));
                }
                Event::End(_) if prefix.is_some() => {
                    let prefix = prefix.unwrap_or_default();
                    return Ok(FlatPart { prefix, items, suffix: xml[span.start..].to_owned() });
                }
                _ => (),
            }
        }
        Err(XmlError::MissingElementError("root".to_owned()))?
    }

    /// Qualified name to use for a new item, following the names already present
    pub(super) fn item_name(&self, local_name: &str) -> String {
        self.items
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| name.rsplit(':').next() == Some(local_name))
            .unwrap_or(local_name)
            .to_owned()
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut output = String::with_capacity(self.prefix.len() + self.suffix.len() + self.items.len() * 128);
        output.push_str(&self.prefix);
        for (name, attributes) in &self.items {
            attributes.write_start(&mut output, name, true);
        }
        output.push_str(&self.suffix);
        output
    }
}
