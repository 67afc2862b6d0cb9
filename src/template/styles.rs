use crate::error::FanoutError;
use crate::helpers::xml::element_name;
use crate::helpers::xml::local_name;
use crate::helpers::xml::namespace_prefix;
use crate::helpers::xml::RawAttributes;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlSlice;
use quick_xml::events::Event;
use std::collections::HashMap;

/// `xf` attributes taken from the source format record
const COPIED_ATTRIBUTES: [&str; 8] = [
    "numFmtId",
    "fontId",
    "borderId",
    "applyNumberFormat",
    "applyFont",
    "applyBorder",
    "applyAlignment",
    "applyProtection",
];

/// `xf` children taken from the source format record
const COPIED_CHILDREN: [&str; 2] = ["alignment", "protection"];

/// One cell format record of `cellXfs`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Xf {
    attributes: RawAttributes,
    /// Child elements as `(local name, markup)`
    children: Vec<(String, String)>,
}

impl Xf {
    fn parse_children(inner: &str) -> Result<Vec<(String, String)>, FanoutError> {
        let mut slice = XmlSlice::new(inner);
        let mut children = Vec::new();
        while let Some((event, span)) = slice.next()? {
            match &event {
                Event::Start(element) => {
                    let name = local_name(element)?.to_owned();
                    slice.skip(element.name().as_ref())?;
                    children.push((name, inner[span.start..slice.position()].to_owned()));
                }
                Event::Empty(element) => children.push((local_name(element)?.to_owned(), inner[span].to_owned())),
                _ => (),
            }
        }
        Ok(children)
    }

    fn child(&self, name: &str) -> Option<&(String, String)> {
        self.children.iter().find(|(child, _)| child == name)
    }
}

/// `xl/styles.xml` split around its `cellXfs` table; everything else is kept
/// verbatim.
#[derive(Clone, Debug)]
pub(crate) struct Styles {
    prefix: String,
    tag: String,
    attributes: RawAttributes,
    xfs: Vec<Xf>,
    suffix: String,
    namespace: String,
}

impl Styles {
    pub(crate) fn parse(xml: &str) -> Result<Styles, FanoutError> {
        let mut slice = XmlSlice::new(xml);
        let mut table = None::<(String, String, RawAttributes)>;
        let mut xfs = Vec::new();

        while let Some((event, span)) = slice.next()? {
            match &event {
                Event::Start(element) if table.is_none() && local_name(element)? == "cellXfs" => {
                    table = Some((xml[..span.start].to_owned(), element_name(element)?, RawAttributes::from_element(element)?));
                }
                Event::Empty(element) if table.is_none() && local_name(element)? == "cellXfs" => {
                    let tag = element_name(element)?;
                    return Ok(Styles {
                        prefix: xml[..span.start].to_owned(),
                        suffix: format!("</{}>{}", tag, &xml[span.end..]),
                        namespace: namespace_prefix(element)?,
                        tag,
                        attributes: RawAttributes::from_element(element)?,
                        xfs,
                    });
                }
                Event::Start(element) if table.is_some() && local_name(element)? == "xf" => {
                    let attributes = RawAttributes::from_element(element)?;
                    let inner = slice.inner_xml(element.name().as_ref())?;
                    xfs.push(Xf { attributes, children: Xf::parse_children(&inner)? });
                }
                Event::Empty(element) if table.is_some() && local_name(element)? == "xf" => {
                    xfs.push(Xf { attributes: RawAttributes::from_element(element)?, children: Vec::new() });
                }
                Event::End(element) if element.local_name().as_ref() == b"cellXfs" => {
                    if let Some((prefix, tag, attributes)) = table {
                        let namespace = tag.strip_suffix("cellXfs").unwrap_or_default().to_owned();
                        return Ok(Styles { prefix, tag, attributes, xfs, suffix: xml[span.start..].to_owned(), namespace });
                    }
                    break;
                }
                _ => (),
            }
        }
        Err(XmlError::MissingElementError("cellXfs".to_owned()))?
    }

    /// Record at `index`, absent indexes read as record 0
    fn xf(&self, index: u32) -> Xf {
        self.xfs
            .get(index as usize)
            .or_else(|| self.xfs.first())
            .cloned()
            .unwrap_or_default()
    }

    /// Index of an identical record, appending `xf` when there is none
    fn intern(&mut self, xf: Xf) -> u32 {
        match self.xfs.iter().position(|existing| *existing == xf) {
            Some(index) => index as u32,
            None => {
                self.xfs.push(xf);
                (self.xfs.len() - 1) as u32
            }
        }
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut output = String::with_capacity(self.prefix.len() + self.suffix.len() + self.xfs.len() * 128);
        output.push_str(&self.prefix);
        let mut attributes = self.attributes.clone();
        attributes.set("count", self.xfs.len().to_string());
        attributes.write_start(&mut output, &self.tag, false);
        let xf_tag = format!("{}xf", self.namespace);
        for xf in &self.xfs {
            let inner: String = xf.children.iter().map(|(_, markup)| markup.as_str()).collect();
            xf.attributes.write_element(&mut output, &xf_tag, Some(&inner));
        }
        output.push_str(&self.suffix);
        output
    }
}

/// Copies cell formats between style records without touching the fill.
///
/// Font, border, number format, alignment and protection come from the source
/// record; fill, the parent cell style and anything else stay as the destination
/// has them. Results are memoized per `(source, destination)` pair.
pub(crate) struct StyleCopier<'a> {
    styles: &'a mut Styles,
    copies: HashMap<(u32, u32), u32>,
}

impl<'a> StyleCopier<'a> {
    pub(crate) fn new(styles: &'a mut Styles) -> StyleCopier<'a> {
        StyleCopier { styles, copies: HashMap::new() }
    }

    /// Returns the style index to give a cell currently styled `destination` so it
    /// looks like `source` apart from its fill.
    pub(crate) fn copy_without_fill(&mut self, source: u32, destination: u32) -> u32 {
        if let Some(index) = self.copies.get(&(source, destination)) {
            return *index;
        }

        let source_xf = self.styles.xf(source);
        let mut xf = self.styles.xf(destination);
        for key in COPIED_ATTRIBUTES {
            match source_xf.attributes.get(key) {
                Some(value) => xf.attributes.set(key, value),
                None => {
                    xf.attributes.remove(key);
                }
            }
        }
        let mut children: Vec<(String, String)> = COPIED_CHILDREN
            .iter()
            .filter_map(|name| source_xf.child(name).cloned())
            .collect();
        children.extend(
            xf.children
                .iter()
                .filter(|(name, _)| !COPIED_CHILDREN.contains(&name.as_str()))
                .cloned(),
        );
        xf.children = children;

        let index = self.styles.intern(xf);
        self.copies.insert((source, destination), index);
        index
    }
}
