use crate::error::FanoutError;
use crate::helpers::xml::element_name;
use crate::helpers::xml::local_name;
use crate::helpers::xml::namespace_prefix;
use crate::helpers::xml::rewrite_elements;
use crate::helpers::xml::ElementEdit;
use crate::helpers::xml::RawAttributes;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlSlice;
use quick_xml::events::Event;

/// One `<sheet>` entry of the workbook
#[derive(Clone, Debug)]
pub(crate) struct SheetEntry {
    pub(crate) name: String,
    attributes: RawAttributes,
}

impl SheetEntry {
    /// Id of the workbook relationship pointing at the worksheet part
    pub(crate) fn relationship_id(&self) -> Option<&str> {
        self.attributes
            .key_by_local_name("id")
            .and_then(|key| self.attributes.get(key))
    }
}

/// `xl/workbook.xml` split around its sheet list.
///
/// Everything outside `<sheets>` is kept verbatim; sheet entries can be added and
/// removed. Removal renumbers the sheet indexes used by workbook views and
/// sheet-local defined names.
#[derive(Clone, Debug)]
pub(crate) struct WorkbookPart {
    prefix: String,
    sheets: Vec<SheetEntry>,
    suffix: String,
    sheet_tag: String,
    relationship_key: String,
}

impl WorkbookPart {
    pub(crate) fn parse(xml: &str) -> Result<WorkbookPart, FanoutError> {
        let mut slice = XmlSlice::new(xml);
        let mut prefix = None::<String>;
        let mut sheets = Vec::new();
        let mut sheet_tag = None::<String>;
        let mut relationship_key = None::<String>;

        while let Some((event, span)) = slice.next()? {
            match &event {
                Event::Start(element) if local_name(element)? == "sheets" => {
                    prefix = Some(xml[..span.end].to_owned());
                    sheet_tag = Some(format!("{}sheet", namespace_prefix(element)?));
                }
                Event::Empty(element) if local_name(element)? == "sheets" => {
                    let tag = xml[span.clone()].trim_end_matches("/>").trim_end();
                    return Ok(WorkbookPart {
                        prefix: format!("{}{}>", &xml[..span.start], tag),
                        sheets,
                        suffix: format!("</{}>{}", element_name(element)?, &xml[span.end..]),
                        sheet_tag: format!("{}sheet", namespace_prefix(element)?),
                        relationship_key: "r:id".to_owned(),
                    });
                }
                Event::Start(element) | Event::Empty(element)
                    if prefix.is_some() && local_name(element)? == "sheet" =>
                {
                    let attributes = RawAttributes::from_element(element)?;
                    if relationship_key.is_none() {
                        relationship_key = attributes.key_by_local_name("id").map(str::to_owned);
                    }
                    let name = attributes.text("name")?.unwrap_or_default();
                    sheets.push(SheetEntry { name, attributes });
                    if matches!(event, Event::Start(_)) {
                        slice.skip(element.name().as_ref())?;
                    }
                }
                Event::End(element) if element.local_name().as_ref() == b"sheets" => {
                    return Ok(WorkbookPart {
                        prefix: prefix.unwrap_or_default(),
                        sheets,
                        suffix: xml[span.start..].to_owned(),
                        sheet_tag: sheet_tag.unwrap_or_else(|| "sheet".to_owned()),
                        relationship_key: relationship_key.unwrap_or_else(|| "r:id".to_owned()),
                    });
                }
                _ => (),
            }
        }
        Err(XmlError::MissingElementError("sheets".to_owned()))?
    }

    pub(crate) fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    /// Index of a sheet, names compared case-insensitively
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.sheets.iter().position(|sheet| sheet.name.to_lowercase() == name)
    }

    /// Appends a sheet pointing at the relationship `relationship_id`
    pub(crate) fn add(&mut self, name: &str, relationship_id: &str) -> Result<(), FanoutError> {
        let sheet_id = self
            .sheets
            .iter()
            .map(|sheet| sheet.attributes.parse::<u32>("sheetId"))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0)
            + 1;
        let mut attributes = RawAttributes::default();
        attributes.set_text("name", name);
        attributes.set("sheetId", sheet_id.to_string());
        attributes.set(&self.relationship_key, relationship_id);
        self.sheets.push(SheetEntry { name: name.to_owned(), attributes });
        Ok(())
    }

    /// Removes the sheet at `index` and renumbers everything that refers to sheets
    /// by position.
    pub(crate) fn remove(&mut self, index: usize) -> Result<SheetEntry, FanoutError> {
        let entry = self.sheets.remove(index);
        let xml = rewrite_elements(&self.to_xml(), |name, attributes| match name {
            "definedName" => match attributes.parse::<usize>("localSheetId") {
                Ok(Some(sheet)) if sheet == index => ElementEdit::Drop,
                Ok(Some(sheet)) if sheet > index => {
                    attributes.set("localSheetId", (sheet - 1).to_string());
                    ElementEdit::Rewrite
                }
                _ => ElementEdit::Keep,
            },
            "workbookView" => {
                let mut edited = false;
                for key in ["activeTab", "firstSheet"] {
                    match attributes.parse::<usize>(key) {
                        Ok(Some(sheet)) if sheet == index => {
                            attributes.remove(key);
                            edited = true;
                        }
                        Ok(Some(sheet)) if sheet > index => {
                            attributes.set(key, (sheet - 1).to_string());
                            edited = true;
                        }
                        _ => (),
                    }
                }
                if edited { ElementEdit::Rewrite } else { ElementEdit::Keep }
            }
            _ => ElementEdit::Keep,
        })?;
        let xml = xml.replace("<definedNames></definedNames>", "");
        *self = WorkbookPart::parse(&xml)?;
        Ok(entry)
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut output = String::with_capacity(self.prefix.len() + self.suffix.len() + self.sheets.len() * 64);
        output.push_str(&self.prefix);
        for sheet in &self.sheets {
            sheet.attributes.write_start(&mut output, &self.sheet_tag, true);
        }
        output.push_str(&self.suffix);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        r#"<bookViews><workbookView xWindow="0" activeTab="2" firstSheet="1"/></bookViews>"#,
        r#"<sheets><sheet name="A" sheetId="1" r:id="rId1"/><sheet name="R&amp;D" sheetId="4" r:id="rId2"/><sheet name="Last" sheetId="2" r:id="rId3"/></sheets>"#,
        r#"<definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">A!$A$1:$C$9</definedName>"#,
        r#"<definedName name="_xlnm.Print_Area" localSheetId="2">Last!$A$1:$B$2</definedName>"#,
        r#"<definedName name="Total">Last!$B$2</definedName></definedNames>"#,
        "</workbook>",
    );

    #[test]
    fn parse_sheet_entries() {
        let workbook = WorkbookPart::parse(WORKBOOK).unwrap();
        let names: Vec<&str> = workbook.sheets().iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["A", "R&D", "Last"]);
        assert_eq!(workbook.sheets()[1].relationship_id(), Some("rId2"));
        assert_eq!(workbook.position("r&d"), Some(1));
        assert_eq!(workbook.to_xml(), WORKBOOK);
    }

    #[test]
    fn add_uses_next_sheet_id() {
        let mut workbook = WorkbookPart::parse(WORKBOOK).unwrap();
        workbook.add("North & South", "rId9").unwrap();
        assert!(workbook.to_xml().contains(r#"<sheet name="North &amp; South" sheetId="5" r:id="rId9"/></sheets>"#));
    }

    #[test]
    fn remove_renumbers_sheet_indexes() {
        let mut workbook = WorkbookPart::parse(WORKBOOK).unwrap();
        let removed = workbook.remove(0).unwrap();
        assert_eq!(removed.name, "A");
        assert_eq!(removed.relationship_id(), Some("rId1"));

        let xml = workbook.to_xml();
        assert!(xml.contains(r#"<workbookView xWindow="0" activeTab="1" firstSheet="0"/>"#));
        assert!(!xml.contains("A!$A$1:$C$9"));
        assert!(xml.contains(r#"<definedName name="_xlnm.Print_Area" localSheetId="1">Last!$A$1:$B$2</definedName>"#));
        assert!(xml.contains(r#"<definedName name="Total">Last!$B$2</definedName>"#));
        assert_eq!(workbook.sheets().len(), 2);
    }

    #[test]
    fn empty_sheet_list() {
        let mut workbook = WorkbookPart::parse(r#"<workbook xmlns:r="r"><sheets/></workbook>"#).unwrap();
        assert!(workbook.sheets().is_empty());
        workbook.add("Only", "rId1").unwrap();
        assert_eq!(
            workbook.to_xml(),
            r#"<workbook xmlns:r="r"><sheets><sheet name="Only" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        );
    }
}
