use crate::error::FanoutError;
use crate::helpers::xml::local_name;
use crate::helpers::xml::namespace_prefix;
use crate::helpers::xml::rewrite_elements;
use crate::helpers::xml::ElementEdit;
use crate::helpers::xml::RawAttributes;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlSlice;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::CellValue;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::collections::BTreeMap;

/// Worksheet elements that only make sense together with the sheet's own
/// relationship part, which clones do not get.
const RELATIONSHIP_BOUND: [&str; 9] = [
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "picture",
    "oleObjects",
    "controls",
    "tableParts",
    "hyperlinks",
    "AlternateContent",
];

#[derive(Clone, Debug, Default)]
struct SheetCell {
    attributes: RawAttributes,
    inner: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct SheetRow {
    attributes: RawAttributes,
    cells: BTreeMap<usize, SheetCell>,
}

/// A worksheet part split around `<sheetData>`.
///
/// Markup before and after the cell table is kept verbatim, rows and cells are
/// held by 0-based index so single cells can be rewritten.
#[derive(Clone, Debug)]
pub(crate) struct Worksheet {
    prefix: String,
    rows: BTreeMap<usize, SheetRow>,
    suffix: String,
    namespace: String,
}

impl Worksheet {
    pub(crate) fn parse(xml: &str) -> Result<Worksheet, FanoutError> {
        let mut slice = XmlSlice::new(xml);
        let mut prefix = None::<String>;
        let mut namespace = String::new();
        let mut rows = BTreeMap::<usize, SheetRow>::new();
        let mut current_row = None::<usize>;
        let mut next_row = 0;
        let mut next_col = 0;

        while let Some((event, span)) = slice.next()? {
            match &event {
                Event::Start(element) if prefix.is_none() && local_name(element)? == "sheetData" => {
                    prefix = Some(xml[..span.end].to_owned());
                    namespace = namespace_prefix(element)?;
                }
                Event::Empty(element) if prefix.is_none() && local_name(element)? == "sheetData" => {
                    let namespace = namespace_prefix(element)?;
                    let tag = xml[span.clone()].trim_end_matches("/>").trim_end();
                    return Ok(Worksheet {
                        prefix: format!("{}{}>", &xml[..span.start], tag),
                        rows,
                        suffix: format!("</{}sheetData>{}", namespace, &xml[span.end..]),
                        namespace,
                    });
                }
                Event::Start(element) | Event::Empty(element) if prefix.is_some() && local_name(element)? == "row" => {
                    let attributes = RawAttributes::from_element(element)?;
                    let row = attributes
                        .parse::<usize>("r")?
                        .and_then(|row| row.checked_sub(1))
                        .unwrap_or(next_row);
                    next_row = row + 1;
                    next_col = 0;
                    rows.insert(row, SheetRow { attributes, cells: BTreeMap::new() });
                    current_row = matches!(event, Event::Start(_)).then_some(row);
                }
                Event::End(element) if element.local_name().as_ref() == b"row" => current_row = None,
                Event::Start(element) | Event::Empty(element) if current_row.is_some() && local_name(element)? == "c" => {
                    let attributes = RawAttributes::from_element(element)?;
                    let col = attributes
                        .get("r")
                        .and_then(reference_to_index)
                        .map(|(_, col)| col)
                        .unwrap_or(next_col);
                    next_col = col + 1;
                    let inner = match event {
                        Event::Start(_) => Some(slice.inner_xml(element.name().as_ref())?.into_owned()),
                        _ => None,
                    };
                    if let Some(row) = current_row.and_then(|row| rows.get_mut(&row)) {
                        row.cells.insert(col, SheetCell { attributes, inner });
                    }
                }
                Event::End(element) if element.local_name().as_ref() == b"sheetData" => {
                    return Ok(Worksheet {
                        prefix: prefix.unwrap_or_default(),
                        rows,
                        suffix: xml[span.start..].to_owned(),
                        namespace,
                    });
                }
                _ => (),
            }
        }
        Err(XmlError::MissingElementError("sheetData".to_owned()))?
    }

    /// Style index in effect at a cell: the cell's own, else the row style of a
    /// custom formatted row, else 0.
    pub(crate) fn style_at(&self, row: usize, col: usize) -> u32 {
        let Some(sheet_row) = self.rows.get(&row) else {
            return 0;
        };
        match sheet_row.cells.get(&col) {
            Some(cell) => cell.attributes.get("s").and_then(|s| s.parse().ok()).unwrap_or(0),
            None if matches!(sheet_row.attributes.get("customFormat"), Some("1" | "true")) => {
                sheet_row.attributes.get("s").and_then(|s| s.parse().ok()).unwrap_or(0)
            }
            None => 0,
        }
    }

    pub(crate) fn set_style(&mut self, row: usize, col: usize, style: u32) {
        let cell = self.cell_mut(row, col);
        if style == 0 {
            cell.attributes.remove("s");
        } else {
            cell.attributes.set("s", style.to_string());
        }
    }

    /// Writes a value, replacing whatever the cell held before.
    /// Dates and times are stored as their serial numbers.
    pub(crate) fn set_value(&mut self, row: usize, col: usize, value: &CellValue) {
        let namespace = self.namespace.clone();
        let cell = self.cell_mut(row, col);
        cell.attributes.remove("t");
        let inner = match value {
            CellValue::Number(number) | CellValue::Temporal { serial: number, .. } if number.is_finite() => {
                format!("<{namespace}v>{number}</{namespace}v>")
            }
            CellValue::Boolean(value) => {
                cell.attributes.set("t", "b");
                format!("<{namespace}v>{}</{namespace}v>", u8::from(*value))
            }
            value => {
                cell.attributes.set("t", "inlineStr");
                format!(
                    r#"<{namespace}is><{namespace}t xml:space="preserve">{}</{namespace}t></{namespace}is>"#,
                    escape(value.to_string().as_str())
                )
            }
        };
        cell.inner = Some(inner);
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut SheetCell {
        let sheet_row = self.rows.entry(row).or_insert_with(|| {
            let mut attributes = RawAttributes::default();
            attributes.set("r", (row + 1).to_string());
            SheetRow { attributes, cells: BTreeMap::new() }
        });
        if !sheet_row.cells.contains_key(&col) {
            sheet_row.attributes.remove("spans");
        }
        sheet_row.cells.entry(col).or_insert_with(|| {
            let mut attributes = RawAttributes::default();
            attributes.set("r", index_to_reference(row, col));
            SheetCell { attributes, inner: None }
        })
    }

    /// Bottom-right corner of the used cells
    fn used_extent(&self) -> Option<(usize, usize)> {
        let row = self.rows.iter().rev().find(|(_, row)| !row.cells.is_empty()).map(|(row, _)| *row)?;
        let col = self.rows.values().filter_map(|row| row.cells.keys().next_back()).max()?;
        Some((row, *col))
    }

    /// Rewrites `<dimension ref>` so it covers every cell
    fn update_dimension(&mut self) -> Result<(), FanoutError> {
        let reference = match self.used_extent() {
            Some((0, 0)) | None => "A1".to_owned(),
            Some((row, col)) => format!("A1:{}", index_to_reference(row, col)),
        };
        let Some(start) = self.prefix.find(&format!("<{}dimension", self.namespace)) else {
            return Ok(());
        };
        let Some(length) = self.prefix[start..].find('>') else {
            return Ok(());
        };
        let end = start + length + 1;
        let tag = rewrite_elements(&self.prefix[start..end], |_, attributes| {
            attributes.set("ref", reference.as_str());
            ElementEdit::Rewrite
        })?;
        self.prefix.replace_range(start..end, &tag);
        Ok(())
    }

    pub(crate) fn to_xml(&mut self) -> Result<String, FanoutError> {
        self.update_dimension()?;
        let mut output = String::with_capacity(self.prefix.len() + self.suffix.len() + self.rows.len() * 256);
        output.push_str(&self.prefix);
        let row_tag = format!("{}row", self.namespace);
        let cell_tag = format!("{}c", self.namespace);
        for row in self.rows.values() {
            if row.cells.is_empty() {
                row.attributes.write_start(&mut output, &row_tag, true);
                continue;
            }
            row.attributes.write_start(&mut output, &row_tag, false);
            for cell in row.cells.values() {
                cell.attributes.write_element(&mut output, &cell_tag, cell.inner.as_deref());
            }
            output.push_str(&format!("</{row_tag}>"));
        }
        output.push_str(&self.suffix);
        Ok(output)
    }
}

/// Prepares a worksheet part for use as a clone: elements bound to the
/// original's relationships are removed and the sheet is no longer selected.
pub(crate) fn detach(xml: &str) -> Result<String, FanoutError> {
    rewrite_elements(xml, |name, attributes| match name {
        name if RELATIONSHIP_BOUND.contains(&name) => ElementEdit::Drop,
        "sheetView" if attributes.remove("tabSelected").is_some() => ElementEdit::Rewrite,
        "pageSetup" => match attributes.key_by_local_name("id").map(str::to_owned) {
            Some(key) => {
                attributes.remove(&key);
                ElementEdit::Rewrite
            }
            None => ElementEdit::Keep,
        },
        _ => ElementEdit::Keep,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = concat!(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        r#"<dimension ref="A1:C4"/>"#,
        r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>"#,
        r#"<sheetData>"#,
        r#"<row r="1" spans="1:3"><c r="A1" t="inlineStr"><is><t>Title</t></is></c></row>"#,
        r#"<row r="4" spans="1:3" s="7" customFormat="1"><c r="A4" s="3"/><c r="C4" s="5"><v>1</v></c></row>"#,
        r#"</sheetData>"#,
        r#"<pageSetup orientation="landscape" r:id="rId1"/>"#,
        r#"<drawing r:id="rId2"/>"#,
        r#"</worksheet>"#,
    );

    #[test]
    fn parse_and_serialize_unchanged() {
        let mut sheet = Worksheet::parse(SHEET).unwrap();
        assert_eq!(sheet.to_xml().unwrap(), SHEET);
    }

    #[test]
    fn styles_by_position() {
        let sheet = Worksheet::parse(SHEET).unwrap();
        assert_eq!(sheet.style_at(3, 0), 3);
        assert_eq!(sheet.style_at(3, 1), 7);
        assert_eq!(sheet.style_at(3, 2), 5);
        assert_eq!(sheet.style_at(0, 0), 0);
        assert_eq!(sheet.style_at(9, 0), 0);
    }

    #[test]
    fn write_values() {
        let mut sheet = Worksheet::parse(SHEET).unwrap();
        sheet.set_value(3, 0, &CellValue::Text("a < b".to_owned()));
        sheet.set_value(3, 1, &CellValue::Number(2.5));
        sheet.set_style(3, 1, 9);
        sheet.set_value(4, 3, &CellValue::Boolean(true));
        sheet.set_value(4, 0, &CellValue::Temporal { serial: 45292.0, text: "2024-01-01".to_owned() });

        let xml = sheet.to_xml().unwrap();
        assert!(xml.contains(r#"<dimension ref="A1:D5"/>"#));
        assert!(xml.contains(concat!(
            r#"<row r="4" s="7" customFormat="1">"#,
            r#"<c r="A4" s="3" t="inlineStr"><is><t xml:space="preserve">a &lt; b</t></is></c>"#,
            r#"<c r="B4" s="9"><v>2.5</v></c>"#,
            r#"<c r="C4" s="5"><v>1</v></c></row>"#,
        )));
        assert!(xml.contains(r#"<row r="5"><c r="A5"><v>45292</v></c><c r="D5" t="b"><v>1</v></c></row>"#));
    }

    #[test]
    fn empty_sheet_data() {
        let mut sheet = Worksheet::parse(r#"<x:worksheet xmlns:x="main"><x:sheetData/></x:worksheet>"#).unwrap();
        sheet.set_value(0, 1, &CellValue::Number(3.0));
        assert_eq!(
            sheet.to_xml().unwrap(),
            r#"<x:worksheet xmlns:x="main"><x:sheetData><x:row r="1"><x:c r="B1"><x:v>3</x:v></x:c></x:row></x:sheetData></x:worksheet>"#
        );
    }

    #[test]
    fn detach_drops_relationship_bound_markup() {
        let detached = detach(SHEET).unwrap();
        assert!(detached.contains(r#"<sheetView workbookViewId="0"/>"#));
        assert!(detached.contains(r#"<pageSetup orientation="landscape"/>"#));
        assert!(!detached.contains("drawing"));
        assert!(detached.contains(r#"<c r="A1" t="inlineStr"><is><t>Title</t></is></c>"#));
    }

    #[test]
    fn missing_sheet_data_is_an_error() {
        assert!(Worksheet::parse("<worksheet/>").is_err());
    }
}
