use crate::error::FanoutError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::PackageReader;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use zip::ZipArchive;

// Local names of the SpreadsheetML elements read here
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts";
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt";
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";
const TAG_FORMAT_INDEX: &[u8] = b"xf";
const TAG_SHARED_STRING_ITEM: &[u8] = b"si";
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";
const TAG_TEXT: &[u8] = b"t";
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// An xlsx, xlsm or xlam workbook held in memory
pub(crate) struct XlsxSpreadsheet {
    name: String,
    zip: ZipArchive<PackageReader>,
    /// Cell type of each `cellXfs` entry
    number_formats: Vec<CellType>,
    /// `(sheet name, part path)` in workbook order
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
}

impl XlsxSpreadsheet {
    pub(crate) fn open(file_name: &str, bytes: Vec<u8>) -> Result<XlsxSpreadsheet, FanoutError> {
        let mut zip = excel::open_package(file_name, bytes)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
            shared_strings,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Shared strings are resolved, so text cells come back as inline strings.
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, FanoutError> {
        let context = SheetContext {
            file_name: &self.name,
            number_formats: &self.number_formats,
            shared_strings: &self.shared_strings,
            criteria,
        };
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, path) in self.sheets.iter().filter(|(name, _)| criteria.accept(name)) {
            if criteria.sheet_limit.map(|limit| sheets.len() >= limit).unwrap_or(false) {
                break;
            }
            sheets.push(read_sheet(&mut self.zip, &context, sheet_name, path)?);
        }
        Ok(sheets)
    }
}

/// Workbook-wide lookups needed while reading a worksheet
struct SheetContext<'a> {
    file_name: &'a str,
    number_formats: &'a [CellType],
    shared_strings: &'a [String],
    criteria: &'a Criteria,
}

impl SheetContext<'_> {
    /// Cell type from the `t` attribute, refined by the number format of style `s`
    fn cell_type(&self, type_attribute: Option<&str>, style: Option<&str>) -> Result<CellType, FanoutError> {
        let kind = match type_attribute {
            Some("inlineStr" | "str") => CellType::InlineString,
            Some("s") => CellType::SharedString,
            Some("d") => CellType::IsoDateTime,
            Some("b") => CellType::Boolean,
            Some("e") if self.criteria.error_as_null => CellType::Empty,
            Some("e") => CellType::Error,
            _ => CellType::Number,
        };
        match style.filter(|style| !style.is_empty()) {
            Some(style) if kind == CellType::Number => {
                let index = style.parse::<usize>()?;
                Ok(self.number_formats.get(index).copied().unwrap_or(CellType::Number))
            }
            _ => Ok(kind),
        }
    }
}

/// Position and content of the cell being read. Rows and cells without an `r`
/// attribute follow the previous one.
#[derive(Default)]
struct CellCursor {
    next_row: usize,
    next_col: usize,
    row: usize,
    col: usize,
    /// `Empty` while no cell of interest is open
    kind: CellType,
    value: String,
}

impl CellCursor {
    fn start_row(&mut self, number: Option<&str>) -> Result<(), FanoutError> {
        if let Some(number) = number {
            self.next_row = number.parse::<usize>()?.saturating_sub(1);
        }
        self.next_col = 0;
        Ok(())
    }

    fn end_row(&mut self) {
        self.next_row += 1;
    }

    fn start_cell(&mut self, reference: Option<&str>, kind: CellType) {
        (self.row, self.col) = reference
            .and_then(reference_to_index)
            .unwrap_or((self.next_row, self.next_col));
        self.next_col = self.col + 1;
        self.kind = kind;
        self.value.clear();
    }

    fn is_open(&self) -> bool {
        self.kind != CellType::Empty
    }

    /// Closes the current cell; empty values and blank shared strings yield nothing.
    fn finish_cell(&mut self, context: &SheetContext, sheet_name: &str) -> Result<Option<Cell>, FanoutError> {
        let kind = std::mem::take(&mut self.kind);
        let value = std::mem::take(&mut self.value);
        let (row, col) = (self.row, self.col);
        match kind {
            _ if value.is_empty() => Ok(None),
            CellType::Empty => Ok(None),
            CellType::Error => Err(SpreadsheetError::CellValueError(
                context.file_name.to_owned(),
                sheet_name.to_owned(),
                index_to_reference(row, col),
                value,
            ))?,
            CellType::SharedString => {
                let text = context
                    .shared_strings
                    .get(value.parse::<usize>()?)
                    .cloned()
                    .unwrap_or_default();
                Ok(Some(Cell { row, col, kind: CellType::InlineString, value: text }).filter(|cell| !cell.value.is_empty()))
            }
            kind => Ok(Some(Cell { row, col, kind, value })),
        }
    }
}

fn read_sheet(
    zip: &mut ZipArchive<PackageReader>,
    context: &SheetContext,
    sheet_name: &str,
    path: &str,
) -> Result<Sheet, FanoutError> {
    let mut sheet = Sheet::new(sheet_name);
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut cursor = CellCursor::default();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
            cursor.start_row(event.get_attribute_value("r")?.as_deref())?;
        }
        Event::End(event) if event.local_name().as_ref() == TAG_ROW => cursor.end_row(),
        Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
            let kind = context.cell_type(
                event.get_attribute_value("t")?.as_deref(),
                event.get_attribute_value("s")?.as_deref(),
            )?;
            cursor.start_cell(event.get_attribute_value("r")?.as_deref(), kind);
        }
        Event::Start(event) if cursor.is_open() && event.local_name().as_ref() == TAG_INLINE_STRING => {
            cursor.value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
        }
        Event::Start(event) if cursor.is_open() && event.local_name().as_ref() == TAG_VALUE => {
            cursor.value = read_string_value(&mut reader, TAG_VALUE, true)?;
        }
        Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
            if let Some(cell) = cursor.finish_cell(context, sheet_name)? {
                sheet.push(cell);
            }
        }
    });
    Ok(sheet)
}

/// Sheet names with their part paths, and whether dates use the 1904 system
fn load_workbook(zip: &mut ZipArchive<PackageReader>) -> Result<(Vec<(String, String)>, bool), FanoutError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for attribute in event.attributes() {
                let attribute = attribute?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attribute.get_value()?),
                    b"id" => id = Some(attribute.get_value()?),
                    _ => (),
                }
            }
            if let Some(path) = id.and_then(|id| relationships.get(id.as_ref())) {
                if let Some(name) = name {
                    sheets.push((name.into_owned(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Cell type per `cellXfs` entry, from the custom `numFmts` and the built-in ids
fn load_number_formats(zip: &mut ZipArchive<PackageReader>, is_1904: bool) -> Result<Vec<CellType>, FanoutError> {
    let Some(mut reader) = zip.xml_reader("xl/styles.xml")? else {
        return Ok(Vec::new());
    };

    let mut in_custom_formats = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut in_format_indexes = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => in_custom_formats = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => in_custom_formats = false,
        Event::Start(event) if in_custom_formats && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let code = event.get_attribute_value("formatCode")?;
            if let Some((id, code)) = id.zip(code) {
                custom_formats.insert(id.into_owned(), CellType::parse_custom_number_format(&code, is_1904));
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => in_format_indexes = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if in_format_indexes && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map(Cow::into_owned).unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::resolve_number_formats(format_indexes, custom_formats, is_1904))
}

fn load_shared_strings(zip: &mut ZipArchive<PackageReader>) -> Result<Vec<String>, FanoutError> {
    let mut shared_strings = Vec::<String>::new();
    let Some(mut reader) = zip.xml_reader(SHARED_STRINGS)? else {
        return Ok(shared_strings);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Collects the text up to the `end_tag` close, leaving out phonetic runs.
/// Without `is_text_content` only text inside `<t>` counts.
fn read_string_value<R: BufRead>(reader: &mut XmlReader<R>, end_tag: &[u8], is_text_content: bool) -> Result<String, FanoutError> {
    let mut in_phonetic_text = false;
    let mut in_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => in_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => in_phonetic_text = false,
        Event::Start(event) if !in_phonetic_text && event.local_name().as_ref() == TAG_TEXT => in_text = true,
        Event::End(event) if in_text && event.local_name().as_ref() == TAG_TEXT => in_text = false,
        Event::Text(event) if in_text => text.push_bytes_text(&event)?,
        Event::CData(event) if in_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if in_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::write_zip;
    use rust_xlsxwriter::Format;
    use rust_xlsxwriter::Workbook;

    fn fixture() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet().set_name("Data").unwrap();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "amount").unwrap();
        sheet.write_string(0, 2, "when").unwrap();
        sheet.write_string(1, 0, "alpha").unwrap();
        sheet.write_number(1, 1, 12.5).unwrap();
        sheet.write_number_with_format(1, 2, 45292, &date).unwrap();
        sheet.write_boolean(3, 0, true).unwrap();
        workbook.add_worksheet().set_name("Other").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn open_lists_sheets() {
        let spreadsheet = XlsxSpreadsheet::open("book.xlsx", fixture()).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["Data".to_owned(), "Other".to_owned()]);
    }

    #[test]
    fn read_sheet_cells() {
        let mut spreadsheet = XlsxSpreadsheet::open("book.xlsx", fixture()).unwrap();
        let sheets = spreadsheet.read_sheets(&Criteria::exact_sheet("Data").unwrap()).unwrap();
        assert_eq!(sheets.len(), 1);

        let sheet = &sheets[0];
        let cells: Vec<(String, String)> = sheet.cells.iter().map(|cell| (index_to_reference(cell.row, cell.col), cell.to_string())).collect();
        assert_eq!(cells, vec![
            ("A1".to_owned(), "name".to_owned()),
            ("B1".to_owned(), "amount".to_owned()),
            ("C1".to_owned(), "when".to_owned()),
            ("A2".to_owned(), "alpha".to_owned()),
            ("B2".to_owned(), "12.5".to_owned()),
            ("C2".to_owned(), "2024-01-01".to_owned()),
            ("A4".to_owned(), "true".to_owned()),
        ]);
        assert_eq!(sheet.width(), 3);
    }

    #[test]
    fn used_area_of_offset_sheet() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Offset").unwrap();
        sheet.write_string(2, 1, "first").unwrap();
        sheet.write_string(5, 3, "last").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let mut spreadsheet = XlsxSpreadsheet::open("offset.xlsx", bytes).unwrap();
        let sheets = spreadsheet.read_sheets(&Criteria::default()).unwrap();
        assert_eq!(sheets[0].row_lower_bound, Some(2));
        assert_eq!(sheets[0].col_lower_bound, Some(1));
        assert_eq!(sheets[0].width(), 3);
    }

    #[test]
    fn missing_sheet_reads_nothing() {
        let mut spreadsheet = XlsxSpreadsheet::open("book.xlsx", fixture()).unwrap();
        let sheets = spreadsheet.read_sheets(&Criteria::exact_sheet("Nope").unwrap()).unwrap();
        assert!(sheets.is_empty());
    }

    #[test]
    fn prefixed_worksheet_without_references() {
        const MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
        const RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        let workbook = format!(
            r#"<x:workbook xmlns:x="{MAIN}" xmlns:r="{RELATIONSHIPS}"><x:sheets><x:sheet name="S" sheetId="1" r:id="rId1"/></x:sheets></x:workbook>"#
        );
        let rels = format!(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{RELATIONSHIPS}/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
        );
        let sheet = format!(
            r#"<x:worksheet xmlns:x="{MAIN}"><x:sheetData><x:row><x:c t="inlineStr"><x:is><x:t>a</x:t></x:is></x:c><x:c><x:v>2</x:v></x:c></x:row><x:row r="3"><x:c t="e"><x:v>#N/A</x:v></x:c><x:c t="b"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#
        );
        let bytes = write_zip([
            ("xl/workbook.xml", workbook.as_bytes()),
            ("xl/_rels/workbook.xml.rels", rels.as_bytes()),
            ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
        ])
        .unwrap();

        let mut spreadsheet = XlsxSpreadsheet::open("prefixed.xlsx", bytes).unwrap();
        let criteria = Criteria { error_as_null: true, ..Criteria::default() };
        let sheets = spreadsheet.read_sheets(&criteria).unwrap();
        let cells: Vec<(String, String)> = sheets[0].cells.iter().map(|cell| (index_to_reference(cell.row, cell.col), cell.to_string())).collect();
        assert_eq!(cells, vec![
            ("A1".to_owned(), "a".to_owned()),
            ("B1".to_owned(), "2".to_owned()),
            ("B3".to_owned(), "true".to_owned()),
        ]);

        let error = spreadsheet.read_sheets(&Criteria::default()).err().unwrap();
        assert!(matches!(error, FanoutError::SpreadsheetError(SpreadsheetError::CellValueError(..))));
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(XlsxSpreadsheet::open("junk.xlsx", b"not a zip".to_vec()).is_err());
    }
}
