//! Office Open XML package helpers shared by the workbook reader and the template editor
use crate::error::FanoutError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::PackageReader;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Encrypted workbooks are stored as OLE compound files, not as zip packages
const COMPOUND_FILE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Opens an uploaded package, rejecting password protected workbooks up front.
pub(super) fn open_package(file_name: &str, bytes: Vec<u8>) -> Result<ZipArchive<PackageReader>, FanoutError> {
    if bytes.starts_with(&COMPOUND_FILE_SIGNATURE) {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?
    }
    Ok(ZipArchive::new(PackageReader::new(bytes))?)
}

/// Worksheet targets of a relationships part, keyed by relationship id.
/// Relationships without a type are assumed to be worksheets.
pub(super) fn load_relationships(zip: &mut ZipArchive<PackageReader>, path: &str) -> Result<HashMap<String, String>, FanoutError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let is_worksheet = event
                .get_attribute_value("Type")?
                .map(|kind| kind.ends_with("/worksheet"))
                .unwrap_or(true);
            let id = event.get_attribute_value("Id")?;
            let target = event.get_attribute_value("Target")?;
            if let (true, Some(id), Some(target)) = (is_worksheet, id, target) {
                relationships.insert(id.into_owned(), to_zip_path(&target));
            }
        }
    });
    Ok(relationships)
}

/// Cell type of every `cellXfs` entry: custom formats first, then built-in ids,
/// plain numbers otherwise.
pub(super) fn resolve_number_formats(format_ids: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_ids
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Package path of a workbook relationship target.
///
/// Targets are relative to `xl/` unless they start with `/`.
pub(crate) fn to_zip_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None if target.starts_with("xl/") => target.to_owned(),
        None => format!("xl/{target}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::write_zip;

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(to_zip_path("xl/worksheets/sheet3.xml"), "xl/worksheets/sheet3.xml");
    }

    #[test]
    fn number_formats_fall_back_to_builtin_ids() {
        let mut custom = HashMap::new();
        custom.insert("164".to_owned(), CellType::NumberDate1900);
        let formats = resolve_number_formats(
            vec!["0".to_owned(), "164".to_owned(), "14".to_owned(), "2".to_owned()],
            custom,
            false,
        );
        assert_eq!(
            formats,
            vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDate1900, CellType::Number]
        );
    }

    #[test]
    fn only_worksheet_relationships() {
        let rels = concat!(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            r#"<Relationship Id="rId3" Target="/xl/worksheets/sheet9.xml"/>"#,
            r#"</Relationships>"#,
        );
        let bytes = write_zip([("xl/_rels/workbook.xml.rels", rels.as_bytes())]).unwrap();
        let mut zip = open_package("book.xlsx", bytes).unwrap();
        let relationships = load_relationships(&mut zip, "xl/_rels/workbook.xml.rels").unwrap();
        assert_eq!(relationships.len(), 2);
        assert_eq!(relationships["rId1"], "xl/worksheets/sheet1.xml");
        assert_eq!(relationships["rId3"], "xl/worksheets/sheet9.xml");
    }

    #[test]
    fn compound_files_are_rejected() {
        let mut bytes = COMPOUND_FILE_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            open_package("secret.xlsx", bytes),
            Err(FanoutError::SpreadsheetError(SpreadsheetError::SpreadsheetPasswordProtectedError(_)))
        ));
    }
}
