//! # Template Workbooks
//!
//! Edits an existing xlsx package in place at the XML level so that everything the
//! template author set up survives: column widths, merged cells, print settings,
//! conditional formats, themes. Worksheets can be cloned, added and removed, and
//! cell formats copied through the `cellXfs` table.
pub(crate) mod package;
pub(crate) mod relationships;
pub(crate) mod styles;
pub(crate) mod workbook;
pub(crate) mod worksheet;

use crate::error::FanoutError;
use crate::template::package::Package;
use crate::template::relationships::relationships_path;
use crate::template::relationships::resolve_target;
use crate::template::relationships::ContentTypes;
use crate::template::relationships::Relationships;
use crate::template::styles::Styles;
use crate::template::workbook::WorkbookPart;
use crate::template::worksheet::detach;
use crate::template::worksheet::Worksheet;
use thiserror::Error;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const PACKAGE_RELATIONSHIPS: &str = "_rels/.rels";
/// Used when the package relationships do not name the workbook part
const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";

const WORKSHEET_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const WORKSHEET_RELATIONSHIP: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Part '{0}' is missing from the template")]
    MissingPart(String),

    #[error("Relationship '{0}' of sheet '{1}' is missing from the workbook")]
    MissingRelationship(String, String),

    #[error("Template has no sheets")]
    NoSheets,
}

/// The sheet every output sheet is cloned from
#[derive(Clone, Debug)]
pub(crate) struct TemplateSheet {
    pub(crate) name: String,
    /// Part name inside the package
    pub(crate) path: String,
    /// Detached copy of the sheet, ready to be cloned
    pub(crate) worksheet: Worksheet,
    content_type: String,
    relationship_type: String,
}

/// An xlsx package opened for editing
pub(crate) struct TemplateWorkbook {
    package: Package,
    /// Part names of the workbook and its styles, as found through relationships
    workbook_path: String,
    styles_path: String,
    workbook: WorkbookPart,
    relationships: Relationships,
    content_types: ContentTypes,
    styles: Styles,
    /// Number of the next `worksheets/sheet{n}.xml` part; never reuses removed names
    next_sheet_part: usize,
}

fn required_text(package: &Package, path: &str) -> Result<String, FanoutError> {
    package.text(path)?.ok_or_else(|| TemplateError::MissingPart(path.to_owned()).into())
}

/// Part name of the main workbook, read from the package relationships
fn workbook_path(package: &Package) -> Result<String, FanoutError> {
    let Some(xml) = package.text(PACKAGE_RELATIONSHIPS)? else {
        return Ok(DEFAULT_WORKBOOK.to_owned());
    };
    let relationships = Relationships::parse(&xml)?;
    let target = match relationships.find_by_kind("/officeDocument") {
        Some(id) => relationships.target(&id)?,
        None => None,
    };
    Ok(target
        .map(|target| resolve_target("", &target))
        .unwrap_or_else(|| DEFAULT_WORKBOOK.to_owned()))
}

impl TemplateWorkbook {
    /// Loads the package and drops the calculation chain, which lists cells by
    /// sheet and would go stale as soon as sheets change.
    pub(crate) fn open(bytes: &[u8]) -> Result<TemplateWorkbook, FanoutError> {
        let mut package = Package::open(bytes)?;
        let workbook_path = workbook_path(&package)?;
        let workbook = WorkbookPart::parse(&required_text(&package, &workbook_path)?)?;
        let mut relationships = Relationships::parse(&required_text(&package, &relationships_path(&workbook_path))?)?;
        let mut content_types = ContentTypes::parse(&required_text(&package, CONTENT_TYPES)?)?;
        let styles_target = match relationships.find_by_kind("/styles") {
            Some(id) => relationships.target(&id)?,
            None => None,
        };
        let styles_path = resolve_target(&workbook_path, styles_target.as_deref().unwrap_or("styles.xml"));
        let styles = Styles::parse(&required_text(&package, &styles_path)?)?;

        if let Some(id) = relationships.find_by_kind("/calcChain") {
            if let Some(target) = relationships.remove(&id)? {
                let path = resolve_target(&workbook_path, &target);
                package.remove(&path);
                content_types.remove_override(&path);
            }
        }

        let sheet_prefix = resolve_target(&workbook_path, "worksheets/sheet");
        let next_sheet_part = package
            .paths()
            .filter_map(|path| path.strip_prefix(sheet_prefix.as_str()))
            .filter_map(|rest| rest.strip_suffix(".xml"))
            .filter_map(|number| number.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        Ok(TemplateWorkbook {
            package,
            workbook_path,
            styles_path,
            workbook,
            relationships,
            content_types,
            styles,
            next_sheet_part,
        })
    }

    pub(crate) fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheets().iter().map(|sheet| sheet.name.to_owned()).collect()
    }

    /// Part name of the sheet at `index`
    fn sheet_path(&self, index: usize) -> Result<String, FanoutError> {
        let sheet = &self.workbook.sheets()[index];
        let missing = || TemplateError::MissingRelationship(
            sheet.relationship_id().unwrap_or_default().to_owned(),
            sheet.name.to_owned(),
        );
        let id = sheet.relationship_id().ok_or_else(missing)?;
        let target = self.relationships.target(id)?.ok_or_else(missing)?;
        Ok(resolve_target(&self.workbook_path, &target))
    }

    /// Finds the sheet named `preferred` (exact match), falling back to the first
    /// sheet, and prepares it for cloning.
    pub(crate) fn template_sheet(&self, preferred: &str) -> Result<TemplateSheet, FanoutError> {
        let sheets = self.workbook.sheets();
        if sheets.is_empty() {
            Err(TemplateError::NoSheets)?
        }
        let index = sheets.iter().position(|sheet| sheet.name == preferred).unwrap_or(0);
        let path = self.sheet_path(index)?;
        let xml = self
            .package
            .text(&path)?
            .ok_or_else(|| TemplateError::MissingPart(path.to_owned()))?;
        let worksheet = Worksheet::parse(&detach(&xml)?)?;
        let relationship_type = sheets[index]
            .relationship_id()
            .map(|id| self.relationships.kind(id))
            .transpose()?
            .flatten()
            .unwrap_or_else(|| WORKSHEET_RELATIONSHIP.to_owned());
        let content_type = self
            .content_types
            .override_for(&path)?
            .unwrap_or_else(|| WORKSHEET_CONTENT_TYPE.to_owned());
        Ok(TemplateSheet { name: sheets[index].name.to_owned(), path, worksheet, content_type, relationship_type })
    }

    /// Removes the sheet at `index` with its part, the part's relationships and its
    /// content type entry
    fn remove_at(&mut self, index: usize) -> Result<(), FanoutError> {
        let path = self.sheet_path(index)?;
        let entry = self.workbook.remove(index)?;
        if let Some(id) = entry.relationship_id() {
            self.relationships.remove(id)?;
        }
        self.package.remove(&path);
        self.package.remove(&relationships_path(&path));
        self.content_types.remove_override(&path);
        Ok(())
    }

    /// Removes a sheet by name (case-insensitive). Returns whether one was found.
    pub(crate) fn remove_sheet(&mut self, name: &str) -> Result<bool, FanoutError> {
        match self.workbook.position(name) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Removes the sheet stored in `path`, if it is still part of the workbook
    pub(crate) fn remove_sheet_part(&mut self, path: &str) -> Result<bool, FanoutError> {
        for index in 0..self.workbook.sheets().len() {
            if self.sheet_path(index)?.eq_ignore_ascii_case(path) {
                return self.remove_at(index).map(|_| true);
            }
        }
        Ok(false)
    }

    /// Appends `worksheet` as a new sheet named `name`, registered like `template`
    pub(crate) fn add_sheet(&mut self, name: &str, worksheet: &mut Worksheet, template: &TemplateSheet) -> Result<(), FanoutError> {
        let number = self.next_sheet_part;
        self.next_sheet_part += 1;
        let target = format!("worksheets/sheet{number}.xml");
        let path = resolve_target(&self.workbook_path, &target);
        self.package.put(&path, worksheet.to_xml()?);
        self.content_types.add_override(&path, &template.content_type);
        let id = self.relationships.add(&template.relationship_type, &target);
        self.workbook.add(name, &id)
    }

    pub(crate) fn styles_mut(&mut self) -> &mut Styles {
        &mut self.styles
    }

    pub(crate) fn to_bytes(mut self) -> Result<Vec<u8>, FanoutError> {
        self.package.put(&self.workbook_path, self.workbook.to_xml());
        self.package.put(&relationships_path(&self.workbook_path), self.relationships.to_xml());
        self.package.put(CONTENT_TYPES, self.content_types.to_xml());
        self.package.put(&self.styles_path, self.styles.to_xml());
        self.package.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::write_zip;
    use crate::spreadsheet::open_spreadsheet;
    use crate::spreadsheet::CellValue;
    use rust_xlsxwriter::Format;
    use rust_xlsxwriter::Workbook;

    fn template() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet().set_name("A").unwrap();
        sheet.write_string_with_format(0, 0, "Name", &header).unwrap();
        sheet.set_column_width(0, 30).unwrap();
        workbook.add_worksheet().set_name("Notes").unwrap().write_string(0, 0, "keep").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn clone_add_and_remove_sheets() {
        let mut workbook = TemplateWorkbook::open(&template()).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["A", "Notes"]);

        let template = workbook.template_sheet("A").unwrap();
        assert_eq!(template.path, "xl/worksheets/sheet1.xml");

        let mut clone = template.worksheet.clone();
        clone.set_value(1, 0, &CellValue::Text("north".to_owned()));
        workbook.add_sheet("North", &mut clone, &template).unwrap();
        assert!(workbook.remove_sheet("notes").unwrap());
        assert!(workbook.remove_sheet_part(&template.path).unwrap());
        assert!(!workbook.remove_sheet_part(&template.path).unwrap());
        assert_eq!(workbook.sheet_names(), vec!["North"]);

        let bytes = workbook.to_bytes().unwrap();
        let reader = open_spreadsheet("out.xlsx", bytes).unwrap();
        assert_eq!(reader.sheet_names(), vec!["North"]);
    }

    #[test]
    fn template_sheet_falls_back_to_first_sheet() {
        let workbook = TemplateWorkbook::open(&template()).unwrap();
        let template = workbook.template_sheet("Missing").unwrap();
        assert_eq!(template.name, "A");
    }

    #[test]
    fn new_parts_never_reuse_removed_names() {
        let mut workbook = TemplateWorkbook::open(&template()).unwrap();
        let template = workbook.template_sheet("A").unwrap();
        workbook.remove_sheet("A").unwrap();
        workbook.remove_sheet("Notes").unwrap();
        let mut clone = template.worksheet.clone();
        workbook.add_sheet("A", &mut clone, &template).unwrap();
        assert!(!workbook.remove_sheet_part(&template.path).unwrap());
        assert_eq!(workbook.sheet_names(), vec!["A"]);
    }

    #[test]
    fn workbook_part_found_through_package_relationships() {
        const PACKAGE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
        const MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
        const RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        let root = format!(
            r#"<Relationships xmlns="{PACKAGE}"><Relationship Id="rId1" Type="{RELATIONSHIPS}/officeDocument" Target="book/main.xml"/></Relationships>"#
        );
        let main = format!(
            r#"<workbook xmlns="{MAIN}" xmlns:r="{RELATIONSHIPS}"><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        );
        let rels = format!(
            r#"<Relationships xmlns="{PACKAGE}"><Relationship Id="rId1" Type="{RELATIONSHIPS}/worksheet" Target="sheets/one.xml"/><Relationship Id="rId2" Type="{RELATIONSHIPS}/styles" Target="look.xml"/></Relationships>"#
        );
        let sheet = format!(r#"<worksheet xmlns="{MAIN}"><sheetData/></worksheet>"#);
        let styles = format!(r#"<styleSheet xmlns="{MAIN}"><cellXfs count="1"><xf/></cellXfs></styleSheet>"#);
        let content_types = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let bytes = write_zip([
            ("[Content_Types].xml", content_types.as_bytes()),
            ("_rels/.rels", root.as_bytes()),
            ("book/main.xml", main.as_bytes()),
            ("book/_rels/main.xml.rels", rels.as_bytes()),
            ("book/sheets/one.xml", sheet.as_bytes()),
            ("book/look.xml", styles.as_bytes()),
        ])
        .unwrap();

        let mut workbook = TemplateWorkbook::open(&bytes).unwrap();
        assert_eq!(workbook.styles_path, "book/look.xml");
        let template = workbook.template_sheet("S").unwrap();
        assert_eq!(template.path, "book/sheets/one.xml");
        let mut clone = template.worksheet.clone();
        clone.set_value(0, 0, &CellValue::Number(7.0));
        workbook.add_sheet("Copy", &mut clone, &template).unwrap();
        assert!(workbook.remove_sheet_part(&template.path).unwrap());

        let reopened = TemplateWorkbook::open(&workbook.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.sheet_names(), vec!["Copy"]);
        assert_eq!(reopened.template_sheet("Copy").unwrap().path, "book/worksheets/sheet1.xml");
        assert!(reopened.package.paths().all(|path| !path.starts_with("xl/")));
    }

    #[test]
    fn not_a_package() {
        assert!(TemplateWorkbook::open(b"not a zip").is_err());
    }
}
