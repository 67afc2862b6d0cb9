//! # Spreadsheet Reading
//!
//! Reads uploaded Excel workbooks (`.xlsx`, `.xlsm`, `.xlam`) straight from memory.
//! Cell types are detected from the cell type attribute and the number format of
//! the cell style, shared strings are resolved, and sheets are selected by name
//! patterns.
pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod excel;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xlsx;

use crate::error::FanoutError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::io::Cursor;
use thiserror::Error;

pub use crate::spreadsheet::cell::CellValue;

/// Reader type for packages held in memory
pub(crate) type PackageReader = Cursor<Vec<u8>>;

/// File extensions handled by the workbook reader
pub(crate) const SPREADSHEET_EXTENSIONS: [&str; 3] = [".xlsx", ".xlsm", ".xlam"];

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("File '{0}' is missing from the package")]
    FileError(String),

    #[error("Spreadsheet '{0}' is password protected or not an Office Open XML workbook")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Spreadsheet '{0}' contains no sheets")]
    SpreadsheetEmptyError(String),

    #[error("Error value '{3}' at {0} -> {1}!{2}")]
    CellValueError(String, String, String, String),

    #[error("Unsupported spreadsheet format '{0}'")]
    UnsupportedFormatError(String),
}

/// Common interface of workbook readers.
pub(crate) trait Spreadsheet {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the sheets accepted by `criteria`, in workbook order
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, FanoutError>;
}

/// Whether a file name carries one of the supported spreadsheet extensions
pub(crate) fn is_spreadsheet_name(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|extension| lower.ends_with(extension))
}

/// Opens an uploaded spreadsheet, choosing the reader from the file extension.
/// Names without an extension are read as xlsx.
pub(crate) fn open_spreadsheet(file_name: &str, bytes: Vec<u8>) -> Result<Box<dyn Spreadsheet>, FanoutError> {
    let has_extension = file_name.rsplit('/').next().map(|base| base.contains('.')).unwrap_or(false);
    if has_extension && !is_spreadsheet_name(file_name) {
        Err(SpreadsheetError::UnsupportedFormatError(file_name.to_owned()))?
    }
    Ok(Box::new(XlsxSpreadsheet::open(file_name, bytes)?))
}
