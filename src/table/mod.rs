//! Column selection and the in-memory table handed to the fan-out.
pub mod column_spec;
pub mod extract;

use crate::spreadsheet::CellValue;

pub use column_spec::ColumnSpec;
pub use extract::extract_table;

/// One table row, one optional value per selected column
pub type Row = Vec<Option<CellValue>>;

/// Selected columns of one sheet.
///
/// Columns appear in the order they were requested, rows in sheet order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ExtractedTable {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> ExtractedTable {
        ExtractedTable { columns, rows }
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
