use crate::error::FanoutError;
use crate::error::ProcessError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::sheet::cell_at;
use crate::spreadsheet::sheet::Sheet;
use crate::table::ColumnSpec;
use crate::table::ExtractedTable;
use crate::table::Row;
use tracing::debug;

/// Loads one sheet of an uploaded workbook and keeps only the requested columns.
///
/// Rows and columns count from the used area of the sheet: `header_row` is the
/// 0-based offset of the header from the first row holding a cell (`None` when the
/// sheet has no header), and position 0 is the leftmost column holding a cell.
///
/// # Errors
/// * `UnreadableWorkbook` when the upload is not a readable workbook
/// * `SheetNotFound` when no sheet is named `sheet_name`
/// * `ColumnOutOfRange` when a position lies beyond the used columns
pub fn extract_table(
    file_name: &str,
    bytes: Vec<u8>,
    sheet_name: &str,
    spec: &ColumnSpec,
    header_row: Option<usize>,
) -> Result<ExtractedTable, FanoutError> {
    let unreadable = |error: FanoutError| -> FanoutError {
        ProcessError::UnreadableWorkbook {
            name: file_name.to_owned(),
            message: error.to_string(),
        }
        .into()
    };

    let mut spreadsheet = open_spreadsheet(file_name, bytes).map_err(unreadable)?;
    let criteria = Criteria {
        error_as_null: true,
        ..Criteria::exact_sheet(sheet_name)?
    };
    let sheet = spreadsheet
        .read_sheets(&criteria)
        .map_err(unreadable)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            debug!(file = file_name, available = ?spreadsheet.sheet_names(), "sheet not found");
            ProcessError::SheetNotFound(sheet_name.to_owned())
        })?;

    let available = sheet.width();
    if let Some(position) = spec.positions().iter().find(|position| **position >= available) {
        Err(ProcessError::ColumnOutOfRange { column: position + 1, available })?
    }

    let table = select_columns(sheet, spec, header_row);
    debug!(
        file = file_name,
        sheet = sheet_name,
        columns = table.columns().len(),
        rows = table.rows().len(),
        "extracted table"
    );
    Ok(table)
}

/// Builds the table from the selected columns; the sheet is consumed so only the
/// selection stays alive.
fn select_columns(sheet: Sheet, spec: &ColumnSpec, header_row: Option<usize>) -> ExtractedTable {
    let first_col = sheet.col_lower_bound.unwrap_or(0);
    let header_row = header_row.map(|offset| sheet.row_lower_bound.unwrap_or(0) + offset);
    let positions: Vec<usize> = spec.positions().iter().map(|position| first_col + position).collect();
    let header = header_row.and_then(|header_row| {
        sheet.rows().find(|(row, _)| *row == header_row).map(|(_, cells)| cells)
    });
    let columns = spec
        .positions()
        .iter()
        .zip(&positions)
        .map(|(position, col)| {
            header
                .and_then(|cells| cell_at(cells, *col))
                .map(|cell| cell.to_string())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("column{}", position + 1))
        })
        .collect();

    let rows: Vec<Row> = sheet
        .rows()
        .filter(|(row, _)| header_row.map(|header_row| *row > header_row).unwrap_or(true))
        .map(|(_, cells)| {
            positions
                .iter()
                .map(|position| cell_at(cells, *position).and_then(|cell| cell.to_value()))
                .collect::<Row>()
        })
        .filter(|row| row.iter().any(Option::is_some))
        .collect();

    ExtractedTable::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::CellValue;
    use rust_xlsxwriter::Workbook;

    fn workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Data").unwrap();
        sheet.write_string(0, 0, "title row").unwrap();
        for (col, name) in ["id", "region", "amount", "city"].iter().enumerate() {
            sheet.write_string(1, col as u16, *name).unwrap();
        }
        sheet.write_string(2, 0, "r1").unwrap();
        sheet.write_string(2, 1, "north").unwrap();
        sheet.write_number(2, 2, 10).unwrap();
        sheet.write_string(2, 3, "Oslo").unwrap();
        sheet.write_string(4, 0, "r2").unwrap();
        sheet.write_string(4, 1, "south").unwrap();
        sheet.write_string(4, 3, "Rome").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    fn spec(text: &str) -> ColumnSpec {
        ColumnSpec::parse(text).unwrap()
    }

    #[test]
    fn extracts_requested_columns_in_order() {
        let table = extract_table("data.xlsx", workbook(), "Data", &spec("4,2,3"), Some(1)).unwrap();
        assert_eq!(table.columns(), &["city".to_owned(), "region".to_owned(), "amount".to_owned()]);
        assert_eq!(table.rows(), &[
            vec![Some(CellValue::Text("Oslo".to_owned())), Some(CellValue::Text("north".to_owned())), Some(CellValue::Number(10.0))],
            vec![Some(CellValue::Text("Rome".to_owned())), Some(CellValue::Text("south".to_owned())), None],
        ]);
    }

    #[test]
    fn without_header_uses_positional_names() {
        let table = extract_table("data.xlsx", workbook(), "Data", &spec("1"), None).unwrap();
        assert_eq!(table.columns(), &["column1".to_owned()]);
        assert_eq!(table.rows().len(), 4);
    }

    #[test]
    fn header_and_positions_follow_used_area() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Data").unwrap();
        for (col, name) in ["item", "qty", "region"].iter().enumerate() {
            sheet.write_string(1, col as u16 + 1, *name).unwrap();
        }
        sheet.write_string(2, 1, "pens").unwrap();
        sheet.write_number(2, 2, 1).unwrap();
        sheet.write_string(2, 3, "north").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = extract_table("data.xlsx", bytes.clone(), "Data", &spec("1,2,3"), Some(0)).unwrap();
        assert_eq!(table.columns(), &["item".to_owned(), "qty".to_owned(), "region".to_owned()]);
        assert_eq!(table.rows(), &[
            vec![Some(CellValue::Text("pens".to_owned())), Some(CellValue::Number(1.0)), Some(CellValue::Text("north".to_owned()))],
        ]);

        let error = extract_table("data.xlsx", bytes, "Data", &spec("4"), Some(0)).unwrap_err();
        assert!(matches!(
            error.as_process_error(),
            Some(ProcessError::ColumnOutOfRange { column: 4, available: 3 })
        ));
    }

    #[test]
    fn column_out_of_range() {
        let error = extract_table("data.xlsx", workbook(), "Data", &spec("1,5"), Some(1)).unwrap_err();
        match error.as_process_error() {
            Some(ProcessError::ColumnOutOfRange { column, available }) => {
                assert_eq!(*column, 5);
                assert_eq!(*available, 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn sheet_not_found() {
        let error = extract_table("data.xlsx", workbook(), "Missing", &spec("1"), Some(0)).unwrap_err();
        assert!(matches!(error.as_process_error(), Some(ProcessError::SheetNotFound(name)) if name == "Missing"));
    }

    #[test]
    fn unreadable_upload() {
        let error = extract_table("data.xlsx", b"plain text".to_vec(), "Data", &spec("1"), Some(0)).unwrap_err();
        assert!(matches!(error.as_process_error(), Some(ProcessError::UnreadableWorkbook { .. })));
    }
}
