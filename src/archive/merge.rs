use crate::archive::read_archive;
use crate::archive::ArchiveFormat;
use crate::error::FanoutError;
use crate::error::ProcessError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::is_spreadsheet_name;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::sheet::cell_at;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::SPREADSHEET_EXTENSIONS;
use crate::table::Row;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Rows above the data in every merged sheet, counted from its first used row
const HEADER_ROWS: usize = 3;

/// Segment of an `_` separated file name that identifies the source file
const FILE_KEY_SEGMENT: usize = 4;

/// Trimmed rows of one sheet and where they came from
#[derive(Clone, Debug, PartialEq)]
struct MergedBlock {
    sheet_name: String,
    file_key: String,
    /// Source columns (0-based) of the values in each row
    columns: Vec<usize>,
    rows: Vec<Row>,
}

/// Extracts every sheet starting with `sheet_prefix` from the spreadsheets inside an
/// uploaded archive and stacks them into a single xlsx workbook.
///
/// Entries that cannot be read are logged and skipped.
pub fn merge_archive(file_name: &str, bytes: Vec<u8>, sheet_prefix: &str) -> Result<Vec<u8>, FanoutError> {
    let format = ArchiveFormat::from_file_name(file_name)
        .ok_or_else(|| ProcessError::UnsupportedArchiveFormat(file_name.to_owned()))?;
    let entries = read_archive(format, bytes, is_spreadsheet_name).map_err(|error| ProcessError::UnreadableArchive {
        name: file_name.to_owned(),
        message: error.to_string(),
    })?;
    if entries.is_empty() {
        Err(ProcessError::NoExcelEntriesFound)?
    }

    let criteria = Criteria {
        error_as_null: true,
        ..Criteria::sheet_prefix(sheet_prefix)?
    };
    let entry_count = entries.len();
    let mut blocks = Vec::new();
    for (name, bytes) in entries {
        match read_blocks(&name, bytes, &criteria) {
            Ok(found) => blocks.extend(found),
            Err(error) => warn!(entry = %name, %error, "skipping unreadable archive entry"),
        }
    }

    let rows: usize = blocks.iter().map(|block| block.rows.len()).sum();
    if rows == 0 {
        Err(ProcessError::NoMatchingSheets(sheet_prefix.to_owned()))?
    }
    info!(entries = entry_count, sheets = blocks.len(), rows, "merge finished");
    write_merged(&blocks)
}

/// Source identifier carried into the merged rows.
///
/// File names follow the `a_b_c_d_<key>_…` convention; names with fewer segments
/// are used whole. The spreadsheet extension is dropped.
pub(crate) fn file_key(entry_name: &str) -> String {
    let base = entry_name.rsplit(['/', '\\']).next().unwrap_or(entry_name);
    let key = base.split('_').nth(FILE_KEY_SEGMENT).unwrap_or(base);
    let lower = key.to_lowercase();
    SPREADSHEET_EXTENSIONS
        .iter()
        .find(|extension| lower.ends_with(*extension))
        .map(|extension| key[..key.len() - extension.len()].to_owned())
        .unwrap_or_else(|| key.to_owned())
}

fn read_blocks(entry_name: &str, bytes: Vec<u8>, criteria: &Criteria) -> Result<Vec<MergedBlock>, FanoutError> {
    let file_key = file_key(entry_name);
    let mut spreadsheet = open_spreadsheet(entry_name, bytes)?;
    let blocks: Vec<MergedBlock> = spreadsheet
        .read_sheets(criteria)?
        .iter()
        .map(|sheet| trim_sheet(sheet, &file_key))
        .collect();
    debug!(entry = entry_name, sheets = blocks.len(), "entry read");
    Ok(blocks)
}

/// Drops unused columns, the header rows and the leading column, and keeps the
/// rows that have a value in the first column left.
fn trim_sheet(sheet: &Sheet, file_key: &str) -> MergedBlock {
    let mut used: Vec<usize> = sheet.cells.iter().map(|cell| cell.col).collect();
    used.sort_unstable();
    used.dedup();
    let columns: Vec<usize> = used.into_iter().skip(1).collect();

    let first_data_row = sheet.row_lower_bound.unwrap_or(0) + HEADER_ROWS;
    let rows = sheet
        .rows()
        .filter(|(row, _)| *row >= first_data_row)
        .map(|(_, cells)| {
            columns
                .iter()
                .map(|col| cell_at(cells, *col).and_then(|cell| cell.to_value()))
                .collect::<Row>()
        })
        .filter(|row| matches!(row.first(), Some(Some(value)) if !value.is_blank()))
        .collect();

    MergedBlock {
        sheet_name: sheet.name.to_owned(),
        file_key: file_key.to_owned(),
        columns,
        rows,
    }
}

/// Writes all blocks under one header, aligning values by source column letter
fn write_merged(blocks: &[MergedBlock]) -> Result<Vec<u8>, FanoutError> {
    let mut columns: Vec<usize> = Vec::new();
    for col in blocks.iter().flat_map(|block| block.columns.iter()) {
        if !columns.contains(col) {
            columns.push(*col);
        }
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.write_string_with_format(0, 0, "sheet_name", &bold)?;
    sheet.write_string_with_format(0, 1, "file_key", &bold)?;
    for (index, col) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, (index + 2) as u16, index_to_col(*col), &bold)?;
    }

    let mut row = 1u32;
    for block in blocks {
        let targets: Vec<u16> = block
            .columns
            .iter()
            .map(|col| columns.iter().position(|merged| merged == col).unwrap_or_default() as u16 + 2)
            .collect();
        for values in &block.rows {
            sheet.write_string(row, 0, block.sheet_name.as_str())?;
            sheet.write_string(row, 1, block.file_key.as_str())?;
            for (value, target) in values.iter().zip(&targets) {
                if let Some(value) = value {
                    write_value(sheet, row, *target, value)?;
                }
            }
            row += 1;
        }
    }
    Ok(workbook.save_to_buffer()?)
}

fn write_value(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<(), FanoutError> {
    match value {
        CellValue::Number(number) => sheet.write_number(row, col, *number)?,
        CellValue::Boolean(boolean) => sheet.write_boolean(row, col, *boolean)?,
        CellValue::Text(text) | CellValue::Temporal { text, .. } => sheet.write_string(row, col, text.as_str())?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::assemble;
    use crate::archive::write_archive;
    use crate::fanout::fan_out;
    use crate::fanout::DataColumnOffset;
    use crate::fanout::FanoutOptions;
    use crate::fanout::GroupingLayout;
    use crate::table::ExtractedTable;

    fn read_back(bytes: Vec<u8>) -> Vec<Vec<String>> {
        let mut reader = open_spreadsheet("merged.xlsx", bytes).unwrap();
        let sheets = reader.read_sheets(&Criteria::default()).unwrap();
        let sheet = &sheets[0];
        let width = sheet.width();
        sheet
            .rows()
            .map(|(_, cells)| {
                (0..width)
                    .map(|col| cell_at(cells, col).map(|cell| cell.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn report(sheet_names: &[&str]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for name in sheet_names {
            let sheet = workbook.add_worksheet().set_name(*name).unwrap();
            sheet.write_string(1, 0, "Quarterly report").unwrap();
            sheet.write_string(2, 1, "key").unwrap();
            sheet.write_string(3, 1, "value").unwrap();
            sheet.write_number(4, 0, 1).unwrap();
            sheet.write_string(4, 1, "k1").unwrap();
            sheet.write_number(4, 2, 10).unwrap();
            sheet.write_string(4, 4, "e1").unwrap();
            sheet.write_number(5, 0, 2).unwrap();
            sheet.write_number(5, 2, 20).unwrap();
            sheet.write_number(6, 0, 3).unwrap();
            sheet.write_string(6, 1, "k3").unwrap();
            sheet.write_boolean(6, 4, true).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn file_keys() {
        assert_eq!(file_key("dir/2024_q1_east_team_NORTH_final.xlsx"), "NORTH");
        assert_eq!(file_key("a_b_c_d_KEY.XLSX"), "KEY");
        assert_eq!(file_key("report.xlsm"), "report");
        assert_eq!(file_key("a_b_c.xlsx"), "a_b_c");
        assert_eq!(file_key("dir\\plain"), "plain");
    }

    #[test]
    fn merge_trims_and_tags_sheets() {
        let archive = write_archive(
            ArchiveFormat::Zip,
            [
                ("x_x_x_x_F1.xlsx", report(&["03-a", "04-skip"]).as_slice()),
                ("notes.txt", b"ignored".as_slice()),
            ],
        )
        .unwrap();
        let merged = merge_archive("bundle.zip", archive, "03").unwrap();
        assert_eq!(
            read_back(merged),
            vec![
                strings(&["sheet_name", "file_key", "B", "C", "E"]),
                strings(&["03-a", "F1", "k1", "10", "e1"]),
                strings(&["03-a", "F1", "k3", "", "true"]),
            ]
        );
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let good = report(&["03"]);
        let archive = write_archive(
            ArchiveFormat::SevenZ,
            [("broken.xlsx", b"garbage".as_slice()), ("good.xlsx", good.as_slice())],
        )
        .unwrap();
        let rows = read_back(merge_archive("bundle.7z", archive, "03").unwrap());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], "good");
    }

    #[test]
    fn fan_out_output_merges_back() {
        let text = |value: &str| Some(CellValue::Text(value.to_owned()));
        let table = ExtractedTable::new(
            strings(&["item", "qty", "note", "region"]),
            vec![
                vec![text("03-a"), text("1"), text("x"), text("north")],
                vec![text("03-a"), text("2"), text("y"), text("north")],
                vec![text("03-b"), text("3"), text("z"), text("south")],
            ],
        );
        let mut template = Workbook::new();
        template.add_worksheet().set_name("A").unwrap().write_string(0, 0, "Report").unwrap();
        let options = FanoutOptions {
            layout: GroupingLayout::from_column_count(4, DataColumnOffset::AfterInnerKey).unwrap(),
            data_start: 4,
            template_sheet: "A".to_owned(),
        };
        let workbooks = fan_out(&table, &template.save_to_buffer().unwrap(), &options).unwrap();
        let archive = assemble(ArchiveFormat::Zip, &workbooks).unwrap();

        let rows = read_back(merge_archive("processed_excels.zip", archive.clone(), "03").unwrap());
        assert_eq!(rows.len(), 1 + table.rows().len());
        assert_eq!(rows[1], strings(&["03-a", "north", "x"]));
        assert_eq!(rows[3], strings(&["03-b", "south", "z"]));

        let error = merge_archive("processed_excels.zip", archive, "99").unwrap_err();
        assert_eq!(error.as_process_error().map(ProcessError::kind), Some("NoMatchingSheets"));
    }

    #[test]
    fn archive_errors() {
        let kind = |file_name: &str, bytes: Vec<u8>| {
            merge_archive(file_name, bytes, "03").unwrap_err().as_process_error().map(ProcessError::kind)
        };
        assert_eq!(kind("bundle.rar", Vec::new()), Some("UnsupportedArchiveFormat"));
        assert_eq!(kind("bundle.zip", b"not a zip".to_vec()), Some("UnreadableArchive"));
        let only_text = write_archive(ArchiveFormat::Zip, [("notes.txt", b"x".as_slice())]).unwrap();
        assert_eq!(kind("bundle.zip", only_text), Some("NoExcelEntriesFound"));
    }
}
