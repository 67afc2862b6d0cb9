//! # Grouped Template Fan-out
//!
//! Splits a table into workbooks and sheets by two key columns. Every outer key
//! gets its own copy of the template workbook, every inner key a sheet cloned
//! from the template sheet, filled with the rows of that group.
pub(crate) mod group;
pub mod layout;
pub(crate) mod naming;

use crate::error::FanoutError;
use crate::error::ProcessError;
use crate::error::ResultMessage;
use crate::fanout::group::group_key;
use crate::fanout::group::group_rows;
use crate::fanout::naming::sheet_name;
use crate::table::ExtractedTable;
use crate::table::Row;
use crate::template::styles::StyleCopier;
use crate::template::worksheet::Worksheet;
use crate::template::TemplateSheet;
use crate::template::TemplateWorkbook;
use tracing::debug;
use tracing::info;

pub use crate::fanout::layout::DataColumnOffset;
pub use crate::fanout::layout::GroupingLayout;
pub(crate) use crate::fanout::naming::entry_stem;

/// Parameters of one fan-out run
#[derive(Clone, Debug)]
pub struct FanoutOptions {
    pub layout: GroupingLayout,
    /// 1-based sheet row receiving the first data row; its cells supply the styles
    pub data_start: usize,
    /// Name of the sheet to clone, the first sheet is used when it is absent
    pub template_sheet: String,
}

/// One generated workbook per outer key, as `(outer key, xlsx bytes)` in the order
/// the keys first appear in the table.
///
/// # Errors
/// * `InvalidParameter` when `data_start` is 0
/// * `EmptyResult` when no row has both keys
/// * `InvalidTemplate` when the template cannot be opened or has no sheets
pub fn fan_out(table: &ExtractedTable, template: &[u8], options: &FanoutOptions) -> Result<Vec<(String, Vec<u8>)>, FanoutError> {
    if options.data_start == 0 {
        Err(ProcessError::InvalidParameter { name: "data_start".to_owned(), value: "0".to_owned() })?
    }

    let layout = &options.layout;
    let keyed = table
        .rows()
        .iter()
        .filter(|row| group_key(row, layout.inner_key()).is_some());
    let groups = group_rows(keyed, layout.outer_key());
    if groups.is_empty() {
        Err(ProcessError::EmptyResult("No rows with both group keys found".to_owned()))?
    }

    let mut workbooks = Vec::with_capacity(groups.len());
    for (key, rows) in groups {
        let bytes = build_workbook(template, &rows, options)
            .with_prefix(&format!("Build workbook for '{key}'"))?;
        workbooks.push((key, bytes));
    }
    info!(workbooks = workbooks.len(), rows = table.rows().len(), "fan-out finished");
    Ok(workbooks)
}

/// Builds the workbook of one outer group from a fresh copy of the template
fn build_workbook(template: &[u8], rows: &[&Row], options: &FanoutOptions) -> Result<Vec<u8>, FanoutError> {
    let invalid_template = |error: FanoutError| -> FanoutError {
        match error {
            FanoutError::ProcessError(_) => error,
            error => ProcessError::InvalidTemplate(error.to_string()).into(),
        }
    };
    let mut workbook = TemplateWorkbook::open(template).map_err(invalid_template)?;
    let template_sheet = workbook.template_sheet(&options.template_sheet).map_err(invalid_template)?;
    debug!(sheets = ?workbook.sheet_names(), template = %template_sheet.name, "template opened");

    let groups = group_rows(rows.iter().copied(), options.layout.inner_key());
    for (key, rows) in &groups {
        let name = sheet_name(key);
        if workbook.remove_sheet(&name)? {
            debug!(sheet = %name, "replaced existing sheet");
        }
        let mut worksheet = fill_sheet(&mut workbook, &template_sheet, rows, options);
        workbook.add_sheet(&name, &mut worksheet, &template_sheet)?;
        debug!(sheet = %name, rows = rows.len(), "sheet written");
    }

    workbook.remove_sheet_part(&template_sheet.path)?;
    workbook.to_bytes()
}

/// Clones the template sheet and writes the data columns of `rows` from the data
/// start row down. Missing values leave their cell untouched.
fn fill_sheet(
    workbook: &mut TemplateWorkbook,
    template: &TemplateSheet,
    rows: &[&Row],
    options: &FanoutOptions,
) -> Worksheet {
    let first_row = options.data_start - 1;
    let columns = options.layout.data_columns();
    let template_styles: Vec<u32> = (0..columns.len())
        .map(|col| template.worksheet.style_at(first_row, col))
        .collect();

    let mut worksheet = template.worksheet.clone();
    let mut copier = StyleCopier::new(workbook.styles_mut());
    for (offset, row) in rows.iter().enumerate() {
        let sheet_row = first_row + offset;
        for (col, position) in columns.clone().enumerate() {
            let Some(value) = row.get(position).and_then(Option::as_ref) else {
                continue;
            };
            let style = copier.copy_without_fill(template_styles[col], worksheet.style_at(sheet_row, col));
            worksheet.set_value(sheet_row, col, value);
            worksheet.set_style(sheet_row, col, style);
        }
    }
    worksheet
}
