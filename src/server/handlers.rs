use crate::archive::assemble;
use crate::archive::merge_archive;
use crate::error::FanoutError;
use crate::fanout::fan_out;
use crate::fanout::FanoutOptions;
use crate::fanout::GroupingLayout;
use crate::server::error::ApiError;
use crate::server::form::Form;
use crate::server::AppState;
use crate::table::extract_table;
use crate::table::ColumnSpec;
use axum::extract::Multipart;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use serde_json::Value;
use tracing::info;

const DEFAULT_SHEET_NAME: &str = "02-项目汇总表";
const DEFAULT_USECOLS: &str = "4,5,6,9,11";
const DEFAULT_HEADER_ROW: usize = 1;
const DEFAULT_DATA_START: usize = 4;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "message": "Welcome to Excel Processor" }))
}

/// `POST /process`: extracts the selected columns of the data workbook and returns
/// one filled copy of the template per outer key, bundled in an archive.
pub(crate) async fn process(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let mut form = Form::read(multipart).await?;
    let data = form.file("data_file")?;
    let template = form.file("template_file")?;
    let sheet_name = form.text("sheet_name")?.unwrap_or(DEFAULT_SHEET_NAME).to_owned();
    let spec = ColumnSpec::parse(form.text("usecols")?.unwrap_or(DEFAULT_USECOLS))?;
    // 1-based, 0 means the sheet has no header
    let header_row = form.parse("header_row", DEFAULT_HEADER_ROW)?.checked_sub(1);
    let data_start = form.parse("data_start", DEFAULT_DATA_START)?;
    let format = form.parse("archive_format", state.settings.archive_format)?;

    let options = FanoutOptions {
        layout: GroupingLayout::from_column_count(spec.len(), state.settings.data_column_offset)?,
        data_start,
        template_sheet: state.settings.template_sheet.to_owned(),
    };
    info!(file = %data.file_name, sheet = %sheet_name, columns = spec.len(), "process request");

    let archive = run_blocking(move || {
        let table = extract_table(&data.file_name, data.bytes, &sheet_name, &spec, header_row)?;
        let workbooks = fan_out(&table, &template.bytes, &options)?;
        assemble(format, &workbooks)
    })
    .await?;
    Ok(download(format.content_type(), &format.file_name("processed_excels"), archive))
}

/// `POST /merge`: stacks the prefixed sheets of every workbook in an uploaded
/// archive into one workbook.
pub(crate) async fn merge(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let mut form = Form::read(multipart).await?;
    let upload = form.file("file")?;
    let prefix = form
        .text("sheet_prefix")?
        .unwrap_or(state.settings.merge_sheet_prefix.as_str())
        .to_owned();
    info!(file = %upload.file_name, prefix = %prefix, "merge request");

    let merged = run_blocking(move || merge_archive(&upload.file_name, upload.bytes, &prefix)).await?;
    Ok(download(XLSX_CONTENT_TYPE, "merged.xlsx", merged))
}

/// Runs spreadsheet work on the blocking pool
async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, FanoutError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| FanoutError::WithContextError(format!("Worker task failed: {error}")))?;
    Ok(result?)
}

fn download(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_owned()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        bytes,
    )
        .into_response()
}
