use thiserror::Error;

/// Failures caused by the request itself: bad parameters, unexpected uploads or
/// inputs that produce nothing to return. Every variant is reported to the client.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Invalid column specification: {0}")]
    InvalidColumnSpec(String),

    #[error("Requested column {column} is out of range, the sheet only has {available} columns")]
    ColumnOutOfRange { column: usize, available: usize },

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("{0}")]
    EmptyResult(String),

    #[error("Unsupported archive format '{0}', expected .zip or .7z")]
    UnsupportedArchiveFormat(String),

    #[error("Unable to read archive '{name}': {message}")]
    UnreadableArchive { name: String, message: String },

    #[error("No Excel files found in archive")]
    NoExcelEntriesFound,

    #[error("No sheets starting with '{0}' found in archive")]
    NoMatchingSheets(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Unable to read workbook '{name}': {message}")]
    UnreadableWorkbook { name: String, message: String },

    #[error("Missing form field '{0}'")]
    MissingField(String),

    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },
}

impl ProcessError {
    /// Stable name of the failure kind, used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::InvalidColumnSpec(_) => "InvalidColumnSpec",
            ProcessError::ColumnOutOfRange { .. } => "ColumnOutOfRange",
            ProcessError::SheetNotFound(_) => "SheetNotFound",
            ProcessError::EmptyResult(_) => "EmptyResult",
            ProcessError::UnsupportedArchiveFormat(_) => "UnsupportedArchiveFormat",
            ProcessError::UnreadableArchive { .. } => "UnreadableArchive",
            ProcessError::NoExcelEntriesFound => "NoExcelEntriesFound",
            ProcessError::NoMatchingSheets(_) => "NoMatchingSheets",
            ProcessError::InvalidTemplate(_) => "InvalidTemplate",
            ProcessError::UnreadableWorkbook { .. } => "UnreadableWorkbook",
            ProcessError::MissingField(_) => "MissingField",
            ProcessError::InvalidParameter { .. } => "InvalidParameter",
        }
    }
}

/// Main error type of the crate.
/// Aggregates errors from the standard library, dependencies and internal modules.
#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    StringConversionError(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlEscapeError(#[from] quick_xml::escape::EscapeError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XlsxWriterError(#[from] rust_xlsxwriter::XlsxError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Domain module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    TemplateError(#[from] crate::template::TemplateError),

    #[error("{0}")]
    ArchiveError(#[from] crate::archive::ArchiveError),

    #[error("{0}")]
    ProcessError(#[from] ProcessError),
}

impl FanoutError {
    /// Returns the request-level failure, if this error is one.
    pub fn as_process_error(&self) -> Option<&ProcessError> {
        match self {
            FanoutError::ProcessError(error) => Some(error),
            _ => None,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, FanoutError> {
    /// Prefixes internal errors with a context message.
    /// Request-level failures pass through untouched so their kind survives.
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| match e {
            FanoutError::ProcessError(_) => e,
            e => FanoutError::WithContextError(format!("{}: {}", message, e)),
        })
    }
}
