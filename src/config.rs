use crate::archive::ArchiveFormat;
use crate::fanout::DataColumnOffset;
use clap::Parser;

/// Server settings, read from command line flags or `FANOUT_*` environment variables.
#[derive(Parser, Clone, Debug)]
#[command(name = "excel-fanout", version, about = "Splits spreadsheets into templated workbooks and merges them back.")]
pub struct Settings {
    /// Address to listen on.
    #[arg(long, env = "FANOUT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "FANOUT_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Container of `/process` downloads, unless the request picks one.
    #[arg(long, env = "FANOUT_ARCHIVE_FORMAT", value_enum, default_value_t = ArchiveFormat::Zip)]
    pub archive_format: ArchiveFormat,

    /// Sheet of the template workbook that output sheets are cloned from.
    /// The first sheet is used when no sheet has this name.
    #[arg(long, env = "FANOUT_TEMPLATE_SHEET", default_value = "A")]
    pub template_sheet: String,

    /// Where the written data columns start within the selected columns.
    #[arg(long, env = "FANOUT_DATA_COLUMN_OFFSET", value_enum, default_value_t = DataColumnOffset::AfterInnerKey)]
    pub data_column_offset: DataColumnOffset,

    /// Sheet name prefix picked up by `/merge`, unless the request picks one.
    #[arg(long, env = "FANOUT_MERGE_SHEET_PREFIX", default_value = "03")]
    pub merge_sheet_prefix: String,

    /// Log filter in `tracing_subscriber::EnvFilter` syntax.
    #[arg(long, env = "FANOUT_LOG", default_value = "info")]
    pub log: String,
}

impl Settings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            archive_format: ArchiveFormat::Zip,
            template_sheet: "A".to_owned(),
            data_column_offset: DataColumnOffset::AfterInnerKey,
            merge_sheet_prefix: "03".to_owned(),
            log: "info".to_owned(),
        }
    }
}
