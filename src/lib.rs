//! # Excel Fan-out Service
//!
//! An HTTP service that splits a spreadsheet table into a bundle of workbooks built
//! from an uploaded template, and merges such bundles back into one workbook.
//!
//! ## Features
//!
//! - **Column selection**: pick columns of one sheet by 1-based position, in any order
//! - **Two-level grouping**: the first selected column names the sheet, the last one
//!   names the workbook, in order of first appearance
//! - **Template fidelity**: output sheets are XML-level clones of a template sheet,
//!   so widths, merges, print settings and conditional formats survive
//! - **Style copy without fill**: written cells take the font, border, number format
//!   and alignment of the template's first data row
//! - **Archives**: results are bundled as zip or 7z; bundles can be merged back
//!   with `/merge`
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `POST /process`
//! - `POST /merge`
pub mod archive;
pub mod config;
pub mod error;
pub mod fanout;
pub mod helpers;
pub mod server;
pub mod spreadsheet;
pub mod table;
pub(crate) mod template;

pub use crate::config::Settings;
pub use crate::error::FanoutError;
pub use crate::error::ProcessError;
pub use crate::server::router;
