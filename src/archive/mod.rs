//! # Archives
//!
//! Bundles generated workbooks into one download and unpacks uploaded bundles.
//! Two containers are supported: zip (deflate) and 7z.
pub mod merge;

use crate::error::FanoutError;
use crate::error::ProcessError;
use crate::fanout::entry_stem;
use crate::helpers::zip::write_zip;
use crate::helpers::zip::ZipHelper;
use clap::ValueEnum;
use sevenz_rust::Password;
use sevenz_rust::SevenZArchiveEntry;
use sevenz_rust::SevenZReader;
use sevenz_rust::SevenZWriter;
use std::collections::HashSet;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;
use zip::ZipArchive;

pub use crate::archive::merge::merge_archive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("7z archive error: {0}")]
    SevenZError(String),
}

/// Container format of an archive
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ArchiveFormat {
    #[default]
    Zip,
    #[value(name = "7z")]
    SevenZ,
}

impl ArchiveFormat {
    /// Detects the format from a file extension, ignoring case
    pub fn from_file_name(file_name: &str) -> Option<ArchiveFormat> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".7z") {
            Some(ArchiveFormat::SevenZ)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZ => "7z",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "application/zip",
            ArchiveFormat::SevenZ => "application/x-7z-compressed",
        }
    }

    /// Download name for an archive of this format
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ProcessError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        <ArchiveFormat as ValueEnum>::from_str(text.trim(), true).map_err(|_| ProcessError::InvalidParameter {
            name: "archive_format".to_owned(),
            value: text.to_owned(),
        })
    }
}

/// Names the generated workbooks `<key>.xlsx` and packs them in order.
/// Keys that end up with the same name get a ` (2)`, ` (3)`… suffix.
pub fn assemble(format: ArchiveFormat, workbooks: &[(String, Vec<u8>)]) -> Result<Vec<u8>, FanoutError> {
    let mut taken = HashSet::new();
    let entries: Vec<(String, &[u8])> = workbooks
        .iter()
        .map(|(key, bytes)| {
            let stem = entry_stem(key);
            let mut name = format!("{stem}.xlsx");
            let mut counter = 1;
            while !taken.insert(name.to_lowercase()) {
                counter += 1;
                name = format!("{stem} ({counter}).xlsx");
            }
            (name, bytes.as_slice())
        })
        .collect();
    write_archive(format, entries.iter().map(|(name, bytes)| (name.as_str(), *bytes)))
}

/// Writes named buffers into a new archive held in memory
pub fn write_archive<'a, I>(format: ArchiveFormat, entries: I) -> Result<Vec<u8>, FanoutError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    match format {
        ArchiveFormat::Zip => write_zip(entries),
        ArchiveFormat::SevenZ => write_seven_zip(entries),
    }
}

fn write_seven_zip<'a, I>(entries: I) -> Result<Vec<u8>, FanoutError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let seven_zip_error = |error: sevenz_rust::Error| ArchiveError::SevenZError(error.to_string());
    let mut writer = SevenZWriter::new(Cursor::new(Vec::new())).map_err(seven_zip_error)?;
    for (name, bytes) in entries {
        let mut entry = SevenZArchiveEntry::default();
        entry.name = name.to_owned();
        entry.has_stream = true;
        writer
            .push_archive_entry(entry, Some(Cursor::new(bytes)))
            .map_err(seven_zip_error)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Reads every file entry accepted by `filter`, in archive order
pub fn read_archive<F>(format: ArchiveFormat, bytes: Vec<u8>, filter: F) -> Result<Vec<(String, Vec<u8>)>, FanoutError>
where
    F: Fn(&str) -> bool,
{
    match format {
        ArchiveFormat::Zip => ZipArchive::new(Cursor::new(bytes))?.read_entries(filter),
        ArchiveFormat::SevenZ => {
            let seven_zip_error = |error: sevenz_rust::Error| ArchiveError::SevenZError(error.to_string());
            let length = bytes.len() as u64;
            let mut reader = SevenZReader::new(Cursor::new(bytes), length, Password::empty()).map_err(seven_zip_error)?;
            let mut entries = Vec::new();
            reader
                .for_each_entries(|entry, content| {
                    if entry.is_directory || !filter(&entry.name) {
                        return Ok(true);
                    }
                    let mut bytes = Vec::with_capacity(entry.size as usize);
                    content.read_to_end(&mut bytes)?;
                    entries.push((entry.name.to_owned(), bytes));
                    Ok(true)
                })
                .map_err(seven_zip_error)?;
            Ok(entries)
        }
    }
}
