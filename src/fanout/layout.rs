use crate::error::ProcessError;
use clap::ValueEnum;
use std::ops::Range;

/// Which extracted columns are written into the output sheets.
/// The outer key column is never written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DataColumnOffset {
    /// Columns between the inner and the outer key
    #[default]
    AfterInnerKey,
    /// The inner key followed by the columns up to the outer key
    FromInnerKey,
}

/// Roles of the extracted columns: the first one names the sheet, the last one
/// names the workbook, and a run of columns in between is written as data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupingLayout {
    inner_key: usize,
    outer_key: usize,
    data_columns: Range<usize>,
}

impl GroupingLayout {
    /// Derives the layout from the number of selected columns, at least two.
    pub fn from_column_count(count: usize, offset: DataColumnOffset) -> Result<GroupingLayout, ProcessError> {
        if count < 2 {
            Err(ProcessError::InvalidColumnSpec(format!(
                "{count} column(s) selected, at least two are required"
            )))?
        }
        let first_data_column = match offset {
            DataColumnOffset::AfterInnerKey => 1,
            DataColumnOffset::FromInnerKey => 0,
        };
        Ok(GroupingLayout {
            inner_key: 0,
            outer_key: count - 1,
            data_columns: first_data_column..count - 1,
        })
    }

    /// Table column that names the output sheet
    pub fn inner_key(&self) -> usize {
        self.inner_key
    }

    /// Table column that names the output workbook
    pub fn outer_key(&self) -> usize {
        self.outer_key
    }

    /// Table columns written as data, left to right
    pub fn data_columns(&self) -> Range<usize> {
        self.data_columns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_skips_both_keys() {
        let layout = GroupingLayout::from_column_count(5, DataColumnOffset::default()).unwrap();
        assert_eq!(layout.inner_key(), 0);
        assert_eq!(layout.outer_key(), 4);
        assert_eq!(layout.data_columns(), 1..4);
    }

    #[test]
    fn from_inner_key_writes_inner_key() {
        let layout = GroupingLayout::from_column_count(3, DataColumnOffset::FromInnerKey).unwrap();
        assert_eq!(layout.data_columns(), 0..2);
    }

    #[test]
    fn two_columns_write_nothing() {
        let layout = GroupingLayout::from_column_count(2, DataColumnOffset::AfterInnerKey).unwrap();
        assert!(layout.data_columns().is_empty());
    }

    #[test]
    fn at_least_two_columns() {
        for count in [0, 1] {
            let error = GroupingLayout::from_column_count(count, DataColumnOffset::AfterInnerKey).unwrap_err();
            assert_eq!(error.kind(), "InvalidColumnSpec");
        }
    }

    #[test]
    fn offset_names() {
        assert_eq!(DataColumnOffset::from_str("after-inner-key", false), Ok(DataColumnOffset::AfterInnerKey));
        assert_eq!(DataColumnOffset::from_str("from-inner-key", false), Ok(DataColumnOffset::FromInnerKey));
        assert!(DataColumnOffset::from_str("middle", false).is_err());
    }
}
