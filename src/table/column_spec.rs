use crate::error::ProcessError;
use std::str::FromStr;

/// Ordered column positions chosen by the user.
///
/// Users write 1-based column numbers (`"4,5,6,9,11"`), positions are kept 0-based.
/// Order and duplicates are preserved as written because the order decides which
/// column plays which role during grouping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    positions: Vec<usize>,
}

impl ColumnSpec {
    /// Parses comma separated 1-based column numbers.
    ///
    /// Whitespace around tokens is ignored and empty tokens are dropped. The first
    /// token that is not a positive integer is reported in the error.
    pub fn parse(text: &str) -> Result<ColumnSpec, ProcessError> {
        let mut positions = Vec::new();
        for token in text.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            let number = token
                .bytes()
                .all(|byte| byte.is_ascii_digit())
                .then(|| token.parse::<usize>().ok())
                .flatten()
                .filter(|number| *number >= 1)
                .ok_or_else(|| ProcessError::InvalidColumnSpec(format!("'{token}' is not a positive column number")))?;
            positions.push(number - 1);
        }
        Ok(ColumnSpec { positions })
    }

    /// 0-based positions in the order given
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl FromStr for ColumnSpec {
    type Err = ProcessError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        ColumnSpec::parse(text)
    }
}
