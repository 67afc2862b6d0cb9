use crate::error::FanoutError;
use glob::Pattern;

/// Criteria for filtering and selecting data from spreadsheets.
#[derive(Clone, Debug, Default)]
pub(crate) struct Criteria {
    /// Sheet name patterns for filtering which sheets to process.
    pub(crate) sheet_name_patterns: Option<Vec<Pattern>>,

    /// Maximum number of sheets to read.
    pub(crate) sheet_limit: Option<usize>,

    /// Convert error cells to missing values instead of failing.
    pub(crate) error_as_null: bool,
}

impl Criteria {
    /// Selects the one sheet whose name equals `name` exactly.
    pub(crate) fn exact_sheet(name: &str) -> Result<Criteria, FanoutError> {
        Ok(Criteria {
            sheet_name_patterns: Some(vec![Pattern::new(&Pattern::escape(name))?]),
            sheet_limit: Some(1),
            ..Criteria::default()
        })
    }

    /// Selects every sheet whose name starts with `prefix`.
    pub(crate) fn sheet_prefix(prefix: &str) -> Result<Criteria, FanoutError> {
        Ok(Criteria {
            sheet_name_patterns: Some(vec![Pattern::new(&format!("{}*", Pattern::escape(prefix)))?]),
            ..Criteria::default()
        })
    }

    /// Checks if a sheet name matches the criteria patterns.
    /// Returns true if no patterns are specified or if name matches any pattern.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        if let Some(patterns) = &self.sheet_name_patterns {
            for pattern in patterns {
                if pattern.matches(sheet_name) {
                    return true;
                }
            }
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_sheet_escapes_glob_characters() {
        let criteria = Criteria::exact_sheet("02-[汇总]*").unwrap();
        assert!(criteria.accept("02-[汇总]*"));
        assert!(!criteria.accept("02-汇"));
        assert!(!criteria.accept("02-[汇总]*x"));
        assert_eq!(criteria.sheet_limit, Some(1));
    }

    #[test]
    fn sheet_prefix_matches_start_only() {
        let criteria = Criteria::sheet_prefix("03").unwrap();
        assert!(criteria.accept("03"));
        assert!(criteria.accept("03-明细"));
        assert!(!criteria.accept("A03"));
        assert!(Criteria::default().accept("anything"));
    }
}
