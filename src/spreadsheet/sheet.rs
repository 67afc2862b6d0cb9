use crate::spreadsheet::cell::Cell;

/// Non-empty cells of one sheet, in document order (row-major for SpreadsheetML).
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    /// First row holding a cell
    pub(crate) row_lower_bound: Option<usize>,
    /// Leftmost column holding a cell
    pub(crate) col_lower_bound: Option<usize>,
    /// Rightmost column holding a cell
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            row_lower_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(crate) fn push(&mut self, cell: Cell) {
        self.row_lower_bound = Some(self.row_lower_bound.map_or(cell.row, |row| row.min(cell.row)));
        self.col_lower_bound = Some(self.col_lower_bound.map_or(cell.col, |col| col.min(cell.col)));
        self.col_upper_bound = Some(self.col_upper_bound.map_or(cell.col, |col| col.max(cell.col)));
        self.cells.push(cell);
    }

    /// Number of columns from the leftmost through the rightmost used column.
    pub(crate) fn width(&self) -> usize {
        match (self.col_lower_bound, self.col_upper_bound) {
            (Some(first), Some(last)) => last - first + 1,
            _ => 0,
        }
    }

    /// Iterates over the rows that hold at least one cell, each as `(row, cells)`
    /// with cells ordered by column.
    pub(crate) fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.cells
            .chunk_by(|left, right| left.row == right.row)
            .map(|cells| (cells[0].row, cells))
    }
}

/// Finds the cell of one row at a column
pub(crate) fn cell_at(cells: &[Cell], col: usize) -> Option<&Cell> {
    cells
        .binary_search_by_key(&col, |cell| cell.col)
        .ok()
        .map(|index| &cells[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;

    fn push(sheet: &mut Sheet, row: usize, col: usize) {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::InlineString,
            value: format!("{row}:{col}"),
        });
    }

    #[test]
    fn bounds_follow_cells() {
        let mut sheet = Sheet::new("");
        assert_eq!(sheet.width(), 0);
        assert_eq!(sheet.row_lower_bound, None);

        push(&mut sheet, 1, 1);
        push(&mut sheet, 1, 3);
        push(&mut sheet, 3, 1);
        assert_eq!(sheet.cells.len(), 3);
        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.width(), 3);
    }

    #[test]
    fn sheet_rows() {
        let mut sheet = Sheet::new("");
        push(&mut sheet, 0, 0);
        push(&mut sheet, 0, 2);
        push(&mut sheet, 4, 1);

        let rows: Vec<(usize, usize)> = sheet.rows().map(|(row, cells)| (row, cells.len())).collect();
        assert_eq!(rows, vec![(0, 2), (4, 1)]);

        let (_, first) = sheet.rows().next().unwrap();
        assert_eq!(cell_at(first, 2).map(|cell| cell.value.as_str()), Some("0:2"));
        assert!(cell_at(first, 1).is_none());
    }
}
