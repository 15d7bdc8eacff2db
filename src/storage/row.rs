use std::{cmp::Ordering, fmt};

use itertools::Itertools;

use super::Cell;

/// Identity of the base table row an index row points to. Row locks are
/// taken on this, not on the index row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowLocation(pub u64);

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "loc_{}", self.0)
    }
}

/// A row of an index: the key columns followed by the location of the base
/// row in the last column.
///
/// Search keys use the same type but may carry fewer columns than a stored
/// row (a partial key), and no location.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct IndexRow {
    cells: Vec<Cell>,
}

impl IndexRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn with_location(key: Vec<Cell>, location: RowLocation) -> Self {
        let mut cells = key;
        cells.push(Cell::Int64(location.0 as i64));
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get_cell(&self, i: usize) -> &Cell {
        &self.cells[i]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The location stored in the last column, if that column holds one.
    pub fn location(&self) -> Option<RowLocation> {
        match self.cells.last() {
            Some(Cell::Int64(v)) if *v >= 0 => Some(RowLocation(*v as u64)),
            _ => None,
        }
    }

    /// The first `n` columns as a (partial) search key.
    pub fn prefix(&self, n: usize) -> IndexRow {
        IndexRow::new(self.cells[..n.min(self.cells.len())].to_vec())
    }

    /// Keep only the columns whose bit is set.
    pub fn project<I>(&self, columns: I) -> IndexRow
    where
        I: IntoIterator<Item = usize>,
    {
        IndexRow::new(
            columns
                .into_iter()
                .filter(|i| *i < self.cells.len())
                .map(|i| self.cells[i].clone())
                .collect(),
        )
    }
}

impl fmt::Display for IndexRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.cells.iter().join(", "))
    }
}

impl fmt::Debug for IndexRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Shape of an index: how many key columns it has, whether the key columns
/// alone are unique, and the sort direction of each key column.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    key_columns: usize,
    unique: bool,
    ascending: Vec<bool>,
}

impl IndexSchema {
    pub fn new(key_columns: usize, unique: bool) -> Self {
        Self {
            key_columns,
            unique,
            ascending: vec![true; key_columns],
        }
    }

    /// Set the direction of the key columns, missing entries stay
    /// ascending.
    pub fn with_ascending(mut self, ascending: Vec<bool>) -> Self {
        for (i, asc) in ascending.into_iter().enumerate().take(self.key_columns) {
            self.ascending[i] = asc;
        }
        self
    }

    pub fn key_columns(&self) -> usize {
        self.key_columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Width of a stored row, key columns plus the location.
    pub fn row_width(&self) -> usize {
        self.key_columns + 1
    }

    /// Number of leading columns that identify a row. For a non-unique index
    /// the location is part of the identity.
    pub fn n_unique_columns(&self) -> usize {
        if self.unique {
            self.key_columns
        } else {
            self.key_columns + 1
        }
    }

    pub fn is_ascending(&self, column: usize) -> bool {
        self.ascending.get(column).copied().unwrap_or(true)
    }

    /// Compare a row stored in the index with a search key.
    ///
    /// At most `n_unique_columns` columns take part. When the key runs out
    /// of columns before that and every compared column is equal, the row
    /// is a partial key match and `partial_key_order` is returned.
    pub fn compare(
        &self,
        row: &IndexRow,
        key: &IndexRow,
        partial_key_order: Ordering,
    ) -> Ordering {
        let unique_columns = self.n_unique_columns();
        let columns = unique_columns.min(key.len()).min(row.len());

        for i in 0..columns {
            let mut order = row.get_cell(i).cmp(key.get_cell(i));
            if !self.is_ascending(i) {
                order = order.reverse();
            }
            if order != Ordering::Equal {
                return order;
            }
        }

        if key.len() >= unique_columns {
            Ordering::Equal
        } else {
            partial_key_order
        }
    }

    /// Order of two complete rows.
    pub fn compare_rows(&self, a: &IndexRow, b: &IndexRow) -> Ordering {
        self.compare(a, b, Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: i64, b: i64, loc: u64) -> IndexRow {
        IndexRow::with_location(vec![Cell::Int64(a), Cell::Int64(b)], RowLocation(loc))
    }

    #[test]
    fn test_partial_key_order() {
        let schema = IndexSchema::new(2, false);
        let key = IndexRow::new(vec![Cell::Int64(5)]);

        assert_eq!(schema.compare(&row(5, 1, 0), &key, Ordering::Greater), Ordering::Greater);
        assert_eq!(schema.compare(&row(5, 1, 0), &key, Ordering::Less), Ordering::Less);
        assert_eq!(schema.compare(&row(4, 9, 0), &key, Ordering::Greater), Ordering::Less);
        assert_eq!(schema.compare(&row(6, 0, 0), &key, Ordering::Less), Ordering::Greater);
    }

    #[test]
    fn test_unique_ignores_location() {
        let schema = IndexSchema::new(2, true);
        assert_eq!(schema.compare_rows(&row(5, 1, 3), &row(5, 1, 7)), Ordering::Equal);

        let schema = IndexSchema::new(2, false);
        assert_eq!(schema.compare_rows(&row(5, 1, 3), &row(5, 1, 7)), Ordering::Less);
    }

    #[test]
    fn test_descending_column() {
        let schema = IndexSchema::new(2, false).with_ascending(vec![false]);
        assert_eq!(schema.compare_rows(&row(6, 0, 0), &row(5, 0, 0)), Ordering::Less);
    }
}
