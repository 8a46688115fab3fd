//! The in-memory table.

use crate::field_type::Type;
use crate::type_detection::infer_column_types;
use crate::value::Value;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: Type,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Row-major table of typed cells.
///
/// Every row holds exactly one value per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// A table with no columns and no rows.
    pub const fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a table from typed parts.
    ///
    /// # Panics
    ///
    /// Panics if a row's width differs from the number of columns.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        assert!(
            rows.iter().all(|r| r.len() == columns.len()),
            "every row must have one value per column"
        );
        Self { columns, rows }
    }

    /// Infer column types from raw fields and convert every cell.
    ///
    /// Records must already have the header's width.
    pub fn from_records(header: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let types = infer_column_types(&records, header.len());
        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .iter()
                    .zip(&types)
                    .map(|(raw, &ty)| Value::parse(raw, ty))
                    .collect()
            })
            .collect();
        let columns = header
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Column { name, ty })
            .collect();
        Self::new(columns, rows)
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterate the cells of one column.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Replace every cell of column `idx` and set its type.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per row.
    pub fn replace_column(&mut self, idx: usize, ty: Type, values: Vec<Value>) {
        assert_eq!(values.len(), self.rows.len(), "one value per row");
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        self.columns[idx].ty = ty;
    }
}
