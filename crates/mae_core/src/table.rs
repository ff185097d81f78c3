use std::ops::Index;

use indexmap::IndexMap;

use crate::error::{MaeError, Result};
use crate::value::{PropertyName, Value};

/// Scalar properties of a block, in declaration order.
pub type PropertyMap = IndexMap<PropertyName, Value>;

/// Column-oriented table of an indexed block (`m_atom`, `m_bond`, ...).
///
/// Every column holds exactly [`ColumnTable::len`] values; the constructors
/// refuse anything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    columns: IndexMap<PropertyName, Vec<Value>>,
    rows: usize,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table that already knows its row count.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: IndexMap::new(),
            rows,
        }
    }

    pub fn from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (PropertyName, Vec<Value>)>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column. The first column of a table with no rows fixes the
    /// row count.
    pub fn push_column(&mut self, name: PropertyName, values: Vec<Value>) -> Result<()> {
        if self.columns.contains_key(name.as_str()) {
            return Err(MaeError::schema(format!("column '{name}' declared twice")));
        }
        if self.columns.is_empty() && self.rows == 0 {
            self.rows = values.len();
        } else if values.len() != self.rows {
            return Err(MaeError::schema(format!(
                "column '{name}' has {} values but the table has {} rows",
                values.len(),
                self.rows
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        self.columns.shift_remove(name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.columns.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &PropertyName> {
        self.columns.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyName, &[Value])> {
        self.columns
            .iter()
            .map(|(name, values)| (name, values.as_slice()))
    }

    /// Values of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<(&PropertyName, &Value)>> {
        if index >= self.rows {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(name, values)| (name, &values[index]))
                .collect(),
        )
    }

    /// Overwrite one cell of an existing column.
    pub fn set(&mut self, row: usize, name: &str, value: Value) -> Result<()> {
        let rows = self.rows;
        let values = self
            .columns
            .get_mut(name)
            .ok_or_else(|| MaeError::schema(format!("undeclared column '{name}'")))?;
        let cell = values.get_mut(row).ok_or_else(|| {
            MaeError::schema(format!("row {row} out of range for a table of {rows} rows"))
        })?;
        *cell = value;
        Ok(())
    }
}

impl Index<&str> for ColumnTable {
    type Output = [Value];

    fn index(&self, name: &str) -> &[Value] {
        match self.get(name) {
            Some(values) => values,
            None => panic!("no column named '{name}'"),
        }
    }
}
