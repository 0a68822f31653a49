//! In-memory result tables
//!
//! `fill_tables` is the generic fill adapter: it drains a reader into one
//! [`DataTable`] per result set. Unnamed tables are called `Table`, `Table1`,
//! `Table2`, ... in result-set order.

use serde::Serialize;

use crate::error::Result;
use crate::value::{read, read_nullable, DbValue, FromDbValue};

use super::DataReader;

/// Name given to the dataset when the caller supplies none
pub const DEFAULT_DATASET_NAME: &str = "NewDataSet";

/// Default name of the table filled from the result set at `index`
#[must_use]
pub fn default_table_name(index: usize) -> String {
    if index == 0 {
        "Table".to_string()
    } else {
        format!("Table{index}")
    }
}

/// One buffered result set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl DataTable {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self { name: name.into(), columns, rows: Vec::new() }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Ordinal of a column; exact match first, then case-insensitive
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&DbValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Typed, non-NULL cell value; a missing cell reads as NULL
    pub fn get<T: FromDbValue>(&self, row: usize, column: &str) -> Result<T> {
        read(self.value(row, column).unwrap_or(&DbValue::Null))
    }

    pub fn get_nullable<T: FromDbValue>(&self, row: usize, column: &str) -> Result<Option<T>> {
        read_nullable(self.value(row, column).unwrap_or(&DbValue::Null))
    }
}

/// Named collection of tables filled from one call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSet {
    pub name: String,
    pub tables: Vec<DataTable>,
}

impl DataSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), tables: Vec::new() }
    }

    /// Table by name (exact, then case-insensitive)
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&DataTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
    }
}

/// Drain every result set of a reader into tables
///
/// Result sets without columns (DML results) do not produce a table.
pub fn fill_tables(reader: &mut dyn DataReader) -> Result<Vec<DataTable>> {
    let mut tables = Vec::new();

    loop {
        let field_count = reader.field_count();
        if field_count > 0 {
            let mut table = DataTable::new(default_table_name(tables.len()), reader.columns()?);
            while reader.read()? {
                let row = (0..field_count).map(|i| reader.value(i).cloned()).collect::<Result<Vec<_>>>()?;
                table.rows.push(row);
            }
            tables.push(table);
        }

        if !reader.next_result()? {
            break;
        }
    }

    Ok(tables)
}
