//! Database Driver Boundary
//!
//! The executor talks to databases only through the traits in this module:
//! [`Driver`] opens a [`Connection`], a connection creates a [`Command`], and a
//! command produces a [`DataReader`] over one or more result sets.
//!
//! Borrowing follows the resource hierarchy. A command borrows its connection
//! and a reader borrows its command, so a reader can never outlive the command
//! that produced it and neither can outlive the connection. Release is `Drop`:
//! dropping a reader or command releases it, and [`Connection::close`] is the
//! one explicit release step because closing can fail.
//!
//! # Engines
//! Each engine (`SQLite`, `MySQL`, `PostgreSQL`) lives in its own submodule
//! behind a cargo feature. The async engines wrap their client in a private
//! current-thread runtime, so every trait here is blocking.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SprocketError};
use crate::params::Parameter;
use crate::value::{
    read, read_enum_from_label, read_enum_from_value, read_nullable, read_nullable_enum_from_label,
    read_nullable_enum_from_value, read_nullable_or, DbEnum, DbValue, FromDbValue,
};

pub mod table;

pub use table::{fill_tables, DataSet, DataTable};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Detect the engine from a connection string's scheme
    ///
    /// # Errors
    /// Returns `InvalidInput` for an unrecognised scheme.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let lower = connection_string.trim_start().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Ok(Self::MySQL)
        } else if lower.starts_with("sqlite:") {
            Ok(Self::SQLite)
        } else {
            // Never echo the string itself: it may carry a password
            Err(SprocketError::invalid_input(
                "Unrecognised connection string scheme (expected postgres://, mysql:// or sqlite:)",
            ))
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a command's text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// The text is the name of a stored procedure
    StoredProcedure,
    /// The text is raw SQL
    Text,
}

/// Factory for connections to one kind of database
pub trait Driver {
    type Connection: Connection;

    /// Engine name for logging
    fn engine(&self) -> &'static str;

    /// Open a connection
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if the database cannot be reached.
    fn open(&self, connection_string: &str) -> Result<Self::Connection>;
}

/// An open database session
pub trait Connection {
    type Command<'c>: Command
    where
        Self: 'c;

    /// Whether the connection can still execute commands
    fn is_open(&self) -> bool;

    /// Create a command bound to this connection
    fn create_command(&mut self, text: &str, command_type: CommandType) -> Result<Self::Command<'_>>;

    /// Close the connection. Closing an already closed connection is a no-op.
    fn close(&mut self) -> Result<()>;

    fn begin(&mut self) -> Result<()> {
        self.create_command("BEGIN", CommandType::Text)?.execute_non_query().map(|_| ())
    }

    fn commit(&mut self) -> Result<()> {
        self.create_command("COMMIT", CommandType::Text)?.execute_non_query().map(|_| ())
    }

    fn rollback(&mut self) -> Result<()> {
        self.create_command("ROLLBACK", CommandType::Text)?.execute_non_query().map(|_| ())
    }
}

/// A prepared call with bound parameters
pub trait Command {
    type Reader<'r>: DataReader
    where
        Self: 'r;

    fn set_timeout(&mut self, timeout: Duration);

    fn timeout(&self) -> Duration;

    /// Bind one parameter. Parameters are bound in the order given.
    fn bind(&mut self, param: &Parameter) -> Result<()>;

    /// Execute and return the number of rows affected
    fn execute_non_query(&mut self) -> Result<u64>;

    /// Execute and return a forward-only reader over the result sets
    fn execute_reader(&mut self) -> Result<Self::Reader<'_>>;

    /// First column of the first row of the first result set, NULL if there is none
    fn execute_scalar(&mut self) -> Result<DbValue> {
        let mut reader = self.execute_reader()?;
        if reader.field_count() == 0 || !reader.read()? {
            return Ok(DbValue::Null);
        }
        let value = reader.value(0)?.clone();
        Ok(value)
    }

    /// Buffer every result set into tables named `Table`, `Table1`, ...
    fn fill(&mut self) -> Result<Vec<DataTable>> {
        let mut reader = self.execute_reader()?;
        fill_tables(&mut reader)
    }
}

/// Forward-only cursor over the rows of one or more result sets
///
/// Before the first [`read`](Self::read) there is no current row.
pub trait DataReader {
    /// Advance to the next row of the current result set
    fn read(&mut self) -> Result<bool>;

    /// Number of columns in the current result set
    fn field_count(&self) -> usize;

    /// Column name at an ordinal
    fn name(&self, ordinal: usize) -> Result<&str>;

    /// Value of a column in the current row
    fn value(&self, ordinal: usize) -> Result<&DbValue>;

    /// Advance to the next result set
    fn next_result(&mut self) -> Result<bool>;

    /// Ordinal of a column; exact match first, then case-insensitive
    fn ordinal(&self, name: &str) -> Result<usize> {
        let names: Vec<&str> = (0..self.field_count()).filter_map(|i| self.name(i).ok()).collect();
        names
            .iter()
            .position(|n| *n == name)
            .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(name)))
            .ok_or_else(|| SprocketError::invalid_input(format!("Column '{name}' not found in result set")))
    }

    /// Column names of the current result set
    fn columns(&self) -> Result<Vec<String>> {
        (0..self.field_count()).map(|i| self.name(i).map(str::to_string)).collect()
    }
}

/// Typed column accessors by name, available on every reader
pub trait ReaderExt: DataReader {
    /// # Errors
    /// `InvalidCast` if the column is NULL or not convertible.
    fn get<T: FromDbValue>(&self, column: &str) -> Result<T> {
        read(self.value(self.ordinal(column)?)?)
    }

    fn get_nullable<T: FromDbValue>(&self, column: &str) -> Result<Option<T>> {
        read_nullable(self.value(self.ordinal(column)?)?)
    }

    fn get_nullable_or<T: FromDbValue>(&self, column: &str, value_if_null: Option<T>) -> Result<Option<T>> {
        read_nullable_or(self.value(self.ordinal(column)?)?, value_if_null)
    }

    fn get_enum_from_value<E: DbEnum>(&self, column: &str) -> Result<E> {
        read_enum_from_value(self.value(self.ordinal(column)?)?)
    }

    fn get_nullable_enum_from_value<E: DbEnum>(&self, column: &str, null_value: Option<E>) -> Result<Option<E>> {
        read_nullable_enum_from_value(self.value(self.ordinal(column)?)?, null_value)
    }

    fn get_enum_from_label<E: DbEnum>(&self, column: &str, ignore_case: bool) -> Result<E> {
        read_enum_from_label(self.value(self.ordinal(column)?)?, ignore_case)
    }

    fn get_nullable_enum_from_label<E: DbEnum>(
        &self,
        column: &str,
        ignore_case: bool,
        null_value: Option<E>,
    ) -> Result<Option<E>> {
        read_nullable_enum_from_label(self.value(self.ordinal(column)?)?, ignore_case, null_value)
    }
}

impl<R: DataReader + ?Sized> ReaderExt for R {}

/// Reader over result sets already held in memory
///
/// Drivers whose client hands back complete result sets (`MySQL`, `PostgreSQL`)
/// use this as their reader type.
#[derive(Debug, Clone, Default)]
pub struct BufferedReader {
    tables: Vec<DataTable>,
    current: usize,
    row: Option<usize>,
}

impl BufferedReader {
    #[must_use]
    pub fn new(tables: Vec<DataTable>) -> Self {
        Self { tables, current: 0, row: None }
    }

    fn table(&self) -> Option<&DataTable> {
        self.tables.get(self.current)
    }
}

impl DataReader for BufferedReader {
    fn read(&mut self) -> Result<bool> {
        let Some(rows) = self.table().map(|t| t.rows.len()) else {
            return Ok(false);
        };
        let next = self.row.map_or(0, |r| r + 1);
        if next < rows {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = Some(rows);
            Ok(false)
        }
    }

    fn field_count(&self) -> usize {
        self.table().map_or(0, |t| t.columns.len())
    }

    fn name(&self, ordinal: usize) -> Result<&str> {
        self.table()
            .and_then(|t| t.columns.get(ordinal))
            .map(String::as_str)
            .ok_or_else(|| SprocketError::invalid_input(format!("Column ordinal {ordinal} out of range")))
    }

    fn value(&self, ordinal: usize) -> Result<&DbValue> {
        let table = self.table().ok_or_else(|| SprocketError::invalid_input("No current result set"))?;
        let row = self
            .row
            .and_then(|r| table.rows.get(r))
            .ok_or_else(|| SprocketError::invalid_input("No current row; call read() first"))?;
        row.get(ordinal)
            .ok_or_else(|| SprocketError::invalid_input(format!("Column ordinal {ordinal} out of range")))
    }

    fn next_result(&mut self) -> Result<bool> {
        if self.current < self.tables.len() {
            self.current += 1;
        }
        self.row = None;
        Ok(self.current < self.tables.len())
    }
}

/// Bound an async round trip by the command timeout; zero means no limit
#[cfg(any(feature = "mysql", feature = "postgres"))]
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    if timeout.is_zero() {
        return work.await;
    }

    tokio::time::timeout(timeout, work).await.map_err(|_| {
        SprocketError::query_failed(format!("Command exceeded timeout of {}s", timeout.as_secs_f64()))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_sets() -> BufferedReader {
        BufferedReader::new(vec![
            DataTable {
                name: "Table".into(),
                columns: vec!["Id".into(), "Name".into()],
                rows: vec![
                    vec![DbValue::Int(1), DbValue::Text("a".into())],
                    vec![DbValue::Int(2), DbValue::Null],
                ],
            },
            DataTable { name: "Table1".into(), columns: vec!["Total".into()], rows: vec![vec![DbValue::BigInt(2)]] },
        ])
    }

    #[test]
    fn test_database_type_serialization() {
        assert_eq!(serde_json::to_string(&DatabaseType::Postgres).unwrap(), r#""postgres""#);
        assert_eq!(serde_json::to_string(&DatabaseType::MySQL).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&DatabaseType::SQLite).unwrap(), r#""sqlite""#);
    }

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(DatabaseType::from_connection_string("postgres://u@h/db").unwrap(), DatabaseType::Postgres);
        assert_eq!(DatabaseType::from_connection_string("postgresql://u@h/db").unwrap(), DatabaseType::Postgres);
        assert_eq!(DatabaseType::from_connection_string("mysql://u@h/db").unwrap(), DatabaseType::MySQL);
        assert_eq!(DatabaseType::from_connection_string("sqlite::memory:").unwrap(), DatabaseType::SQLite);
        assert_eq!(DatabaseType::from_connection_string("sqlite://app.db").unwrap(), DatabaseType::SQLite);

        let err = DatabaseType::from_connection_string("Server=x;Password=secret").unwrap_err();
        assert!(!err.message().contains("secret"));
    }

    #[test]
    fn test_buffered_reader_walks_result_sets() {
        let mut reader = two_sets();
        assert_eq!(reader.field_count(), 2);
        assert!(reader.value(0).is_err(), "no current row before read()");

        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>("Id").unwrap(), 1);
        assert!(reader.read().unwrap());
        assert_eq!(reader.get_nullable::<String>("name").unwrap(), None);
        assert!(!reader.read().unwrap());

        assert!(reader.next_result().unwrap());
        assert_eq!(reader.columns().unwrap(), vec!["Total"]);
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i64>("Total").unwrap(), 2);

        assert!(!reader.next_result().unwrap());
        assert!(!reader.read().unwrap());
    }

    #[test]
    fn test_ordinal_unknown_column() {
        let reader = two_sets();
        assert!(matches!(reader.ordinal("Missing"), Err(SprocketError::InvalidInput(_))));
    }

    #[test]
    fn test_reader_ext_on_trait_object() {
        let mut buffered = two_sets();
        let reader: &mut dyn DataReader = &mut buffered;
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i64>("Id").unwrap(), 1);
    }
}
