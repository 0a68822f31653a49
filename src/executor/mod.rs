//! Stored-Procedure Executor
//!
//! [`ProcedureExecutor`] runs a stored procedure in one of five modes
//! (non-query, scalar, reader, table fill, dataset fill) and guarantees that
//! every resource it acquires is released on every exit path.
//!
//! # Connection Ownership
//! - `execute_*` / `fill_*`: the executor opens a connection from
//!   [`ExecutorSettings::connection_string`] and closes it before returning,
//!   whether the call succeeded, failed or unwound.
//! - `*_on` variants: the caller supplies an open connection. The executor
//!   reuses it as-is and never closes it, so several calls can share one
//!   connection or one transaction.
//!
//! # Implementation Notes
//! - Stateless: the executor holds only its driver and settings
//! - Release order is reader, then command, then connection
//! - A failure to close never replaces the error that made the call fail;
//!   it is logged at `warn` and dropped
//! - Parameter sets are borrowed and never mutated

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::{Command, CommandType, Connection, DataReader, DataSet, DataTable, Driver};
use crate::error::{Result, SprocketError};
use crate::params::{ParameterSet, DEFAULT_ID_PARAM_NAME};
use crate::value::{DbValue, FromDbValue};

/// Default timeout for non-query and scalar calls
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for reader calls
pub const DEFAULT_READER_TIMEOUT: Duration = Duration::from_secs(180);

/// Default timeout for table and dataset fills
pub const DEFAULT_FILL_TIMEOUT: Duration = Duration::from_secs(320);

/// Configuration injected into a [`ProcedureExecutor`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Connection string for executor-owned connections
    pub connection_string: String,
    pub command_timeout: Duration,
    pub reader_timeout: Duration,
    pub fill_timeout: Duration,
    /// Parameter name used by [`ProcedureExecutor::identifier`]
    pub identifier_parameter: String,
}

impl ExecutorSettings {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self { connection_string: connection_string.into(), ..Self::default() }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reader_timeout: DEFAULT_READER_TIMEOUT,
            fill_timeout: DEFAULT_FILL_TIMEOUT,
            identifier_parameter: DEFAULT_ID_PARAM_NAME.to_string(),
        }
    }
}

// Connection strings carry credentials
impl std::fmt::Debug for ExecutorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSettings")
            .field("connection_string", &"<redacted>")
            .field("command_timeout", &self.command_timeout)
            .field("reader_timeout", &self.reader_timeout)
            .field("fill_timeout", &self.fill_timeout)
            .field("identifier_parameter", &self.identifier_parameter)
            .finish()
    }
}

/// Execution mode, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    NonQuery,
    Scalar,
    Reader,
    Fill,
}

impl Mode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NonQuery => "non_query",
            Self::Scalar => "scalar",
            Self::Reader => "reader",
            Self::Fill => "fill",
        }
    }
}

/// Executor-owned connection, closed exactly once
///
/// `release` closes it and reports the outcome; if the guard is dropped
/// without `release` (early return or unwinding) `Drop` closes it instead.
struct OwnedConnection<C: Connection> {
    conn: C,
    released: bool,
}

impl<C: Connection> OwnedConnection<C> {
    const fn new(conn: C) -> Self {
        Self { conn, released: false }
    }

    /// Close the connection; the call's own error always wins over a close error
    fn release<T, E: From<SprocketError>>(mut self, result: std::result::Result<T, E>) -> std::result::Result<T, E> {
        self.released = true;
        let closed = self.conn.close();

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(error = %close_err, "failed to close connection after a failed call");
                Err(err)
            }
        }
    }
}

impl<C: Connection> Drop for OwnedConnection<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.conn.close() {
            tracing::warn!(error = %e, "failed to close connection");
        }
    }
}

/// Runs stored procedures through a [`Driver`]
#[derive(Debug, Clone)]
pub struct ProcedureExecutor<D: Driver> {
    driver: D,
    settings: ExecutorSettings,
}

impl<D: Driver> ProcedureExecutor<D> {
    pub const fn new(driver: D, settings: ExecutorSettings) -> Self {
        Self { driver, settings }
    }

    pub const fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// One-parameter set named by [`ExecutorSettings::identifier_parameter`]
    #[must_use]
    pub fn identifier(&self, id: i32) -> ParameterSet {
        ParameterSet::with_named_identifier(&self.settings.identifier_parameter, id)
    }

    /// Open a connection the caller owns and must close
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if the driver cannot connect.
    pub fn open_connection(&self) -> Result<D::Connection> {
        tracing::debug!(engine = self.driver.engine(), "opening connection");
        self.driver.open(&self.settings.connection_string)
    }

    fn acquire(&self) -> Result<OwnedConnection<D::Connection>> {
        self.open_connection().map(OwnedConnection::new)
    }

    /// Run several calls on one executor-owned connection
    pub fn execute_in_connection<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<SprocketError>,
        F: FnOnce(&mut D::Connection) -> std::result::Result<T, E>,
    {
        let mut owned = self.acquire()?;
        let result = f(&mut owned.conn);
        owned.release(result)
    }

    /// Run several calls inside one transaction
    ///
    /// Commits when `f` succeeds and rolls back when it fails. A rollback
    /// failure is logged and the error from `f` is returned.
    pub fn in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<SprocketError>,
        F: FnOnce(&mut D::Connection) -> std::result::Result<T, E>,
    {
        self.execute_in_connection(|conn| {
            conn.begin()?;
            match f(conn) {
                Ok(value) => {
                    conn.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = conn.rollback() {
                        tracing::warn!(error = %rollback_err, "failed to roll back transaction");
                    }
                    Err(err)
                }
            }
        })
    }

    /// Execute a procedure for its side effects
    ///
    /// # Errors
    /// Any connection, binding or execution failure.
    pub fn execute_non_query(&self, procedure: &str, params: &ParameterSet) -> Result<()> {
        self.execute_non_query_count(procedure, params).map(|_| ())
    }

    /// Execute a procedure and return the number of rows it affected
    pub fn execute_non_query_count(&self, procedure: &str, params: &ParameterSet) -> Result<u64> {
        let mut owned = self.acquire()?;
        let result = self.non_query(&mut owned.conn, procedure, params);
        owned.release(result)
    }

    pub fn execute_non_query_on(&self, conn: &mut D::Connection, procedure: &str, params: &ParameterSet) -> Result<()> {
        self.execute_non_query_count_on(conn, procedure, params).map(|_| ())
    }

    pub fn execute_non_query_count_on(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
    ) -> Result<u64> {
        ensure_open(conn)?;
        self.non_query(conn, procedure, params)
    }

    /// First column of the first row, or NULL when the procedure returns no rows
    pub fn execute_scalar(&self, procedure: &str, params: &ParameterSet) -> Result<DbValue> {
        let mut owned = self.acquire()?;
        let result = self.scalar(&mut owned.conn, procedure, params);
        owned.release(result)
    }

    pub fn execute_scalar_on(&self, conn: &mut D::Connection, procedure: &str, params: &ParameterSet) -> Result<DbValue> {
        ensure_open(conn)?;
        self.scalar(conn, procedure, params)
    }

    /// Scalar converted to `T`
    ///
    /// # Errors
    /// Returns `ScalarCast` if the scalar is NULL or does not convert to `T`.
    pub fn execute_scalar_as<T: FromDbValue>(&self, procedure: &str, params: &ParameterSet) -> Result<T> {
        self.execute_scalar(procedure, params).and_then(|value| cast_scalar(&value))
    }

    pub fn execute_scalar_as_on<T: FromDbValue>(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
    ) -> Result<T> {
        self.execute_scalar_on(conn, procedure, params).and_then(|value| cast_scalar(&value))
    }

    /// Execute a procedure and hand its live reader to `handler`
    ///
    /// The handler is called exactly once and advances the cursor itself.
    /// Its error type only needs a conversion from [`SprocketError`], so a
    /// handler failure reaches the caller unchanged. The reader and command
    /// are released before this returns, whatever the handler did.
    pub fn execute_reader<T, E, F>(&self, procedure: &str, params: &ParameterSet, handler: F) -> std::result::Result<T, E>
    where
        E: From<SprocketError>,
        F: FnOnce(&mut dyn DataReader) -> std::result::Result<T, E>,
    {
        let mut owned = self.acquire()?;
        let result = self.reader(&mut owned.conn, procedure, params, handler);
        owned.release(result)
    }

    pub fn execute_reader_on<T, E, F>(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
        handler: F,
    ) -> std::result::Result<T, E>
    where
        E: From<SprocketError>,
        F: FnOnce(&mut dyn DataReader) -> std::result::Result<T, E>,
    {
        ensure_open(conn)?;
        self.reader(conn, procedure, params, handler)
    }

    /// Buffer the first result set into a table named `table_name`
    ///
    /// A procedure that returns no result set yields an empty table.
    pub fn fill_table(&self, procedure: &str, params: &ParameterSet, table_name: &str) -> Result<DataTable> {
        let mut owned = self.acquire()?;
        let result = self.fill(&mut owned.conn, procedure, params).map(|tables| first_table(tables, table_name));
        owned.release(result)
    }

    pub fn fill_table_on(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
        table_name: &str,
    ) -> Result<DataTable> {
        ensure_open(conn)?;
        self.fill(conn, procedure, params).map(|tables| first_table(tables, table_name))
    }

    /// Buffer every result set into a dataset
    ///
    /// `table_names` are assigned to the result sets in order; tables beyond
    /// the supplied names keep their default names (`Table`, `Table1`, ...).
    ///
    /// # Errors
    /// Returns `InvalidInput` if more names are supplied than result sets returned.
    pub fn fill_dataset(
        &self,
        procedure: &str,
        params: &ParameterSet,
        dataset_name: &str,
        table_names: &[&str],
    ) -> Result<DataSet> {
        let mut owned = self.acquire()?;
        let result = self
            .fill(&mut owned.conn, procedure, params)
            .and_then(|tables| build_dataset(procedure, tables, dataset_name, table_names));
        owned.release(result)
    }

    pub fn fill_dataset_on(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
        dataset_name: &str,
        table_names: &[&str],
    ) -> Result<DataSet> {
        ensure_open(conn)?;
        self.fill(conn, procedure, params)
            .and_then(|tables| build_dataset(procedure, tables, dataset_name, table_names))
    }

    fn prepare<'c>(
        &self,
        conn: &'c mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
        mode: Mode,
    ) -> Result<<D::Connection as Connection>::Command<'c>> {
        let timeout = match mode {
            Mode::NonQuery | Mode::Scalar => self.settings.command_timeout,
            Mode::Reader => self.settings.reader_timeout,
            Mode::Fill => self.settings.fill_timeout,
        };

        tracing::debug!(
            engine = self.driver.engine(),
            procedure,
            mode = mode.as_str(),
            params = params.len(),
            timeout_secs = timeout.as_secs(),
            "preparing command"
        );

        let mut command = conn.create_command(procedure, CommandType::StoredProcedure)?;
        command.set_timeout(timeout);
        for param in params {
            command.bind(param)?;
        }
        Ok(command)
    }

    fn non_query(&self, conn: &mut D::Connection, procedure: &str, params: &ParameterSet) -> Result<u64> {
        let affected = self.prepare(conn, procedure, params, Mode::NonQuery)?.execute_non_query()?;
        tracing::debug!(procedure, affected, "non-query complete");
        Ok(affected)
    }

    fn scalar(&self, conn: &mut D::Connection, procedure: &str, params: &ParameterSet) -> Result<DbValue> {
        self.prepare(conn, procedure, params, Mode::Scalar)?.execute_scalar()
    }

    fn reader<T, E, F>(
        &self,
        conn: &mut D::Connection,
        procedure: &str,
        params: &ParameterSet,
        handler: F,
    ) -> std::result::Result<T, E>
    where
        E: From<SprocketError>,
        F: FnOnce(&mut dyn DataReader) -> std::result::Result<T, E>,
    {
        let mut command = self.prepare(conn, procedure, params, Mode::Reader)?;
        let mut reader = command.execute_reader()?;
        let result = handler(&mut reader);

        drop(reader);
        drop(command);
        result
    }

    fn fill(&self, conn: &mut D::Connection, procedure: &str, params: &ParameterSet) -> Result<Vec<DataTable>> {
        let tables = self.prepare(conn, procedure, params, Mode::Fill)?.fill()?;
        tracing::debug!(procedure, tables = tables.len(), "fill complete");
        Ok(tables)
    }
}

fn ensure_open<C: Connection>(conn: &C) -> Result<()> {
    if conn.is_open() {
        Ok(())
    } else {
        Err(SprocketError::invalid_input("Connection must be open before executing a procedure"))
    }
}

fn cast_scalar<T: FromDbValue>(value: &DbValue) -> Result<T> {
    T::from_db_value(value).ok_or(SprocketError::ScalarCast { expected: T::TYPE_NAME, actual: value.type_name() })
}

fn first_table(tables: Vec<DataTable>, table_name: &str) -> DataTable {
    let mut table = tables.into_iter().next().unwrap_or_default();
    table.name = table_name.to_string();
    table
}

fn build_dataset(procedure: &str, mut tables: Vec<DataTable>, dataset_name: &str, table_names: &[&str]) -> Result<DataSet> {
    if table_names.len() > tables.len() {
        return Err(SprocketError::invalid_input(format!(
            "{} table names supplied but procedure '{procedure}' returned {} result sets",
            table_names.len(),
            tables.len()
        )));
    }

    for (table, name) in tables.iter_mut().zip(table_names) {
        table.name = (*name).to_string();
    }

    Ok(DataSet { name: dataset_name.to_string(), tables })
}
