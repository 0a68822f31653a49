//! Sprocket - Stored-Procedure Execution Toolkit
//!
//! Sprocket runs stored procedures through a small driver boundary and gives
//! back typed results. Parameters are collected by name in a [`ParameterSet`];
//! a [`ProcedureExecutor`] runs a procedure as a non-query, a scalar, a reader
//! or a table/dataset fill and releases every resource it acquired on every
//! exit path.
//!
//! # Core Principles
//! - Named parameters, unique per set, always prefixed with `@`
//! - NULL is never silently converted: `read` fails, `read_nullable` returns `None`
//! - Executor-owned connections are always closed; caller connections never are
//! - A cleanup failure never hides the error that caused it
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`value`] - Driver values, typed decoding and enum decoding
//! - [`params`] - Parameters and parameter sets
//! - [`driver`] - Driver traits, result tables and the `SQLite`/`MySQL`/`PostgreSQL` drivers
//! - [`executor`] - The procedure executor
//! - [`config`] - Named connection strings
//! - [`output`] - JSON output envelopes for the CLI
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Example
//! ```no_run
//! use sprocket::{ExecutorSettings, ParameterSet, ProcedureExecutor, ReaderExt};
//! use sprocket::driver::sqlite::SqliteDriver;
//!
//! let executor = ProcedureExecutor::new(SqliteDriver, ExecutorSettings::new("sqlite://app.db"));
//! let names = executor.execute_reader("usp_customer_get", &ParameterSet::with_identifier(7), |reader| {
//!     let mut names = Vec::new();
//!     while reader.read()? {
//!         names.push(reader.get::<String>("Name")?);
//!     }
//!     Ok::<_, sprocket::SprocketError>(names)
//! })?;
//! # Ok::<(), sprocket::SprocketError>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod logging;
pub mod output;
pub mod params;
pub mod value;

pub use config::{
    get_connection_string, list_connections, resolve_settings, save_connection, ConfigLocation, ConnectionRegistry,
    StoredConnection,
};
pub use driver::{
    BufferedReader, Command, CommandType, Connection, DataReader, DataSet, DataTable, DatabaseType, Driver, ReaderExt,
};
pub use error::{Result, SprocketError};
pub use executor::{ExecutorSettings, ProcedureExecutor};
pub use output::{ErrorEnvelope, ErrorInfo, ExecOutput, Metadata, SuccessEnvelope};
pub use params::{Parameter, ParameterSet};
pub use value::{read, read_nullable, read_nullable_or, DbEnum, DbType, DbValue, FromDbValue};
