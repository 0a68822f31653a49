//! `SQLite` Driver
//!
//! `SQLite` has no stored procedures, so this driver keeps them in a catalog
//! table, `sprocket_procedures(name, body)`. A body is one or more SQL
//! statements that reference their arguments as `@name` parameters.
//!
//! # Features
//! - File connections (`sqlite://path/to/app.db`, `sqlite:app.db`)
//! - In-memory connections (`sqlite::memory:`)
//! - Procedure calls checked like a real call: every parameter the body
//!   references must be supplied, and every supplied parameter must be referenced
//! - Statements with columns form result sets; DML statements add to the row count
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - Timeouts enforced via `busy_timeout`
//! - Every mode runs the whole body before returning, so a failing statement
//!   after the last result set still fails the call; readers are buffered
//! - Row counts come from `total_changes()` deltas, so DDL never reports the
//!   stale count of an earlier DML statement

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Batch, OpenFlags, OptionalExtension, Row, Statement};
use std::time::Duration;

use crate::driver::table::default_table_name;
use crate::driver::{BufferedReader, Command, CommandType, Connection, DataTable, Driver};
use crate::error::{Result, SprocketError};
use crate::params::Parameter;
use crate::value::DbValue;

/// Catalog table holding procedure bodies
pub const CATALOG_TABLE: &str = "sprocket_procedures";

const ENGINE: &str = "sqlite";

/// `SQLite` driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn open(&self, connection_string: &str) -> Result<SqliteConnection> {
        SqliteConnection::open(connection_string)
    }
}

/// Extract the database path from a connection string
///
/// Returns `None` for an in-memory database.
///
/// # Errors
/// Returns `InvalidInput` if the string is not an `sqlite:` connection string.
pub fn parse_connection_string(connection_string: &str) -> Result<Option<String>> {
    let rest = connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .ok_or_else(|| SprocketError::invalid_input("SQLite connection strings start with 'sqlite:'"))?;

    match rest {
        ":memory:" | "" => Ok(None),
        path => Ok(Some(path.to_string())),
    }
}

/// An open `SQLite` database
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").field("open", &self.conn.is_some()).finish()
    }
}

impl SqliteConnection {
    /// Open a connection from an `sqlite:` connection string
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if the database file cannot be opened.
    pub fn open(connection_string: &str) -> Result<Self> {
        let conn = match parse_connection_string(connection_string)? {
            None => rusqlite::Connection::open_in_memory(),
            Some(path) => rusqlite::Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            ),
        }
        .map_err(|e| SprocketError::connection_failed(format!("Failed to open SQLite database: {e}")))?;

        Ok(Self { conn: Some(conn) })
    }

    fn inner(&self) -> Result<&rusqlite::Connection> {
        self.conn.as_ref().ok_or_else(|| SprocketError::connection_failed("SQLite connection is closed"))
    }

    /// Run raw SQL with no parameters (schema setup, seed data)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner()?
            .execute_batch(sql)
            .map_err(|e| SprocketError::query_failed(format!("Failed to execute batch: {e}")))
    }

    /// Create or replace a procedure in the catalog
    pub fn define_procedure(&self, name: &str, body: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SprocketError::invalid_input("Procedure name must not be empty"));
        }
        if body.trim().is_empty() {
            return Err(SprocketError::invalid_input(format!("Procedure '{name}' has an empty body")));
        }

        let conn = self.inner()?;
        ensure_catalog(conn)?;
        conn.execute(
            &format!(
                "INSERT INTO {CATALOG_TABLE} (name, body) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET body = excluded.body"
            ),
            [name, body],
        )
        .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to define procedure '{name}': {e}")))?;

        tracing::debug!(engine = ENGINE, procedure = name, "procedure defined");
        Ok(())
    }

    /// Remove a procedure; returns whether it existed
    pub fn drop_procedure(&self, name: &str) -> Result<bool> {
        let conn = self.inner()?;
        if !catalog_exists(conn)? {
            return Ok(false);
        }

        let removed = conn
            .execute(&format!("DELETE FROM {CATALOG_TABLE} WHERE name = ?1"), [name])
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to drop procedure '{name}': {e}")))?;
        Ok(removed > 0)
    }

    /// Names of all defined procedures, sorted
    pub fn procedures(&self) -> Result<Vec<String>> {
        let conn = self.inner()?;
        if !catalog_exists(conn)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn
            .prepare(&format!("SELECT name FROM {CATALOG_TABLE} ORDER BY name"))
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to list procedures: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to list procedures: {e}")))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to list procedures: {e}")));
        names
    }
}

impl Connection for SqliteConnection {
    type Command<'c> = SqliteCommand<'c>;

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn create_command(&mut self, text: &str, command_type: CommandType) -> Result<SqliteCommand<'_>> {
        let conn = self.inner()?;
        Ok(SqliteCommand {
            conn,
            text: text.to_string(),
            command_type,
            params: Vec::new(),
            timeout: Duration::from_secs(30),
            sql: None,
        })
    }

    fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        conn.close().map_err(|(conn, e)| {
            self.conn = Some(conn);
            SprocketError::connection_failed(format!("Failed to close SQLite database: {e}"))
        })
    }
}

/// A procedure call or SQL batch against one connection
pub struct SqliteCommand<'c> {
    conn: &'c rusqlite::Connection,
    text: String,
    command_type: CommandType,
    params: Vec<Parameter>,
    timeout: Duration,
    sql: Option<String>,
}

impl<'c> SqliteCommand<'c> {
    /// Resolve the SQL to run: the catalog body for a procedure, the text itself otherwise
    fn prepare_sql(&mut self) -> Result<()> {
        self.conn
            .busy_timeout(busy_timeout(self.timeout))
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to set timeout: {e}")))?;

        let sql = match self.command_type {
            CommandType::Text => self.text.clone(),
            CommandType::StoredProcedure => {
                let body = lookup_procedure(self.conn, &self.text)?;
                check_arguments(&self.text, &body, &self.params)?;
                body
            }
        };

        tracing::debug!(engine = ENGINE, procedure = %self.text, params = self.params.len(), "executing");
        self.sql = Some(sql);
        Ok(())
    }

    /// Run every statement of the body, buffering the ones that have columns
    fn run(&mut self) -> Result<RunOutcome> {
        self.prepare_sql()?;
        let conn = self.conn;
        let sql = self.sql.as_deref().unwrap_or_default();

        let mut batch = Batch::new(conn, sql);
        let mut outcome = RunOutcome { tables: Vec::new(), affected: 0 };
        while let Some(mut stmt) = next_statement(&mut batch)? {
            bind_statement(&mut stmt, &self.params)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let counts_rows = !stmt.readonly();
            let before = if counts_rows { total_changes(conn)? } else { 0 };

            let mut buffered = Vec::new();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next().map_err(step_error)? {
                if !columns.is_empty() {
                    buffered.push(row_values(row, columns.len())?);
                }
            }
            drop(rows);

            if counts_rows {
                outcome.affected += total_changes(conn)?.saturating_sub(before);
            }
            if !columns.is_empty() {
                let mut table = DataTable::new(default_table_name(outcome.tables.len()), columns);
                table.rows = buffered;
                outcome.tables.push(table);
            }
        }

        Ok(outcome)
    }
}

impl<'c> Command for SqliteCommand<'c> {
    type Reader<'r> = BufferedReader where Self: 'r;

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bind(&mut self, param: &Parameter) -> Result<()> {
        if self.params.iter().any(|p| p.name == param.name) {
            return Err(SprocketError::duplicate_parameter(&param.name));
        }
        self.params.push(param.clone());
        Ok(())
    }

    fn execute_non_query(&mut self) -> Result<u64> {
        self.run().map(|outcome| outcome.affected)
    }

    fn execute_reader(&mut self) -> Result<BufferedReader> {
        self.run().map(|outcome| BufferedReader::new(outcome.tables))
    }

    fn fill(&mut self) -> Result<Vec<DataTable>> {
        self.run().map(|outcome| outcome.tables)
    }
}

/// Everything a procedure body produced
struct RunOutcome {
    tables: Vec<DataTable>,
    affected: u64,
}

fn catalog_exists(conn: &rusqlite::Connection) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [CATALOG_TABLE],
        |row| row.get(0),
    )
    .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to query catalog: {e}")))
}

fn ensure_catalog(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {CATALOG_TABLE} (
            name TEXT PRIMARY KEY COLLATE NOCASE,
            body TEXT NOT NULL
        )"
    ))
    .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to create catalog: {e}")))
}

fn lookup_procedure(conn: &rusqlite::Connection, name: &str) -> Result<String> {
    let body: Option<String> = if catalog_exists(conn)? {
        conn.query_row(&format!("SELECT body FROM {CATALOG_TABLE} WHERE name = ?1"), [name], |row| row.get(0))
            .optional()
            .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to query catalog: {e}")))?
    } else {
        None
    };

    body.ok_or_else(|| SprocketError::query_failed(format!("Could not find stored procedure '{name}'")))
}

/// Compare supplied parameters with the ones the body references
fn check_arguments(procedure: &str, body: &str, params: &[Parameter]) -> Result<()> {
    let referenced = referenced_parameters(body);

    if let Some(missing) = referenced.iter().find(|name| !params.iter().any(|p| &p.name == *name)) {
        return Err(SprocketError::query_failed(format!(
            "Procedure '{procedure}' expects parameter '{missing}', which was not supplied"
        )));
    }
    if let Some(extra) = params.iter().find(|p| !referenced.contains(&p.name)) {
        return Err(SprocketError::query_failed(format!(
            "'{}' is not a parameter for procedure '{procedure}'",
            extra.name
        )));
    }
    Ok(())
}

/// `@name` parameters referenced by SQL text, in first-use order
///
/// String literals, quoted identifiers and comments are skipped.
pub fn referenced_parameters(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    let skip_to = |from: usize, close: char| {
        chars.get(from..).and_then(|rest| rest.iter().position(|c| *c == close)).map_or(chars.len(), |p| from + p + 1)
    };

    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"' | '`') => i = skip_to(i + 1, quote),
            '[' => i = skip_to(i + 1, ']'),
            '-' if chars.get(i + 1) == Some(&'-') => i = skip_to(i + 2, '\n'),
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '@' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i > start + 1 {
                    let name: String = chars[start..i].iter().collect();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            _ => i += 1,
        }
    }

    names
}

fn next_statement<'conn>(batch: &mut Batch<'conn, '_>) -> Result<Option<Statement<'conn>>> {
    batch.next().map_err(|e| SprocketError::query_failed(format!("Failed to prepare statement: {e}")))
}

/// Bind named parameters by name and `?` placeholders by position
fn bind_statement(stmt: &mut Statement<'_>, params: &[Parameter]) -> Result<()> {
    for index in 1..=stmt.parameter_count() {
        let param = match stmt.parameter_name(index) {
            Some(name) => params
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| SprocketError::query_failed(format!("No value supplied for parameter '{name}'")))?,
            None => params
                .get(index - 1)
                .ok_or_else(|| SprocketError::query_failed(format!("No value supplied for parameter {index}")))?,
        };

        stmt.raw_bind_parameter(index, to_sqlite_value(&param.value))
            .map_err(|e| SprocketError::query_failed(format!("Failed to bind '{}': {e}", param.name)))?;
    }
    Ok(())
}

fn total_changes(conn: &rusqlite::Connection) -> Result<u64> {
    let total: i64 = conn
        .query_row("SELECT total_changes()", [], |row| row.get(0))
        .map_err(|e| SprocketError::engine_error(ENGINE, format!("Failed to read change count: {e}")))?;
    Ok(u64::try_from(total).unwrap_or(0))
}

fn step_error(e: rusqlite::Error) -> SprocketError {
    SprocketError::query_failed(format!("Failed to execute statement: {e}"))
}

/// Convert a bound value to its `SQLite` storage class
///
/// Temporal values and UUIDs are stored as text, the form `SQLite`'s date
/// functions understand.
fn to_sqlite_value(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Integer(i64::from(*b)),
        DbValue::TinyInt(v) => Value::Integer(i64::from(*v)),
        DbValue::SmallInt(v) => Value::Integer(i64::from(*v)),
        DbValue::Int(v) => Value::Integer(i64::from(*v)),
        DbValue::BigInt(v) => Value::Integer(*v),
        DbValue::Real(v) => Value::Real(f64::from(*v)),
        DbValue::Float(v) => Value::Real(*v),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Bytes(b) => Value::Blob(b.clone()),
        DbValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        DbValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        DbValue::DateTime(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        DbValue::DateTimeUtc(dt) => Value::Text(dt.to_rfc3339()),
        DbValue::Uuid(u) => Value::Text(u.to_string()),
    }
}

fn row_values(row: &Row<'_>, column_count: usize) -> Result<Vec<DbValue>> {
    (0..column_count)
        .map(|idx| {
            let value_ref = row
                .get_ref(idx)
                .map_err(|e| SprocketError::query_failed(format!("Failed to fetch row: {e}")))?;

            Ok(match value_ref {
                ValueRef::Null => DbValue::Null,
                ValueRef::Integer(i) => DbValue::BigInt(i),
                ValueRef::Real(f) => DbValue::Float(f),
                ValueRef::Text(s) => DbValue::Text(
                    std::str::from_utf8(s)
                        .map_err(|e| SprocketError::engine_error(ENGINE, format!("Invalid UTF-8 in column {idx}: {e}")))?
                        .to_string(),
                ),
                ValueRef::Blob(b) => DbValue::Bytes(b.to_vec()),
            })
        })
        .collect()
}

/// SQLite takes the busy timeout in milliseconds as a C int; zero means wait as long as allowed
fn busy_timeout(timeout: Duration) -> Duration {
    let max = Duration::from_millis(i32::MAX as u64);
    if timeout.is_zero() {
        max
    } else {
        timeout.min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DataReader, ReaderExt};
    use crate::params::ParameterSet;
    use crate::value::DbType;

    #[test]
    fn test_busy_timeout_is_clamped() {
        let max = Duration::from_millis(i32::MAX as u64);
        assert_eq!(busy_timeout(Duration::ZERO), max);
        assert_eq!(busy_timeout(Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(busy_timeout(Duration::from_secs(u64::MAX)), max);
    }

    fn memory() -> SqliteConnection {
        let conn = SqliteDriver.open("sqlite::memory:").unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT NOT NULL, total REAL, placed TEXT);
             INSERT INTO orders (customer, total, placed) VALUES ('ada', 12.5, '2024-03-01');
             INSERT INTO orders (customer, total, placed) VALUES ('ada', 7.0, NULL);
             INSERT INTO orders (customer, total, placed) VALUES ('bob', NULL, '2024-03-02');",
        )
        .unwrap();
        conn
    }

    fn bind_all(cmd: &mut SqliteCommand<'_>, params: &ParameterSet) {
        for p in params {
            cmd.bind(p).unwrap();
        }
    }

    #[test]
    fn test_parse_connection_string() {
        assert_eq!(parse_connection_string("sqlite::memory:").unwrap(), None);
        assert_eq!(parse_connection_string("sqlite://data/app.db").unwrap(), Some("data/app.db".into()));
        assert_eq!(parse_connection_string("sqlite:///tmp/app.db").unwrap(), Some("/tmp/app.db".into()));
        assert_eq!(parse_connection_string("sqlite:app.db").unwrap(), Some("app.db".into()));
        assert!(parse_connection_string("mysql://localhost").is_err());
    }

    #[test]
    fn test_missing_procedure() {
        let mut conn = memory();
        let mut cmd = conn.create_command("usp_Missing", CommandType::StoredProcedure).unwrap();
        let err = cmd.execute_non_query().unwrap_err();
        assert!(err.message().contains("Could not find stored procedure 'usp_Missing'"));
    }

    #[test]
    fn test_non_query_counts_dml_only() {
        let mut conn = memory();
        conn.define_procedure(
            "usp_Archive",
            "CREATE TABLE IF NOT EXISTS archive (id INTEGER, customer TEXT);
             INSERT INTO archive SELECT id, customer FROM orders WHERE customer = @Customer;
             CREATE INDEX IF NOT EXISTS ix_archive ON archive (customer);
             DELETE FROM orders WHERE customer = @Customer;",
        )
        .unwrap();

        let params = ParameterSet::with_value("@Customer", DbType::NVarChar, "ada").unwrap();
        let mut cmd = conn.create_command("usp_Archive", CommandType::StoredProcedure).unwrap();
        bind_all(&mut cmd, &params);
        assert_eq!(cmd.execute_non_query().unwrap(), 4);
    }

    #[test]
    fn test_argument_check() {
        let mut conn = memory();
        conn.define_procedure("usp_ByCustomer", "SELECT * FROM orders WHERE customer = @Customer").unwrap();

        let mut cmd = conn.create_command("usp_ByCustomer", CommandType::StoredProcedure).unwrap();
        let err = cmd.execute_non_query().unwrap_err();
        assert!(err.message().contains("expects parameter '@Customer'"));

        let mut params = ParameterSet::new();
        params.add_value("@Customer", "ada").unwrap();
        params.add_value("@Extra", 1).unwrap();
        let mut cmd = conn.create_command("usp_ByCustomer", CommandType::StoredProcedure).unwrap();
        bind_all(&mut cmd, &params);
        let err = cmd.execute_non_query().unwrap_err();
        assert!(err.message().contains("'@Extra' is not a parameter"));
    }

    #[test]
    fn test_procedure_names_are_case_insensitive() {
        let mut conn = memory();
        conn.define_procedure("usp_Count", "SELECT COUNT(*) FROM orders").unwrap();
        let mut cmd = conn.create_command("USP_COUNT", CommandType::StoredProcedure).unwrap();
        assert_eq!(cmd.execute_scalar().unwrap(), DbValue::BigInt(3));
    }

    #[test]
    fn test_reader_multiple_result_sets() {
        let mut conn = memory();
        conn.define_procedure(
            "usp_Summary",
            "SELECT id, customer, total, placed FROM orders WHERE customer = @Customer ORDER BY id;
             UPDATE orders SET total = 0 WHERE total IS NULL;
             SELECT COUNT(*) AS remaining FROM orders WHERE total = 0;",
        )
        .unwrap();

        let params = ParameterSet::with_value("@Customer", DbType::NVarChar, "ada").unwrap();
        let mut cmd = conn.create_command("usp_Summary", CommandType::StoredProcedure).unwrap();
        bind_all(&mut cmd, &params);

        let mut reader = cmd.execute_reader().unwrap();
        assert_eq!(reader.columns().unwrap(), vec!["id", "customer", "total", "placed"]);

        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>("id").unwrap(), 1);
        assert_eq!(reader.get::<f64>("total").unwrap(), 12.5);
        let placed: chrono::NaiveDate = reader.get("placed").unwrap();
        assert_eq!(placed.to_string(), "2024-03-01");

        assert!(reader.read().unwrap());
        assert_eq!(reader.get_nullable::<chrono::NaiveDate>("placed").unwrap(), None);
        assert!(!reader.read().unwrap());

        assert!(reader.next_result().unwrap());
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i64>("remaining").unwrap(), 1);
        assert!(!reader.next_result().unwrap());
    }

    #[test]
    fn test_scalar_of_empty_result_is_null() {
        let mut conn = memory();
        let mut cmd = conn.create_command("SELECT id FROM orders WHERE 0", CommandType::Text).unwrap();
        assert_eq!(cmd.execute_scalar().unwrap(), DbValue::Null);
    }

    #[test]
    fn test_text_command_positional_parameters() {
        let mut conn = memory();
        let mut params = ParameterSet::new();
        params.add_anonymous("bob");
        let mut cmd = conn.create_command("SELECT COUNT(*) FROM orders WHERE customer = ?", CommandType::Text).unwrap();
        bind_all(&mut cmd, &params);
        assert_eq!(cmd.execute_scalar().unwrap(), DbValue::BigInt(1));
    }

    #[test]
    fn test_fill_names_tables() {
        let mut conn = memory();
        let mut cmd = conn
            .create_command("SELECT customer FROM orders; SELECT total FROM orders;", CommandType::Text)
            .unwrap();
        let tables = cmd.fill().unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "Table");
        assert_eq!(tables[1].name, "Table1");
        assert_eq!(tables[1].row_count(), 3);
    }

    #[test]
    fn test_drop_and_list_procedures() {
        let conn = memory();
        assert!(conn.procedures().unwrap().is_empty());
        assert!(!conn.drop_procedure("usp_Nothing").unwrap());

        conn.define_procedure("usp_B", "SELECT 1").unwrap();
        conn.define_procedure("usp_A", "SELECT 2").unwrap();
        assert_eq!(conn.procedures().unwrap(), vec!["usp_A", "usp_B"]);

        assert!(conn.drop_procedure("usp_B").unwrap());
        assert_eq!(conn.procedures().unwrap(), vec!["usp_A"]);
    }

    #[test]
    fn test_define_rejects_empty_body() {
        let conn = memory();
        assert!(matches!(conn.define_procedure("usp_Empty", "  "), Err(SprocketError::InvalidInput(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = memory();
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();
        assert!(conn.create_command("SELECT 1", CommandType::Text).is_err());
    }

    #[test]
    fn test_referenced_parameters_skips_literals_and_comments() {
        let sql = "SELECT '@NotAParam', \"@Col\" -- @Comment\n FROM t /* @Block */ WHERE a = @A AND b = @B OR a = @A";
        assert_eq!(referenced_parameters(sql), vec!["@A", "@B"]);
        assert_eq!(referenced_parameters("SELECT 'it''s' || @X"), vec!["@X"]);
    }
}
