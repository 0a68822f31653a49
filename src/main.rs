//! Sprocket CLI Entry Point
//!
//! Subcommands:
//! - `exec` - Run a stored procedure in one execution mode
//! - `connect` - Save a named connection
//! - `connections` - List saved connection names
//! - `define` - Create or drop a procedure in a `SQLite` database's catalog
//!
//! All output to stdout is one JSON envelope. Logs go to stderr.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use sprocket::config::{self, ConfigLocation, StoredConnection};
use sprocket::driver::table::DEFAULT_DATASET_NAME;
use sprocket::logging::{LogFormat, LoggingConfig};
use sprocket::{
    DataReader, DatabaseType, DbType, Driver, ErrorEnvelope, ErrorInfo, ExecOutput, ExecutorSettings, Metadata,
    ParameterSet, ProcedureExecutor, SprocketError, SuccessEnvelope,
};

/// Sprocket - run stored procedures from the shell
#[derive(Parser)]
#[command(name = "sprocket")]
#[command(about = "Stored-procedure execution with named parameters and JSON output")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); logs go to stderr
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a stored procedure
    Exec(ExecArgs),

    /// Save a named connection
    Connect {
        #[arg(long)]
        name: String,

        /// Connection string; prompted for when neither this nor --env is given
        #[arg(long, conflicts_with = "env")]
        connection_string: Option<String>,

        /// Environment variable that holds the connection string
        #[arg(long)]
        env: Option<String>,

        /// Save to the per-user config instead of `.sprocket/config.json`
        #[arg(long)]
        global: bool,
    },

    /// List saved connection names
    Connections,

    /// Create or replace a procedure in a SQLite database's catalog
    Define {
        name: String,

        /// File holding the procedure body
        #[arg(long, required_unless_present = "drop")]
        file: Option<std::path::PathBuf>,

        /// Drop the procedure instead
        #[arg(long)]
        drop: bool,

        #[command(flatten)]
        target: ConnectionArgs,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Exec(_) => "exec",
            Self::Connect { .. } => "connect",
            Self::Connections => "connections",
            Self::Define { .. } => "define",
        }
    }
}

#[derive(Args)]
struct ConnectionArgs {
    /// Saved connection name (defaults to the configured default)
    #[arg(long, conflicts_with = "connection_string")]
    connection: Option<String>,

    /// Explicit connection string
    #[arg(long)]
    connection_string: Option<String>,
}

impl ConnectionArgs {
    fn settings(&self) -> sprocket::Result<ExecutorSettings> {
        match &self.connection_string {
            Some(cs) => Ok(ExecutorSettings::new(cs.clone())),
            None => config::resolve_settings(self.connection.as_deref()),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExecMode {
    NonQuery,
    Scalar,
    Reader,
    Table,
    Dataset,
}

#[derive(Args)]
struct ExecArgs {
    /// Procedure name (optionally schema-qualified)
    procedure: String,

    #[command(flatten)]
    target: ConnectionArgs,

    /// Identifier passed as the configured identifier parameter (`@Id`)
    #[arg(long)]
    id: Option<i32>,

    /// Parameter, repeatable: `@name=value` or `@name:type=value`
    #[arg(long = "param", value_name = "@NAME[:TYPE]=VALUE")]
    params: Vec<String>,

    #[arg(long, value_enum, default_value = "reader")]
    mode: ExecMode,

    /// Table name, repeatable; assigned to result sets in order
    #[arg(long = "table")]
    tables: Vec<String>,

    /// Dataset name for `--mode dataset`
    #[arg(long)]
    dataset: Option<String>,

    /// Override the timeout (seconds) for this call
    #[arg(long)]
    timeout: Option<u64>,
}

/// What a command produced, plus the engine it ran against
struct Outcome {
    engine: &'static str,
    result: anyhow::Result<(serde_json::Value, Metadata)>,
}

impl Outcome {
    fn failed(engine: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self { engine, result: Err(error.into()) }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    LoggingConfig {
        verbosity: cli.verbose,
        format: if cli.log_json { LogFormat::Json } else { LogFormat::Compact },
    }
    .init();

    let command = cli.command.name();
    let outcome = match cli.command {
        Commands::Exec(args) => exec(&args),
        Commands::Connect { name, connection_string, env, global } => Outcome {
            engine: "",
            result: connect(&name, connection_string, env, global),
        },
        Commands::Connections => Outcome { engine: "", result: connections() },
        Commands::Define { name, file, drop, target } => define(&name, file.as_deref(), drop, &target),
    };

    match outcome.result {
        Ok((data, meta)) => {
            print_json(&SuccessEnvelope::new(outcome.engine, command, data, meta));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let envelope = match err.downcast_ref::<SprocketError>() {
                Some(e) => ErrorEnvelope::from_error(outcome.engine, command, e),
                None => ErrorEnvelope::new(outcome.engine, command, ErrorInfo::new("INTERNAL_ERROR", format!("{err:#}"))),
            };
            print_json(&envelope);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => println!(r#"{{"ok":false,"engine":"","command":"","error":{{"code":"INTERNAL_ERROR","message":"{e}"}}}}"#),
    }
}

fn exec(args: &ExecArgs) -> Outcome {
    let mut settings = match args.target.settings() {
        Ok(settings) => settings,
        Err(e) => return Outcome::failed("", e),
    };
    if let Some(secs) = args.timeout {
        let timeout = Duration::from_secs(secs);
        settings.command_timeout = timeout;
        settings.reader_timeout = timeout;
        settings.fill_timeout = timeout;
    }

    let engine = match DatabaseType::from_connection_string(&settings.connection_string) {
        Ok(engine) => engine,
        Err(e) => return Outcome::failed("", e),
    };

    let result = match engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            run_exec(&ProcedureExecutor::new(sprocket::driver::sqlite::SqliteDriver, settings), args)
        }
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => run_exec(&ProcedureExecutor::new(sprocket::driver::mysql::MySqlDriver, settings), args),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => {
            run_exec(&ProcedureExecutor::new(sprocket::driver::postgres::PostgresDriver, settings), args)
        }
        #[allow(unreachable_patterns)]
        other => Err(anyhow!("The {other} engine is not enabled in this build")),
    };

    Outcome { engine: engine.as_str(), result }
}

fn run_exec<D: Driver>(executor: &ProcedureExecutor<D>, args: &ExecArgs) -> anyhow::Result<(serde_json::Value, Metadata)> {
    let params = build_params(executor, args)?;
    let procedure = args.procedure.as_str();
    let start = Instant::now();

    let output = match args.mode {
        ExecMode::NonQuery => {
            ExecOutput::NonQuery { rows_affected: executor.execute_non_query_count(procedure, &params)? }
        }
        ExecMode::Scalar => ExecOutput::Scalar { value: executor.execute_scalar(procedure, &params)? },
        ExecMode::Reader => ExecOutput::Reader { result_sets: executor.execute_reader(procedure, &params, collect_rows)? },
        ExecMode::Table => {
            let name = args.tables.first().map_or("Table", String::as_str);
            ExecOutput::Table { table: executor.fill_table(procedure, &params, name)? }
        }
        ExecMode::Dataset => {
            let names: Vec<&str> = args.tables.iter().map(String::as_str).collect();
            let dataset_name = args.dataset.as_deref().unwrap_or(DEFAULT_DATASET_NAME);
            ExecOutput::Dataset { dataset: executor.fill_dataset(procedure, &params, dataset_name, &names)? }
        }
    };

    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let meta = match &output {
        ExecOutput::NonQuery { rows_affected } => Metadata::with_affected(elapsed, *rows_affected),
        other => other.rows_returned().map_or_else(|| Metadata::new(elapsed), |rows| Metadata::with_rows(elapsed, rows)),
    };

    Ok((serde_json::to_value(&output).context("Failed to serialize result")?, meta))
}

/// Parameters from `--id` and `--param`
fn build_params<D: Driver>(executor: &ProcedureExecutor<D>, args: &ExecArgs) -> anyhow::Result<ParameterSet> {
    let mut params = args.id.map_or_else(ParameterSet::new, |id| executor.identifier(id));

    for spec in &args.params {
        let (name, db_type, value) = parse_param_spec(spec)?;
        match db_type {
            Some(db_type) => {
                let value = db_type.parse_value(value)?;
                params.add(name, db_type)?.set_value(value);
            }
            None => {
                params.add_value(name, DbType::NVarChar.parse_value(value)?)?;
            }
        }
    }

    Ok(params)
}

/// Split `@name[:type]=value`
fn parse_param_spec(spec: &str) -> anyhow::Result<(&str, Option<DbType>, &str)> {
    let Some((target, value)) = spec.split_once('=') else {
        bail!(SprocketError::invalid_input(format!("Parameter '{spec}' must look like @name=value")));
    };

    match target.split_once(':') {
        Some((name, db_type)) => Ok((name, Some(db_type.parse()?), value)),
        None => Ok((target, None, value)),
    }
}

/// Reader handler: every result set as a list of JSON objects
fn collect_rows(
    reader: &mut dyn DataReader,
) -> sprocket::Result<Vec<Vec<serde_json::Map<String, serde_json::Value>>>> {
    let mut result_sets = Vec::new();

    loop {
        if reader.field_count() > 0 {
            let columns = reader.columns()?;
            let mut rows = Vec::new();
            while reader.read()? {
                let mut row = serde_json::Map::new();
                for (ordinal, column) in columns.iter().enumerate() {
                    row.insert(column.clone(), reader.value(ordinal)?.to_json());
                }
                rows.push(row);
            }
            result_sets.push(rows);
        }

        if !reader.next_result()? {
            return Ok(result_sets);
        }
    }
}

fn connect(
    name: &str,
    connection_string: Option<String>,
    env: Option<String>,
    global: bool,
) -> anyhow::Result<(serde_json::Value, Metadata)> {
    let start = Instant::now();

    let stored = match (connection_string, env) {
        (_, Some(env)) => StoredConnection { connection_string_env: Some(env), ..StoredConnection::default() },
        (Some(cs), None) => StoredConnection::from_connection_string(cs),
        (None, None) => {
            let cs = dialoguer::Password::new()
                .with_prompt(format!("Connection string for '{name}'"))
                .interact()
                .context("Failed to read connection string")?;
            StoredConnection::from_connection_string(cs)
        }
    };

    if let Some(cs) = &stored.connection_string {
        DatabaseType::from_connection_string(cs)?;
    }

    let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
    let path = config::save_connection(name, stored, location)?;

    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok((serde_json::json!({ "name": name, "path": path.display().to_string() }), Metadata::new(elapsed)))
}

fn connections() -> anyhow::Result<(serde_json::Value, Metadata)> {
    let start = Instant::now();
    let names = config::list_connections()?;
    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok((serde_json::json!({ "connections": names }), Metadata::with_rows(elapsed, names.len())))
}

fn define(name: &str, file: Option<&std::path::Path>, drop: bool, target: &ConnectionArgs) -> Outcome {
    let settings = match target.settings() {
        Ok(settings) => settings,
        Err(e) => return Outcome::failed("", e),
    };

    match DatabaseType::from_connection_string(&settings.connection_string) {
        Ok(DatabaseType::SQLite) => Outcome { engine: "sqlite", result: define_sqlite(name, file, drop, &settings) },
        Ok(other) => Outcome::failed(
            other.as_str(),
            SprocketError::invalid_input(format!(
                "define only manages SQLite procedures; create {other} procedures with the server's own DDL"
            )),
        ),
        Err(e) => Outcome::failed("", e),
    }
}

#[cfg(feature = "sqlite")]
fn define_sqlite(
    name: &str,
    file: Option<&std::path::Path>,
    drop: bool,
    settings: &ExecutorSettings,
) -> anyhow::Result<(serde_json::Value, Metadata)> {
    use sprocket::driver::sqlite::SqliteConnection;
    use sprocket::Connection;

    let start = Instant::now();
    let mut conn = SqliteConnection::open(&settings.connection_string)?;

    let data = if drop {
        let dropped = conn.drop_procedure(name)?;
        serde_json::json!({ "name": name, "dropped": dropped })
    } else {
        let path = file.ok_or_else(|| anyhow!("--file is required"))?;
        let body = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        conn.define_procedure(name, &body)?;
        serde_json::json!({ "name": name, "defined": true })
    };
    conn.close()?;

    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok((data, Metadata::new(elapsed)))
}

#[cfg(not(feature = "sqlite"))]
fn define_sqlite(
    _name: &str,
    _file: Option<&std::path::Path>,
    _drop: bool,
    _settings: &ExecutorSettings,
) -> anyhow::Result<(serde_json::Value, Metadata)> {
    bail!("The sqlite engine is not enabled in this build")
}
