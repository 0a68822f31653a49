//! Executor Resource Lifecycle Tests
//!
//! Uses the recording fake driver to check that the executor:
//! - closes the connections it opens, on success and on failure
//! - never closes a connection the caller supplied
//! - releases the reader and command exactly once, before returning
//! - never lets a close failure hide the error that caused the call to fail

mod common;

use common::{Event, FakeDriver, Script};
use pretty_assertions::assert_eq;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use sprocket::{
    Connection, DataReader, DbValue, ExecutorSettings, ParameterSet, ProcedureExecutor, ReaderExt, SprocketError,
};

fn executor(script: Script) -> (ProcedureExecutor<FakeDriver>, FakeDriver) {
    let driver = FakeDriver::new(script);
    (ProcedureExecutor::new(driver.clone(), ExecutorSettings::new("fake://")), driver)
}

fn three_rows() -> Script {
    Script::rows([DbValue::Int(1), DbValue::Int(2), DbValue::Int(3)])
}

#[derive(Debug)]
enum HandlerError {
    StoppedAt(i32),
    Db(SprocketError),
}

impl From<SprocketError> for HandlerError {
    fn from(err: SprocketError) -> Self {
        Self::Db(err)
    }
}

// ============================================================================
// Executor-owned connections
// ============================================================================

#[test]
fn test_owned_connection_closed_after_success() {
    let (exec, driver) = executor(Script { affected: 4, ..Script::default() });

    let mut params = ParameterSet::new();
    params.add_value("@Name", "Ada").unwrap();
    params.add_value("@Age", 36).unwrap();

    assert_eq!(exec.execute_non_query_count("usp_person_save", &params).unwrap(), 4);
    assert_eq!(
        driver.events(),
        vec![
            Event::Open,
            Event::CreateCommand("usp_person_save".into()),
            Event::SetTimeout(Duration::from_secs(30)),
            Event::Bind("@Name".into()),
            Event::Bind("@Age".into()),
            Event::ExecuteNonQuery,
            Event::CommandDropped,
            Event::Close,
        ]
    );
}

#[test]
fn test_owned_connection_closed_after_failure() {
    let (exec, driver) = executor(Script { fail_execute: true, ..Script::default() });

    let err = exec.execute_non_query("usp_fails", &ParameterSet::NONE).unwrap_err();
    assert_eq!(err.error_code(), "QUERY_FAILED");
    assert_eq!(driver.count(&Event::Close), 1);
    assert_eq!(driver.count(&Event::CommandDropped), 1);
}

#[test]
fn test_open_failure_propagates_without_close() {
    let (exec, driver) = executor(Script { fail_open: true, ..Script::default() });

    let err = exec.execute_scalar("usp_any", &ParameterSet::NONE).unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_FAILED");
    assert!(driver.events().is_empty());
}

#[test]
fn test_close_failure_does_not_mask_primary_error() {
    let (exec, driver) = executor(Script { fail_execute: true, fail_close: true, ..Script::default() });

    let err = exec.execute_non_query("usp_fails", &ParameterSet::NONE).unwrap_err();
    assert!(err.message().contains("fake execution failure"));
    assert_eq!(driver.count(&Event::Close), 1);
}

#[test]
fn test_close_failure_after_success_is_reported() {
    let (exec, _driver) = executor(Script { fail_close: true, ..Script::default() });

    let err = exec.execute_non_query("usp_ok", &ParameterSet::NONE).unwrap_err();
    assert!(err.message().contains("fake close failure"));
}

// ============================================================================
// Caller-supplied connections
// ============================================================================

#[test]
fn test_caller_connection_stays_open_after_success() {
    let (exec, driver) = executor(Script { affected: 1, ..Script::default() });
    let mut conn = driver.connect();

    exec.execute_non_query_on(&mut conn, "usp_a", &ParameterSet::NONE).unwrap();
    exec.execute_non_query_on(&mut conn, "usp_b", &ParameterSet::NONE).unwrap();

    assert!(conn.is_open());
    assert_eq!(driver.count(&Event::Close), 0);
    assert_eq!(driver.count(&Event::Open), 1);
}

#[test]
fn test_caller_connection_stays_open_after_failure() {
    let (exec, driver) = executor(Script { fail_execute: true, ..Script::default() });
    let mut conn = driver.connect();

    assert!(exec.execute_scalar_on(&mut conn, "usp_fails", &ParameterSet::NONE).is_err());
    assert!(conn.is_open());
    assert_eq!(driver.count(&Event::Close), 0);
}

#[test]
fn test_closed_caller_connection_rejected() {
    let (exec, driver) = executor(Script::default());
    let mut conn = driver.connect();
    conn.close().unwrap();

    let err = exec.execute_non_query_on(&mut conn, "usp_a", &ParameterSet::NONE).unwrap_err();
    assert!(matches!(err, SprocketError::InvalidInput(_)));
    assert_eq!(driver.count(&Event::CreateCommand("usp_a".into())), 0);
}

// ============================================================================
// Reader mode
// ============================================================================

#[test]
fn test_reader_sees_rows_in_order() {
    let (exec, driver) = executor(three_rows());

    let seen = exec
        .execute_reader("usp_numbers", &ParameterSet::NONE, |reader| {
            let mut seen = Vec::new();
            while reader.read()? {
                seen.push(reader.get::<i32>("Value")?);
            }
            Ok::<_, SprocketError>(seen)
        })
        .unwrap();

    assert_eq!(seen, vec![1, 2, 3]);
    assert!(driver.events().contains(&Event::SetTimeout(Duration::from_secs(180))));
}

#[test]
fn test_failing_handler_releases_reader_and_command_once() {
    let (exec, driver) = executor(three_rows());

    let err = exec
        .execute_reader("usp_numbers", &ParameterSet::NONE, |reader: &mut dyn DataReader| {
            reader.read()?;
            let first = reader.get::<i32>("Value")?;
            Err::<(), _>(HandlerError::StoppedAt(first))
        })
        .unwrap_err();

    assert!(matches!(err, HandlerError::StoppedAt(1)));

    let events = driver.events();
    assert_eq!(driver.count(&Event::ReaderDropped), 1);
    assert_eq!(driver.count(&Event::CommandDropped), 1);
    assert_eq!(driver.count(&Event::Close), 1);

    let position = |e: &Event| events.iter().position(|x| x == e).unwrap();
    assert!(position(&Event::ReaderDropped) < position(&Event::CommandDropped));
    assert!(position(&Event::CommandDropped) < position(&Event::Close));
}

#[test]
fn test_panicking_handler_still_closes_connection() {
    let (exec, driver) = executor(three_rows());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        exec.execute_reader("usp_numbers", &ParameterSet::NONE, |reader: &mut dyn DataReader| -> Result<(), SprocketError> {
            reader.read()?;
            panic!("row handler gave up");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(driver.count(&Event::Close), 1);

    let events = driver.events();
    assert_eq!(&events[events.len() - 3..], &[Event::ReaderDropped, Event::CommandDropped, Event::Close]);
}

#[test]
fn test_reader_on_caller_connection_releases_reader_only() {
    let (exec, driver) = executor(three_rows());
    let mut conn = driver.connect();

    let count = exec
        .execute_reader_on(&mut conn, "usp_numbers", &ParameterSet::NONE, |reader| {
            let mut n = 0;
            while reader.read()? {
                n += 1;
            }
            Ok::<_, SprocketError>(n)
        })
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(driver.count(&Event::ReaderDropped), 1);
    assert_eq!(driver.count(&Event::CommandDropped), 1);
    assert!(conn.is_open());
}

#[test]
fn test_execute_failure_reaches_handler_error_type() {
    let (exec, _driver) = executor(Script { fail_execute: true, ..Script::default() });

    let err = exec
        .execute_reader("usp_fails", &ParameterSet::NONE, |_reader| Ok::<_, HandlerError>(()))
        .unwrap_err();
    assert!(matches!(err, HandlerError::Db(SprocketError::QueryFailed(_))));
}

// ============================================================================
// Scalar and fill
// ============================================================================

#[test]
fn test_scalar_as_text_is_scalar_cast() {
    let (exec, _driver) = executor(Script::rows([DbValue::Text("seven".into())]));

    let err = exec.execute_scalar_as::<i32>("usp_count", &ParameterSet::NONE).unwrap_err();
    assert!(matches!(err, SprocketError::ScalarCast { expected: "i32", actual: "Text" }));
}

#[test]
fn test_scalar_of_empty_result_is_null() {
    let (exec, _driver) = executor(Script::rows(Vec::new()));
    assert_eq!(exec.execute_scalar("usp_count", &ParameterSet::NONE).unwrap(), DbValue::Null);
}

#[test]
fn test_fill_uses_fill_timeout_and_names_table() {
    let (exec, driver) = executor(three_rows());

    let table = exec.fill_table("usp_numbers", &ParameterSet::NONE, "Numbers").unwrap();
    assert_eq!(table.name, "Numbers");
    assert_eq!(table.row_count(), 3);
    assert!(driver.events().contains(&Event::SetTimeout(Duration::from_secs(320))));
    assert_eq!(driver.count(&Event::Close), 1);
}

#[test]
fn test_fill_goes_through_command_fill() {
    let (exec, driver) = executor(three_rows());

    let dataset = exec.fill_dataset("usp_numbers", &ParameterSet::NONE, "Data", &["Numbers"]).unwrap();
    assert_eq!(dataset.tables[0].name, "Numbers");
    assert_eq!(
        driver.events(),
        vec![
            Event::Open,
            Event::CreateCommand("usp_numbers".into()),
            Event::SetTimeout(Duration::from_secs(320)),
            Event::Fill,
            Event::CommandDropped,
            Event::Close,
        ]
    );
}

#[test]
fn test_fill_dataset_too_many_names() {
    let (exec, driver) = executor(three_rows());

    let err = exec.fill_dataset("usp_numbers", &ParameterSet::NONE, "Data", &["A", "B"]).unwrap_err();
    assert!(matches!(err, SprocketError::InvalidInput(_)));
    assert_eq!(driver.count(&Event::Close), 1);
}

// ============================================================================
// Scoped connections and transactions
// ============================================================================

#[test]
fn test_identifier_uses_configured_name() {
    let driver = FakeDriver::new(Script::default());
    let settings = ExecutorSettings { identifier_parameter: "@CustomerId".into(), ..ExecutorSettings::new("fake://") };
    let exec = ProcedureExecutor::new(driver, settings);

    let params = exec.identifier(12);
    assert_eq!(params.lookup("@CustomerId").unwrap().value, DbValue::Int(12));
}

#[test]
fn test_transaction_commits_on_success() {
    let (exec, driver) = executor(Script { affected: 1, ..Script::default() });

    exec.in_transaction(|conn| {
        exec.execute_non_query_on(conn, "usp_a", &ParameterSet::NONE)?;
        exec.execute_non_query_on(conn, "usp_b", &ParameterSet::NONE)
    })
    .unwrap();

    let events = driver.events();
    assert!(events.contains(&Event::CreateCommand("BEGIN".into())));
    assert!(events.contains(&Event::CreateCommand("COMMIT".into())));
    assert!(!events.contains(&Event::CreateCommand("ROLLBACK".into())));
    assert_eq!(driver.count(&Event::Open), 1);
    assert_eq!(driver.count(&Event::Close), 1);
}

#[test]
fn test_transaction_rolls_back_on_failure() {
    let (exec, driver) = executor(Script::default());

    let err = exec
        .in_transaction(|conn| {
            exec.execute_non_query_on(conn, "usp_a", &ParameterSet::NONE)?;
            Err::<(), _>(SprocketError::invalid_input("business rule violated"))
        })
        .unwrap_err();

    assert!(err.message().contains("business rule violated"));
    let events = driver.events();
    assert!(events.contains(&Event::CreateCommand("ROLLBACK".into())));
    assert!(!events.contains(&Event::CreateCommand("COMMIT".into())));
    assert_eq!(driver.count(&Event::Close), 1);
}

#[test]
fn test_open_connection_is_caller_owned() {
    let (exec, driver) = executor(Script::default());

    let mut conn = exec.open_connection().unwrap();
    exec.execute_non_query_on(&mut conn, "usp_a", &ParameterSet::NONE).unwrap();
    assert_eq!(driver.count(&Event::Close), 0);

    conn.close().unwrap();
    assert_eq!(driver.count(&Event::Close), 1);
}
