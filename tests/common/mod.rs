//! Recording fake driver shared by the integration tests
//!
//! Every driver call is appended to a shared event log so tests can assert
//! exactly which resources were acquired and released, and in what order.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sprocket::{
    BufferedReader, Command, CommandType, Connection, DataReader, DataTable, DbValue, Driver, Parameter, Result,
    SprocketError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    CreateCommand(String),
    SetTimeout(Duration),
    Bind(String),
    ExecuteNonQuery,
    ExecuteReader,
    Fill,
    ReaderDropped,
    CommandDropped,
    Close,
}

/// How the fake database behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub tables: Vec<DataTable>,
    pub affected: u64,
    pub fail_open: bool,
    pub fail_execute: bool,
    pub fail_close: bool,
}

impl Script {
    /// One result set with a single `Value` column
    pub fn rows(values: impl IntoIterator<Item = DbValue>) -> Self {
        let mut table = DataTable::new("Table", vec!["Value".into()]);
        table.rows = values.into_iter().map(|v| vec![v]).collect();
        Self { tables: vec![table], ..Self::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    pub log: Arc<Mutex<Vec<Event>>>,
    pub script: Script,
}

impl FakeDriver {
    pub fn new(script: Script) -> Self {
        Self { log: Arc::default(), script }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// A connection that shares this driver's log, opened outside any executor
    pub fn connect(&self) -> FakeConnection {
        self.open("fake://").unwrap()
    }
}

fn record(log: &Arc<Mutex<Vec<Event>>>, event: Event) {
    log.lock().unwrap().push(event);
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;

    fn engine(&self) -> &'static str {
        "fake"
    }

    fn open(&self, _connection_string: &str) -> Result<FakeConnection> {
        if self.script.fail_open {
            return Err(SprocketError::connection_failed("fake open failure"));
        }
        record(&self.log, Event::Open);
        Ok(FakeConnection { log: Arc::clone(&self.log), script: self.script.clone(), open: true })
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    log: Arc<Mutex<Vec<Event>>>,
    script: Script,
    open: bool,
}

impl Connection for FakeConnection {
    type Command<'c> = FakeCommand<'c>;

    fn is_open(&self) -> bool {
        self.open
    }

    fn create_command(&mut self, text: &str, _command_type: CommandType) -> Result<FakeCommand<'_>> {
        record(&self.log, Event::CreateCommand(text.to_string()));
        Ok(FakeCommand { conn: self, timeout: Duration::ZERO })
    }

    fn close(&mut self) -> Result<()> {
        record(&self.log, Event::Close);
        self.open = false;
        if self.script.fail_close {
            return Err(SprocketError::connection_failed("fake close failure"));
        }
        Ok(())
    }
}

pub struct FakeCommand<'c> {
    conn: &'c mut FakeConnection,
    timeout: Duration,
}

impl Drop for FakeCommand<'_> {
    fn drop(&mut self) {
        record(&self.conn.log, Event::CommandDropped);
    }
}

impl Command for FakeCommand<'_> {
    type Reader<'r> = FakeReader where Self: 'r;

    fn set_timeout(&mut self, timeout: Duration) {
        record(&self.conn.log, Event::SetTimeout(timeout));
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bind(&mut self, param: &Parameter) -> Result<()> {
        record(&self.conn.log, Event::Bind(param.name.clone()));
        Ok(())
    }

    fn execute_non_query(&mut self) -> Result<u64> {
        record(&self.conn.log, Event::ExecuteNonQuery);
        if self.conn.script.fail_execute {
            return Err(SprocketError::query_failed("fake execution failure"));
        }
        Ok(self.conn.script.affected)
    }

    fn execute_reader(&mut self) -> Result<FakeReader> {
        record(&self.conn.log, Event::ExecuteReader);
        if self.conn.script.fail_execute {
            return Err(SprocketError::query_failed("fake execution failure"));
        }
        Ok(FakeReader {
            inner: BufferedReader::new(self.conn.script.tables.clone()),
            log: Arc::clone(&self.conn.log),
        })
    }

    fn fill(&mut self) -> Result<Vec<DataTable>> {
        record(&self.conn.log, Event::Fill);
        if self.conn.script.fail_execute {
            return Err(SprocketError::query_failed("fake execution failure"));
        }
        Ok(self.conn.script.tables.clone())
    }
}

pub struct FakeReader {
    inner: BufferedReader,
    log: Arc<Mutex<Vec<Event>>>,
}

impl Drop for FakeReader {
    fn drop(&mut self) {
        record(&self.log, Event::ReaderDropped);
    }
}

impl DataReader for FakeReader {
    fn read(&mut self) -> Result<bool> {
        self.inner.read()
    }

    fn field_count(&self) -> usize {
        self.inner.field_count()
    }

    fn name(&self, ordinal: usize) -> Result<&str> {
        self.inner.name(ordinal)
    }

    fn value(&self, ordinal: usize) -> Result<&DbValue> {
        self.inner.value(ordinal)
    }

    fn next_result(&mut self) -> Result<bool> {
        self.inner.next_result()
    }
}
