//! Shared test fixtures: an in-memory driver that records what the gateway
//! does with it and replays scripted results.

#![allow(dead_code)]

use indexmap::IndexMap;
use sqlgate::config::MemoryResolver;
use sqlgate::db::{Command, CommandExecutor, Connection, ConnectionFactory, Driver};
use sqlgate::error::{DriverError, DriverResult};
use sqlgate::logging::{LogSink, Severity};
use sqlgate::models::{
    BackendKind, CommandKind, ConnectionTarget, Direction, Parameter, ResultTable, Value,
};
use std::sync::{Arc, Mutex};

/// Everything the fake driver observed.
#[derive(Debug, Default)]
pub struct FakeState {
    pub opens: usize,
    pub closes: usize,
    pub command_closes: usize,
    pub targets: Vec<ConnectionTarget>,
    pub commands: Vec<(CommandKind, String)>,
    /// Bound parameters of each executed command, in bind order.
    pub executed_binds: Vec<Vec<Parameter>>,
}

#[derive(Debug, Clone, Default)]
struct Script {
    tables: Vec<ResultTable>,
    outputs: IndexMap<String, Value>,
    fail_open: Option<String>,
    fail_execute: Option<String>,
    fail_close: bool,
}

pub struct FakeDriver {
    backend: BackendKind,
    state: Arc<Mutex<FakeState>>,
    script: Script,
}

impl FakeDriver {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(FakeState::default())),
            script: Script::default(),
        }
    }

    /// Result tables returned by every fetch.
    pub fn with_tables(mut self, tables: Vec<ResultTable>) -> Self {
        self.script.tables = tables;
        self
    }

    /// Value the backend sets for an output parameter.
    pub fn with_output(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.script
            .outputs
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn failing_open(mut self, message: &str) -> Self {
        self.script.fail_open = Some(message.to_string());
        self
    }

    /// Every execution is rejected with `message` and server code 102.
    pub fn failing_execute(mut self, message: &str) -> Self {
        self.script.fail_execute = Some(message.to_string());
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.script.fail_close = true;
        self
    }

    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        Arc::clone(&self.state)
    }

    /// A connection opened outside the gateway, sharing this driver's state.
    pub fn connection(&self) -> FakeConnection {
        FakeConnection {
            backend: self.backend,
            state: Arc::clone(&self.state),
            script: self.script.clone(),
            closed: false,
        }
    }
}

impl Driver for FakeDriver {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn open(&self, target: &ConnectionTarget) -> DriverResult<Box<dyn Connection>> {
        let mut state = self.state.lock().unwrap();
        state.targets.push(target.clone());
        if let Some(message) = &self.script.fail_open {
            return Err(DriverError::new(message.clone()));
        }
        state.opens += 1;
        drop(state);
        Ok(Box::new(self.connection()))
    }
}

pub struct FakeConnection {
    backend: BackendKind,
    state: Arc<Mutex<FakeState>>,
    script: Script,
    closed: bool,
}

impl Connection for FakeConnection {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn create_command<'c>(
        &'c mut self,
        kind: CommandKind,
        text: &str,
    ) -> DriverResult<Box<dyn Command + 'c>> {
        if self.closed {
            return Err(DriverError::new("Connection is closed"));
        }
        self.state
            .lock()
            .unwrap()
            .commands
            .push((kind, text.to_string()));
        Ok(Box::new(FakeCommand {
            state: Arc::clone(&self.state),
            script: &self.script,
            binds: IndexMap::new(),
            executed: false,
        }))
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::new("Connection already closed"));
        }
        self.closed = true;
        self.state.lock().unwrap().closes += 1;
        if self.script.fail_close {
            return Err(DriverError::new("network dropped during logout"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct FakeCommand<'c> {
    state: Arc<Mutex<FakeState>>,
    script: &'c Script,
    binds: IndexMap<String, Parameter>,
    executed: bool,
}

impl Command for FakeCommand<'_> {
    fn bind(&mut self, parameter: &Parameter) -> DriverResult<()> {
        self.binds
            .insert(parameter.name.to_ascii_lowercase(), parameter.clone());
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        self.state
            .lock()
            .unwrap()
            .executed_binds
            .push(self.binds.values().cloned().collect());
        if let Some(message) = &self.script.fail_execute {
            return Err(DriverError::new(message.clone()).with_code("102"));
        }
        self.executed = true;
        Ok(())
    }

    fn fetch_tables(&mut self) -> DriverResult<Vec<ResultTable>> {
        self.execute()?;
        Ok(self.script.tables.clone())
    }

    fn read_output(&mut self, name: &str) -> DriverResult<Value> {
        if !self.executed {
            return Err(DriverError::new("Command has not been executed"));
        }
        let key = name.to_ascii_lowercase();
        let param = self
            .binds
            .get(&key)
            .filter(|p| p.direction.is_output())
            .ok_or_else(|| DriverError::new(format!("'{name}' is not an output parameter")))?;
        // Unscripted InOut parameters come back unchanged.
        Ok(match self.script.outputs.get(&key) {
            Some(value) => value.clone(),
            None if param.direction == Direction::InOut => param.value.clone(),
            None => Value::Null,
        })
    }

    fn close(&mut self) -> DriverResult<()> {
        self.state.lock().unwrap().command_closes += 1;
        Ok(())
    }
}

/// Sink that keeps every entry.
#[derive(Default)]
pub struct RecordingSink {
    pub entries: Mutex<Vec<(Severity, String, String)>>,
}

impl LogSink for RecordingSink {
    fn log(&self, severity: Severity, message: &str, detail: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((severity, message.to_string(), detail.to_string()));
    }
}

/// Sections for both backends, as a deployment's SysInfo file would hold them.
pub fn resolver() -> MemoryResolver {
    MemoryResolver::new()
        .with("SystemInfo", "DBSection", "SqlConnection")
        .with("SqlConnection", "DBIP", "db01")
        .with("SqlConnection", "DBName", "Sales")
        .with("SqlConnection", "UID", "sa")
        .with("SqlConnection", "PWD", "pw")
        .with("OracleConnection", "DBIP", "10.0.0.5")
        .with("OracleConnection", "DBName", "ORCL")
        .with("OracleConnection", "UID", "app")
        .with("OracleConnection", "PWD", "secret")
}

/// Executor whose only driver is `driver`.
pub fn executor_with(driver: FakeDriver, resolver: MemoryResolver) -> CommandExecutor {
    let factory =
        ConnectionFactory::without_drivers(Arc::new(resolver)).with_driver(Arc::new(driver));
    CommandExecutor::new(factory)
}

/// Row values for a single-column table of `n` integer rows.
pub fn numbered_table(column: &str, n: i64) -> ResultTable {
    let mut table = ResultTable::new([column]);
    for i in 1..=n {
        table.push_row(vec![Value::Int(i)]);
    }
    table
}
