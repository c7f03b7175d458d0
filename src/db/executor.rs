//! Command execution engine.
//!
//! [`CommandExecutor`] runs one statement or procedure call per invocation in
//! one of four shapes:
//! - [`execute_non_query`](CommandExecutor::execute_non_query): raw statement,
//!   nothing returned
//! - [`execute_procedure`](CommandExecutor::execute_procedure): stored
//!   procedure, nothing returned
//! - [`query`](CommandExecutor::query): statement or procedure, every result
//!   table returned
//! - [`execute_with_output`](CommandExecutor::execute_with_output): stored
//!   procedure, output parameters returned
//!
//! Every shape validates parameters before opening anything, binds them in
//! declaration order and releases the command and any gateway-opened session
//! on every exit path.

use crate::db::driver::{Command, Connection};
use crate::db::factory::ConnectionFactory;
use crate::db::guard::{CommandGuard, ConnectionGuard};
use crate::db::params::validate_parameters;
use crate::error::{DriverResult, GatewayError, GatewayResult};
use crate::logging::{LogSink, Severity, TracingSink};
use crate::models::{
    BackendKind, CommandKind, OutputValues, ParamType, Parameter, TabularResult,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The session a call runs on.
pub enum Session<'a> {
    /// A session the caller opened and keeps ownership of.
    Supplied(&'a mut dyn Connection),
    /// Open a new session for the call and close it afterwards.
    Open {
        backend: BackendKind,
        /// Explicit section; `None` uses the backend's default section.
        section: Option<String>,
        /// Explicit configuration source; `None` uses the default source.
        source: Option<String>,
    },
}

impl<'a> Session<'a> {
    /// Run on a caller-owned session.
    pub fn supplied(connection: &'a mut dyn Connection) -> Self {
        Self::Supplied(connection)
    }

    /// Open a session for `backend` from its default section.
    pub fn open(backend: BackendKind) -> Self {
        Self::Open {
            backend,
            section: None,
            source: None,
        }
    }

    /// Open a session for `backend` from a named section.
    pub fn section(backend: BackendKind, section: impl Into<String>) -> Self {
        Self::Open {
            backend,
            section: Some(section.into()),
            source: None,
        }
    }

    /// Read the section from `source` instead of the default source.
    /// No effect on a supplied session.
    pub fn with_source(self, source: impl Into<String>) -> Self {
        match self {
            Self::Open {
                backend, section, ..
            } => Self::Open {
                backend,
                section,
                source: Some(source.into()),
            },
            supplied => supplied,
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Supplied(connection) => connection.backend(),
            Self::Open { backend, .. } => *backend,
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supplied(connection) => f
                .debug_tuple("Supplied")
                .field(&connection.backend())
                .finish(),
            Self::Open {
                backend,
                section,
                source,
            } => f
                .debug_struct("Open")
                .field("backend", backend)
                .field("section", section)
                .field("source", source)
                .finish(),
        }
    }
}

/// Executes commands against either backend.
#[derive(Clone)]
pub struct CommandExecutor {
    factory: ConnectionFactory,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Create an executor reporting failures to [`TracingSink`].
    pub fn new(factory: ConnectionFactory) -> Self {
        Self {
            factory,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the log sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    /// Run a raw statement that returns no rows.
    pub fn execute_non_query(
        &self,
        session: Session<'_>,
        sql: &str,
        params: &[Parameter],
    ) -> GatewayResult<()> {
        self.run(session, CommandKind::Text, sql, params, |command, _| {
            command.execute()
        })
    }

    /// Run a stored procedure, discarding any rows and outputs.
    pub fn execute_procedure(
        &self,
        session: Session<'_>,
        procedure: &str,
        params: &[Parameter],
    ) -> GatewayResult<()> {
        self.run(
            session,
            CommandKind::StoredProcedure,
            procedure,
            params,
            |command, _| command.execute(),
        )
    }

    /// Run a statement or procedure and collect every result table.
    pub fn query(
        &self,
        session: Session<'_>,
        kind: CommandKind,
        text: &str,
        params: &[Parameter],
    ) -> GatewayResult<TabularResult> {
        self.run(session, kind, text, params, |command, _| {
            command.fetch_tables().map(TabularResult::new)
        })
    }

    /// Run a stored procedure and read back its output and input/output
    /// parameters, keyed by name in declaration order.
    ///
    /// Cursor parameters produce tables, not values, and are left out.
    pub fn execute_with_output(
        &self,
        session: Session<'_>,
        procedure: &str,
        params: &[Parameter],
    ) -> GatewayResult<OutputValues> {
        self.run(
            session,
            CommandKind::StoredProcedure,
            procedure,
            params,
            |command, params| {
                command.execute()?;
                let mut outputs = OutputValues::new();
                for param in params
                    .iter()
                    .filter(|p| p.direction.is_output() && p.param_type != ParamType::RefCursor)
                {
                    let value = command.read_output(&param.name)?;
                    outputs.insert(param.name.clone(), value);
                }
                Ok(outputs)
            },
        )
    }

    fn run<T>(
        &self,
        session: Session<'_>,
        kind: CommandKind,
        text: &str,
        params: &[Parameter],
        op: impl FnOnce(&mut dyn Command, &[Parameter]) -> DriverResult<T>,
    ) -> GatewayResult<T> {
        let backend = session.backend();
        if let Err(e) = validate_parameters(backend, params) {
            self.report(&e, text);
            return Err(e);
        }

        let mut guard = match session {
            Session::Supplied(connection) => ConnectionGuard::supplied(connection),
            Session::Open {
                backend,
                section,
                source,
            } => match self
                .factory
                .open(backend, section.as_deref(), source.as_deref())
            {
                Ok(connection) => ConnectionGuard::owned(connection),
                Err(e) => {
                    self.report(&e, text);
                    return Err(e);
                }
            },
        };

        debug!(
            backend = %backend,
            kind = ?kind,
            text = %text,
            params = params.len(),
            owned = guard.is_owned(),
            "Executing command"
        );
        let start = Instant::now();
        let result = run_on(guard.connection(), kind, text, params, op);
        drop(guard);

        match result {
            Ok(value) => {
                debug!(
                    backend = %backend,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Command completed"
                );
                Ok(value)
            }
            Err(e) => {
                let err = GatewayError::execution_failed(e);
                self.report(&err, text);
                Err(err)
            }
        }
    }

    fn report(&self, err: &GatewayError, text: &str) {
        self.sink.log(Severity::Error, &err.to_string(), text);
    }
}

/// Create the command, bind in declaration order and run `op`. The command
/// guard drops here, before the caller releases the connection.
fn run_on<T>(
    connection: &mut dyn Connection,
    kind: CommandKind,
    text: &str,
    params: &[Parameter],
    op: impl FnOnce(&mut dyn Command, &[Parameter]) -> DriverResult<T>,
) -> DriverResult<T> {
    let mut command = CommandGuard::new(connection.create_command(kind, text)?);
    for param in params {
        command.command().bind(param)?;
    }
    op(command.command(), params)
}
