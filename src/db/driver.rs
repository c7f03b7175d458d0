//! Driver capability set.
//!
//! Each backend's native API is adapted to three small traits:
//! - [`Driver`] opens sessions for one backend kind
//! - [`Connection`] is a live session that creates commands
//! - [`Command`] binds parameters, executes, fetches rows and reads output
//!   parameters back
//!
//! The executor is written once against these traits and never sees a native
//! driver type.

use crate::error::DriverResult;
use crate::models::{BackendKind, CommandKind, ConnectionTarget, Parameter, ResultTable, Value};

/// Opens sessions for one backend kind.
pub trait Driver: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Open a session to `target`. Single attempt, no retry.
    fn open(&self, target: &ConnectionTarget) -> DriverResult<Box<dyn Connection>>;
}

/// A live session to one backend instance.
pub trait Connection: Send {
    fn backend(&self) -> BackendKind;

    /// Create a command for a raw statement or a stored procedure.
    fn create_command<'c>(
        &'c mut self,
        kind: CommandKind,
        text: &str,
    ) -> DriverResult<Box<dyn Command + 'c>>;

    /// End the session. Closing twice is an error the caller may ignore.
    fn close(&mut self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;
}

/// One statement or procedure call on a session.
pub trait Command {
    /// Bind a parameter by name. Binding the same name twice replaces it.
    fn bind(&mut self, parameter: &Parameter) -> DriverResult<()>;

    /// Execute without producing rows.
    fn execute(&mut self) -> DriverResult<()>;

    /// Execute and collect every result table in the order the backend
    /// returns them.
    fn fetch_tables(&mut self) -> DriverResult<Vec<ResultTable>>;

    /// Value of an output or input/output parameter after execution.
    fn read_output(&mut self, name: &str) -> DriverResult<Value>;

    /// Release the command's native resources.
    fn close(&mut self) -> DriverResult<()>;
}
