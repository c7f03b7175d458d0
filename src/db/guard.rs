//! Scoped release of sessions and commands.
//!
//! Guards close what they hold when dropped, so every exit path (success,
//! driver error, panic unwinding) releases resources. Declare the command
//! guard after the connection guard: locals drop in reverse order, which
//! releases the command before its connection.
//!
//! Release failures are logged and swallowed; the error that ended the call,
//! if any, is the one propagated.

use crate::db::driver::{Command, Connection};
use tracing::{debug, warn};

enum Slot<'a> {
    /// Opened by the gateway; closed on drop.
    Owned(Box<dyn Connection>),
    /// Supplied by the caller; never closed here.
    Supplied(&'a mut dyn Connection),
}

/// Holds the session for one call.
pub struct ConnectionGuard<'a> {
    slot: Slot<'a>,
}

impl std::fmt::Debug for ConnectionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("owned", &self.is_owned())
            .finish_non_exhaustive()
    }
}

impl<'a> ConnectionGuard<'a> {
    /// Guard a session the gateway opened itself.
    pub fn owned(connection: Box<dyn Connection>) -> Self {
        Self {
            slot: Slot::Owned(connection),
        }
    }

    /// Guard a caller-supplied session; dropping the guard leaves it open.
    pub fn supplied(connection: &'a mut dyn Connection) -> Self {
        Self {
            slot: Slot::Supplied(connection),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.slot, Slot::Owned(_))
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        match &mut self.slot {
            Slot::Owned(connection) => connection.as_mut(),
            Slot::Supplied(connection) => &mut **connection,
        }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        let Slot::Owned(connection) = &mut self.slot else {
            return;
        };
        if connection.is_closed() {
            return;
        }
        let backend = connection.backend();
        match connection.close() {
            Ok(()) => debug!(backend = %backend, "Connection closed"),
            Err(e) => warn!(backend = %backend, error = %e, "Failed to close connection"),
        }
    }
}

/// Holds one command; closes it on drop.
pub struct CommandGuard<'c> {
    command: Box<dyn Command + 'c>,
}

impl std::fmt::Debug for CommandGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGuard").finish_non_exhaustive()
    }
}

impl<'c> CommandGuard<'c> {
    pub fn new(command: Box<dyn Command + 'c>) -> Self {
        Self { command }
    }

    pub fn command(&mut self) -> &mut (dyn Command + 'c) {
        self.command.as_mut()
    }
}

impl Drop for CommandGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.command.close() {
            warn!(error = %e, "Failed to close command");
        }
    }
}
