//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    BackendKind, ConnectionTarget, ORACLE_DEFAULT_PORT, ORACLE_DEFAULT_SECTION,
    SQL_SERVER_DEFAULT_PORT,
};
pub use query::{
    CommandKind, Direction, OutputValues, ParamType, Parameter, ResultTable, Row, TabularResult,
    Value,
};
