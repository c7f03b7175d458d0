//! sqlgate library
//!
//! A synchronous SQL execution gateway for SQL Server and Oracle: resolve a
//! connection from a configuration section, bind typed named parameters and
//! run statements or stored procedures in one of four shapes.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::Config;
pub use db::{CommandExecutor, ConnectionFactory, Session};
pub use error::{DriverError, GatewayError, GatewayResult};
