//! Database layer.
//!
//! - `driver`: the capability set every backend adapter implements
//! - `factory`: configuration-driven session opening
//! - `executor`: the four execution shapes
//! - `guard`: scoped release of sessions and commands
//! - `params`: parameter validation ahead of any network call
//! - `mssql` / `oracle`: native adapters, one per cargo feature

pub mod driver;
pub mod executor;
pub mod factory;
pub mod guard;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "oracle")]
pub mod oracle;
pub mod params;

pub use driver::{Command, Connection, Driver};
pub use executor::{CommandExecutor, Session};
pub use factory::{ConnectionFactory, DriverRegistry};
pub use guard::{CommandGuard, ConnectionGuard};
#[cfg(feature = "mssql")]
pub use self::mssql::SqlServerDriver;
#[cfg(feature = "oracle")]
pub use self::oracle::OracleDriver;
pub use params::validate_parameters;
