//! Connection-related data models.
//!
//! This module defines the backend kinds the gateway can target and the
//! connection target resolved from a configuration section.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default SQL Server listener port.
pub const SQL_SERVER_DEFAULT_PORT: u16 = 1433;

/// Default Oracle listener port.
pub const ORACLE_DEFAULT_PORT: u16 = 1521;

/// Section used for Oracle calls that don't name one.
pub const ORACLE_DEFAULT_SECTION: &str = "OracleConnection";

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Microsoft SQL Server (row-oriented server engine)
    SqlServer,
    /// Oracle Database (enterprise RDBMS with PL/SQL procedures)
    Oracle,
}

impl BackendKind {
    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SqlServer => "SQL Server",
            Self::Oracle => "Oracle",
        }
    }

    /// Get the default listener port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::SqlServer => SQL_SERVER_DEFAULT_PORT,
            Self::Oracle => ORACLE_DEFAULT_PORT,
        }
    }

    /// Section name used when a call names none and `SystemInfo` isn't consulted.
    pub fn fixed_default_section(&self) -> Option<&'static str> {
        match self {
            Self::SqlServer => None,
            Self::Oracle => Some(ORACLE_DEFAULT_SECTION),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlserver" | "sql-server" | "mssql" => Ok(Self::SqlServer),
            "oracle" | "ora" => Ok(Self::Oracle),
            other => Err(format!("Unknown backend kind: {other}")),
        }
    }
}

/// Where and as whom to connect, resolved from one configuration section.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Section the values were read from.
    pub section: String,
    pub host: String,
    /// Database name (SQL Server) or service name (Oracle).
    pub database: String,
    pub user: String,
    /// Sensitive - never log
    pub password: String,
    /// None means the backend's default port.
    pub port: Option<u16>,
    /// SQL Server only: skip server certificate validation.
    pub trust_server_certificate: bool,
}

impl ConnectionTarget {
    /// Port to connect to for the given backend.
    pub fn effective_port(&self, backend: BackendKind) -> u16 {
        self.port.unwrap_or_else(|| backend.default_port())
    }

    /// Oracle connect descriptor.
    ///
    /// ```text
    /// (DESCRIPTION=(ADDRESS_LIST=(ADDRESS=(PROTOCOL=TCP)(HOST=h)(PORT=1521)))(CONNECT_DATA=(SERVICE_NAME=s)))
    /// ```
    pub fn oracle_locator(&self) -> String {
        format!(
            "(DESCRIPTION=(ADDRESS_LIST=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={})))(CONNECT_DATA=(SERVICE_NAME={})))",
            self.host,
            self.effective_port(BackendKind::Oracle),
            self.database
        )
    }

    /// SQL Server attribute-list connection string.
    pub fn sql_server_descriptor(&self) -> String {
        self.sql_server_descriptor_with_password(&self.password)
    }

    fn sql_server_descriptor_with_password(&self, password: &str) -> String {
        let server = match self.port {
            Some(port) => format!("tcp:{},{}", self.host, port),
            None => self.host.clone(),
        };
        let mut descriptor = format!(
            "Server={};User ID={};Password={};Database={}",
            quote_ado_value(&server),
            quote_ado_value(&self.user),
            quote_ado_value(password),
            quote_ado_value(&self.database)
        );
        if self.trust_server_certificate {
            descriptor.push_str(";TrustServerCertificate=true");
        }
        descriptor
    }

    /// Descriptor for the given backend.
    pub fn descriptor(&self, backend: BackendKind) -> String {
        match backend {
            BackendKind::SqlServer => self.sql_server_descriptor(),
            BackendKind::Oracle => self.oracle_locator(),
        }
    }

    /// Get a display-safe descriptor (credentials masked).
    pub fn masked_descriptor(&self, backend: BackendKind) -> String {
        match backend {
            BackendKind::SqlServer => self.sql_server_descriptor_with_password("****"),
            BackendKind::Oracle => format!("{}@{}", self.user, self.oracle_locator()),
        }
    }
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("section", &self.section)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"****")
            .field("port", &self.port)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

/// Quote an ADO connection string value when it contains separators.
fn quote_ado_value(value: &str) -> String {
    if value.contains(';') || value.starts_with(' ') || value.ends_with(' ') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}
