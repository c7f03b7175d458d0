//! Connection factory.
//!
//! Resolves a backend kind plus an optional section into a [`ConnectionTarget`]
//! and opens a session through the registered [`Driver`] for that kind.

use crate::config::{
    self, ConfigResolver, DATABASE_FIELD, DB_SECTION_FIELD, HOST_FIELD, PASSWORD_FIELD,
    PORT_FIELD, SYSTEM_INFO_SECTION, TRUST_CERT_FIELD, USER_FIELD,
};
use crate::db::driver::{Connection, Driver};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{BackendKind, ConnectionTarget};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drivers keyed by the backend kind they serve.
pub type DriverRegistry = HashMap<BackendKind, Arc<dyn Driver>>;

/// Opens sessions from configuration sections.
#[derive(Clone)]
pub struct ConnectionFactory {
    resolver: Arc<dyn ConfigResolver>,
    drivers: DriverRegistry,
    default_source: Option<String>,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut backends: Vec<_> = self.drivers.keys().map(|k| k.display_name()).collect();
        backends.sort_unstable();
        f.debug_struct("ConnectionFactory")
            .field("drivers", &backends)
            .field("default_source", &self.default_source)
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory {
    /// Create a factory with every native driver compiled into this build.
    pub fn new(resolver: Arc<dyn ConfigResolver>) -> Self {
        let mut factory = Self::without_drivers(resolver);
        #[cfg(feature = "mssql")]
        {
            factory = factory.with_driver(Arc::new(crate::db::mssql::SqlServerDriver::new()));
        }
        #[cfg(feature = "oracle")]
        {
            factory = factory.with_driver(Arc::new(crate::db::oracle::OracleDriver::new()));
        }
        factory
    }

    /// Create a factory with no drivers registered.
    pub fn without_drivers(resolver: Arc<dyn ConfigResolver>) -> Self {
        Self {
            resolver,
            drivers: HashMap::new(),
            default_source: None,
        }
    }

    /// Register `driver` for its backend kind, replacing any previous one.
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.insert(driver.backend(), driver);
        self
    }

    /// Source used when a call names none, ahead of the process-wide default.
    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = Some(source.into());
        self
    }

    pub fn has_driver(&self, backend: BackendKind) -> bool {
        self.drivers.contains_key(&backend)
    }

    fn source_for(&self, source: Option<&str>) -> String {
        match source.filter(|s| !s.trim().is_empty()) {
            Some(source) => source.to_string(),
            None => config::effective_source(self.default_source.as_deref()),
        }
    }

    fn lookup(&self, source: &str, section: &str, field: &str) -> Option<String> {
        self.resolver
            .lookup(source, section, field)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, source: &str, section: &str, field: &str) -> GatewayResult<String> {
        self.lookup(source, section, field)
            .ok_or_else(|| GatewayError::config_missing(source, section, field))
    }

    /// Section a call for `backend` reads its connection values from.
    ///
    /// An explicit non-empty section wins. Otherwise Oracle uses its fixed
    /// default section and SQL Server reads `SystemInfo/DBSection`.
    pub fn resolve_section(
        &self,
        backend: BackendKind,
        section: Option<&str>,
        source: Option<&str>,
    ) -> GatewayResult<String> {
        if let Some(section) = section.map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(section.to_string());
        }
        if let Some(fixed) = backend.fixed_default_section() {
            return Ok(fixed.to_string());
        }
        let source = self.source_for(source);
        self.require(&source, SYSTEM_INFO_SECTION, DB_SECTION_FIELD)
    }

    /// Read the connection values of the resolved section.
    pub fn resolve_target(
        &self,
        backend: BackendKind,
        section: Option<&str>,
        source: Option<&str>,
    ) -> GatewayResult<ConnectionTarget> {
        let section = self.resolve_section(backend, section, source)?;
        let source = self.source_for(source);
        debug!(backend = %backend, section = %section, source = %source, "Resolving connection target");

        let host = self.require(&source, &section, HOST_FIELD)?;
        let database = self.require(&source, &section, DATABASE_FIELD)?;
        let user = self.require(&source, &section, USER_FIELD)?;
        let password = self.require(&source, &section, PASSWORD_FIELD)?;

        let port = match self.lookup(&source, &section, PORT_FIELD) {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| GatewayError::config_invalid(&section, PORT_FIELD, &raw))?,
            ),
            None => None,
        };

        let trust_server_certificate = match self.lookup(&source, &section, TRUST_CERT_FIELD) {
            Some(raw) => parse_flag(&raw)
                .ok_or_else(|| GatewayError::config_invalid(&section, TRUST_CERT_FIELD, &raw))?,
            None => false,
        };
        if trust_server_certificate && backend == BackendKind::Oracle {
            warn!(section = %section, "TrustServerCertificate has no effect on Oracle sessions");
        }

        Ok(ConnectionTarget {
            section,
            host,
            database,
            user,
            password,
            port,
            trust_server_certificate,
        })
    }

    /// Resolve configuration and open a new session. Single attempt.
    pub fn open(
        &self,
        backend: BackendKind,
        section: Option<&str>,
        source: Option<&str>,
    ) -> GatewayResult<Box<dyn Connection>> {
        let target = self.resolve_target(backend, section, source)?;
        let driver = self
            .drivers
            .get(&backend)
            .ok_or_else(|| GatewayError::driver_unavailable(backend))?;

        match driver.open(&target) {
            Ok(connection) => {
                info!(
                    backend = %backend,
                    section = %target.section,
                    host = %target.host,
                    "Session opened"
                );
                Ok(connection)
            }
            Err(e) => Err(GatewayError::connection_open_failed(
                backend,
                &target.section,
                e,
            )),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
