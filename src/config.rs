//! Configuration handling for the SQL gateway.
//!
//! Two concerns live here:
//! - Config resolution: the [`ConfigResolver`] trait answers "what is field F of
//!   section S in source X", plus the process-wide default source.
//! - CLI configuration for the `sqlgate` binary via CLI arguments and
//!   environment variables.

use crate::models::{BackendKind, Parameter};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Default configuration source, used when a call names none.
pub const DEFAULT_CONFIG_SOURCE: &str = "SysInfo.toml";

/// Section holding process-level settings.
pub const SYSTEM_INFO_SECTION: &str = "SystemInfo";
/// Field of [`SYSTEM_INFO_SECTION`] naming the default database section.
pub const DB_SECTION_FIELD: &str = "DBSection";

// Per-section connection fields
pub const HOST_FIELD: &str = "DBIP";
pub const DATABASE_FIELD: &str = "DBName";
pub const USER_FIELD: &str = "UID";
pub const PASSWORD_FIELD: &str = "PWD";
pub const PORT_FIELD: &str = "Port";
pub const TRUST_CERT_FIELD: &str = "TrustServerCertificate";

static DEFAULT_SOURCE: RwLock<Option<String>> = RwLock::new(None);

/// Current process-wide default configuration source.
pub fn default_config_source() -> String {
    let guard = DEFAULT_SOURCE.read().unwrap_or_else(|e| e.into_inner());
    guard
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_SOURCE.to_string())
}

/// Replace the process-wide default configuration source.
///
/// Affects every later resolution that doesn't name a source explicitly.
pub fn set_default_config_source(source: impl Into<String>) {
    let mut guard = DEFAULT_SOURCE.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(source.into());
}

/// Pick the explicit source if non-empty, otherwise the process-wide default.
pub fn effective_source(source: Option<&str>) -> String {
    source
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .unwrap_or_else(default_config_source)
}

/// Key-value lookup over named configuration sections.
pub trait ConfigResolver: Send + Sync {
    /// Value of `field` in `section` of `source`, or `None` if any part is absent.
    fn lookup(&self, source: &str, section: &str, field: &str) -> Option<String>;
}

/// Resolver over TOML files: sections are tables, fields are keys.
///
/// ```toml
/// [SystemInfo]
/// DBSection = "SqlConnection"
///
/// [OracleConnection]
/// DBIP = "10.0.0.5"
/// DBName = "ORCL"
/// UID = "app"
/// PWD = "secret"
/// Port = 1521
/// ```
///
/// The file is read on every lookup.
#[derive(Debug, Clone, Default)]
pub struct TomlFileResolver {
    base_dir: Option<PathBuf>,
}

impl TomlFileResolver {
    /// Resolve relative sources against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative sources against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn load(&self, source: &str) -> Option<toml::Table> {
        let path = self.path_for(source);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Config source not readable");
                return None;
            }
        };
        match content.parse::<toml::Table>() {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config source is not valid TOML");
                None
            }
        }
    }
}

impl ConfigResolver for TomlFileResolver {
    fn lookup(&self, source: &str, section: &str, field: &str) -> Option<String> {
        let table = self.load(source)?;
        let value = table.get(section)?.as_table()?.get(field)?;
        match value {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// In-process resolver. The source argument is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    sections: HashMap<String, HashMap<String, String>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one field, creating the section as needed.
    pub fn set(
        &mut self,
        section: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(field.into(), value.into());
        self
    }

    /// Builder-style variant of [`MemoryResolver::set`].
    pub fn with(
        mut self,
        section: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set(section, field, value);
        self
    }
}

impl ConfigResolver for MemoryResolver {
    fn lookup(&self, _source: &str, section: &str, field: &str) -> Option<String> {
        self.sections.get(section)?.get(field).cloned()
    }
}

/// Configuration for the `sqlgate` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqlgate",
    about = "Run statements and stored procedures against SQL Server or Oracle",
    version,
    author
)]
pub struct Config {
    /// Configuration file holding the connection sections.
    #[arg(
        short,
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_SOURCE,
        env = "SQLGATE_CONFIG"
    )]
    pub config_source: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLGATE_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: GatewayCommand,
}

/// Which backend and section a command targets.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Backend kind: sqlserver or oracle
    #[arg(short, long, default_value = "sqlserver")]
    pub backend: BackendKind,

    /// Configuration section. Defaults to SystemInfo/DBSection (SQL Server)
    /// or OracleConnection (Oracle).
    #[arg(short, long)]
    pub section: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum GatewayCommand {
    /// Run a statement that returns no rows.
    Exec {
        #[command(flatten)]
        target: TargetArgs,
        /// SQL statement text
        sql: String,
        /// Parameter as direction:type[(size)]:name[=value]. Repeatable.
        #[arg(short, long = "param", value_name = "PARAM")]
        params: Vec<Parameter>,
    },

    /// Run a stored procedure.
    Call {
        #[command(flatten)]
        target: TargetArgs,
        /// Procedure name
        procedure: String,
        /// Parameter as direction:type[(size)]:name[=value]. Repeatable.
        #[arg(short, long = "param", value_name = "PARAM")]
        params: Vec<Parameter>,
        /// Print output and input/output parameter values.
        #[arg(long)]
        outputs: bool,
    },

    /// Run a statement or procedure and print its result tables.
    Query {
        #[command(flatten)]
        target: TargetArgs,
        /// SQL statement text, or procedure name with --procedure
        text: String,
        /// Treat TEXT as a stored procedure name.
        #[arg(long)]
        procedure: bool,
        /// Parameter as direction:type[(size)]:name[=value]. Repeatable.
        #[arg(short, long = "param", value_name = "PARAM")]
        params: Vec<Parameter>,
    },

    /// Print the resolved connection descriptor (password masked).
    Describe {
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[SystemInfo]
DBSection = "SqlConnection"

[OracleConnection]
DBIP = "10.0.0.5"
DBName = "ORCL"
UID = "app"
PWD = "secret"

[SqlConnection]
DBIP = "db01"
Port = 14330
TrustServerCertificate = true
"#;

    fn sample_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_toml_lookup() {
        let file = sample_file();
        let source = file.path().to_str().unwrap();
        let resolver = TomlFileResolver::new();

        assert_eq!(
            resolver.lookup(source, "OracleConnection", "DBIP"),
            Some("10.0.0.5".to_string())
        );
        assert_eq!(
            resolver.lookup(source, SYSTEM_INFO_SECTION, DB_SECTION_FIELD),
            Some("SqlConnection".to_string())
        );
    }

    #[test]
    fn test_toml_scalars_render_as_strings() {
        let file = sample_file();
        let source = file.path().to_str().unwrap();
        let resolver = TomlFileResolver::new();

        assert_eq!(
            resolver.lookup(source, "SqlConnection", "Port"),
            Some("14330".to_string())
        );
        assert_eq!(
            resolver.lookup(source, "SqlConnection", TRUST_CERT_FIELD),
            Some("true".to_string())
        );
    }

    #[test]
    fn test_toml_absent_values() {
        let file = sample_file();
        let source = file.path().to_str().unwrap();
        let resolver = TomlFileResolver::new();

        assert_eq!(resolver.lookup(source, "OracleConnection", "Port"), None);
        assert_eq!(resolver.lookup(source, "NoSuchSection", "DBIP"), None);
        assert_eq!(resolver.lookup("/no/such/file.toml", "OracleConnection", "DBIP"), None);
    }

    #[test]
    fn test_toml_invalid_file_is_absent() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[broken\nDBIP = ").unwrap();
        let resolver = TomlFileResolver::new();
        assert_eq!(
            resolver.lookup(file.path().to_str().unwrap(), "broken", "DBIP"),
            None
        );
    }

    #[test]
    fn test_toml_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SysInfo.toml"), SAMPLE).unwrap();
        let resolver = TomlFileResolver::with_base_dir(dir.path());

        assert_eq!(
            resolver.lookup("SysInfo.toml", "OracleConnection", "UID"),
            Some("app".to_string())
        );
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new()
            .with("OracleConnection", "DBIP", "10.0.0.5")
            .with("OracleConnection", "DBName", "ORCL");

        assert_eq!(
            resolver.lookup("ignored", "OracleConnection", "DBName"),
            Some("ORCL".to_string())
        );
        assert_eq!(resolver.lookup("ignored", "OracleConnection", "UID"), None);
    }

    #[test]
    fn test_effective_source_prefers_explicit() {
        assert_eq!(effective_source(Some("other.toml")), "other.toml");
        assert_eq!(effective_source(Some("  ")), default_config_source());
        assert_eq!(effective_source(None), default_config_source());
    }

    #[test]
    fn test_cli_parses_call() {
        let config = Config::try_parse_from([
            "sqlgate",
            "--config",
            "prod.toml",
            "call",
            "--backend",
            "oracle",
            "pkg.get_total",
            "-p",
            "in:int:id=7",
            "-p",
            "out:number:total",
            "--outputs",
        ])
        .unwrap();

        assert_eq!(config.config_source, "prod.toml");
        match config.command {
            GatewayCommand::Call {
                target,
                procedure,
                params,
                outputs,
            } => {
                assert_eq!(target.backend, BackendKind::Oracle);
                assert_eq!(target.section, None);
                assert_eq!(procedure, "pkg.get_total");
                assert_eq!(params.len(), 2);
                assert!(outputs);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_exec_with_section() {
        let config = Config::try_parse_from([
            "sqlgate",
            "exec",
            "-s",
            "Reporting",
            "DELETE FROM audit WHERE day < @cutoff",
            "-p",
            "in:date:cutoff=2024-01-01",
        ])
        .unwrap();

        assert_eq!(config.config_source, DEFAULT_CONFIG_SOURCE);
        match config.command {
            GatewayCommand::Exec {
                target,
                sql,
                params,
            } => {
                assert_eq!(target.backend, BackendKind::SqlServer);
                assert_eq!(target.section.as_deref(), Some("Reporting"));
                assert!(sql.starts_with("DELETE"));
                assert_eq!(params[0].name, "cutoff");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
