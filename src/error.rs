//! Error types for the SQL gateway.
//!
//! Every failure a caller can observe is a [`GatewayError`]. Failures raised by
//! a native driver are first captured as a [`DriverError`] and then wrapped, so
//! the original driver message stays reachable through `source()`.

use crate::models::{BackendKind, ParamType};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure reported by a backend driver adapter.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    /// Server error number or code, e.g. "102" (SQL Server) or "ORA-00942".
    code: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl DriverError {
    /// Create a driver error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Attach a server error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the native error this one was built from.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Result type alias for driver adapter operations.
pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration missing: field '{field}' not found in section '{section}' of '{source_id}'")]
    ConfigMissing {
        source_id: String,
        section: String,
        field: String,
    },

    #[error("Configuration invalid: field '{field}' in section '{section}' has value '{value}'")]
    ConfigInvalid {
        section: String,
        field: String,
        value: String,
    },

    #[error("Connection failed: could not open {backend} session for section '{section}': {message}")]
    ConnectionOpenFailed {
        backend: BackendKind,
        section: String,
        message: String,
        #[source]
        source: DriverError,
    },

    #[error("Execution failed: {message}")]
    ExecutionFailed {
        message: String,
        #[source]
        source: DriverError,
    },

    #[error("Missing output size: variable-length parameter '{name}' ({param_type}) needs a maximum size")]
    MissingOutputSize { name: String, param_type: ParamType },

    #[error("Duplicate parameter: '{name}' is declared more than once")]
    DuplicateParameter { name: String },

    #[error("Invalid parameter name: '{name}' must be a letter followed by letters, digits or '_', and not a placeholder such as P1")]
    InvalidParameterName { name: String },

    #[error("Unsupported parameter type: {backend} cannot bind '{name}' as {param_type}")]
    UnsupportedParameterType {
        backend: BackendKind,
        name: String,
        param_type: ParamType,
    },

    #[error("Driver unavailable: no {backend} driver is registered")]
    DriverUnavailable { backend: BackendKind },
}

impl GatewayError {
    /// Create a missing configuration error.
    pub fn config_missing(
        source_id: impl Into<String>,
        section: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::ConfigMissing {
            source_id: source_id.into(),
            section: section.into(),
            field: field.into(),
        }
    }

    /// Create an invalid configuration value error.
    pub fn config_invalid(
        section: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::ConfigInvalid {
            section: section.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Wrap a driver failure raised while opening a session.
    pub fn connection_open_failed(
        backend: BackendKind,
        section: impl Into<String>,
        source: DriverError,
    ) -> Self {
        Self::ConnectionOpenFailed {
            backend,
            section: section.into(),
            message: source.message().to_string(),
            source,
        }
    }

    /// Wrap a driver failure raised while binding or executing.
    pub fn execution_failed(source: DriverError) -> Self {
        Self::ExecutionFailed {
            message: source.message().to_string(),
            source,
        }
    }

    /// Create a missing output size error.
    pub fn missing_output_size(name: impl Into<String>, param_type: ParamType) -> Self {
        Self::MissingOutputSize {
            name: name.into(),
            param_type,
        }
    }

    /// Create a duplicate parameter error.
    pub fn duplicate_parameter(name: impl Into<String>) -> Self {
        Self::DuplicateParameter { name: name.into() }
    }

    /// Create an invalid parameter name error.
    pub fn invalid_parameter_name(name: impl Into<String>) -> Self {
        Self::InvalidParameterName { name: name.into() }
    }

    /// Create an unsupported parameter type error.
    pub fn unsupported_parameter_type(
        backend: BackendKind,
        name: impl Into<String>,
        param_type: ParamType,
    ) -> Self {
        Self::UnsupportedParameterType {
            backend,
            name: name.into(),
            param_type,
        }
    }

    /// Create a driver unavailable error.
    pub fn driver_unavailable(backend: BackendKind) -> Self {
        Self::DriverUnavailable { backend }
    }

    /// Check if this error came from resolving configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigMissing { .. } | Self::ConfigInvalid { .. })
    }

    /// Server error code of the wrapped driver error, if any.
    pub fn driver_code(&self) -> Option<&str> {
        match self {
            Self::ConnectionOpenFailed { source, .. } | Self::ExecutionFailed { source, .. } => {
                source.code()
            }
            _ => None,
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
