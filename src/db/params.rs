//! Parameter validation.
//!
//! Everything that can be checked about a parameter list without a session is
//! checked here, before a connection is opened: names, duplicates, output
//! capacities and whether the backend can express each type.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{BackendKind, ParamType, Parameter};
use std::collections::HashSet;

/// Check whether `backend` can bind parameters of `param_type`.
pub fn backend_supports(backend: BackendKind, param_type: ParamType) -> bool {
    match backend {
        // No cursor type in T-SQL parameters.
        BackendKind::SqlServer => param_type != ParamType::RefCursor,
        // No standalone TIME type in Oracle.
        BackendKind::Oracle => param_type != ParamType::Time,
    }
}

/// Parameter names must be plain identifiers in both dialects.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL Server batches receive their values as `@P1`, `@P2`, ...; a parameter
/// declared under one of those names would shadow a placeholder.
fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('p' | 'P'))
        && name.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

/// Validate a parameter list for `backend`, in declaration order.
///
/// Names are compared case-insensitively, as both backends do.
pub fn validate_parameters(backend: BackendKind, params: &[Parameter]) -> GatewayResult<()> {
    let mut seen = HashSet::with_capacity(params.len());
    for param in params {
        if !is_valid_name(&param.name)
            || (backend == BackendKind::SqlServer && is_placeholder_name(&param.name))
        {
            return Err(GatewayError::invalid_parameter_name(&param.name));
        }
        if !seen.insert(param.name.to_ascii_lowercase()) {
            return Err(GatewayError::duplicate_parameter(&param.name));
        }
        if !backend_supports(backend, param.param_type) {
            return Err(GatewayError::unsupported_parameter_type(
                backend,
                &param.name,
                param.param_type,
            ));
        }
        if param.direction.is_output()
            && param.param_type.is_variable_length()
            && param.size.is_none_or(|size| size == 0)
        {
            return Err(GatewayError::missing_output_size(
                &param.name,
                param.param_type,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("p_id"));
        assert!(is_valid_name("x_1"));
        assert!(!is_valid_name("_x1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("x;DROP"));
    }

    #[test]
    fn test_backend_type_support() {
        assert!(!backend_supports(BackendKind::SqlServer, ParamType::RefCursor));
        assert!(backend_supports(BackendKind::Oracle, ParamType::RefCursor));
        assert!(!backend_supports(BackendKind::Oracle, ParamType::Time));
        assert!(backend_supports(BackendKind::SqlServer, ParamType::Guid));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let params = vec![
            Parameter::input("id", ParamType::Int, 1),
            Parameter::input("ID", ParamType::Int, 2),
        ];
        let err = validate_parameters(BackendKind::SqlServer, &params).unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateParameter { name } if name == "ID"));
    }

    #[test]
    fn test_variable_length_output_needs_size() {
        let params = vec![Parameter::output("message", ParamType::NVarChar)];
        let err = validate_parameters(BackendKind::Oracle, &params).unwrap_err();
        assert!(matches!(err, GatewayError::MissingOutputSize { .. }));

        let params = vec![Parameter::output("message", ParamType::NVarChar).with_size(200)];
        assert!(validate_parameters(BackendKind::Oracle, &params).is_ok());
    }

    #[test]
    fn test_zero_output_size_counts_as_missing() {
        let params = vec![Parameter::output("msg", ParamType::VarChar).with_size(0)];
        for backend in [BackendKind::Oracle, BackendKind::SqlServer] {
            assert!(matches!(
                validate_parameters(backend, &params),
                Err(GatewayError::MissingOutputSize { .. })
            ));
        }
    }

    #[test]
    fn test_placeholder_names_rejected_on_sql_server() {
        for name in ["P1", "p2", "P10"] {
            let params = vec![Parameter::input(name, ParamType::Int, 1)];
            assert!(
                matches!(
                    validate_parameters(BackendKind::SqlServer, &params),
                    Err(GatewayError::InvalidParameterName { .. })
                ),
                "{name}"
            );
            assert!(validate_parameters(BackendKind::Oracle, &params).is_ok(), "{name}");
        }

        for name in ["P", "p_1", "P1a", "page1"] {
            let params = vec![Parameter::input(name, ParamType::Int, 1)];
            assert!(validate_parameters(BackendKind::SqlServer, &params).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_variable_length_input_needs_no_size() {
        let params = vec![Parameter::input("name", ParamType::VarChar, "x")];
        assert!(validate_parameters(BackendKind::SqlServer, &params).is_ok());
    }

    #[test]
    fn test_in_out_counts_as_output() {
        let params = vec![Parameter::in_out("code", ParamType::Char, "A")];
        assert!(matches!(
            validate_parameters(BackendKind::SqlServer, &params),
            Err(GatewayError::MissingOutputSize { .. })
        ));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let params = vec![Parameter::output("rows", ParamType::RefCursor)];
        assert!(matches!(
            validate_parameters(BackendKind::SqlServer, &params),
            Err(GatewayError::UnsupportedParameterType { .. })
        ));
        assert!(validate_parameters(BackendKind::Oracle, &params).is_ok());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let params = vec![Parameter::input("a-b", ParamType::Int, 1)];
        assert!(matches!(
            validate_parameters(BackendKind::Oracle, &params),
            Err(GatewayError::InvalidParameterName { .. })
        ));
    }
}
