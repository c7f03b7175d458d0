//! Integration tests against a live Oracle database.
//!
//! Set TEST_ORACLE_HOST, TEST_ORACLE_SERVICE, TEST_ORACLE_USER and
//! TEST_ORACLE_PASSWORD (optionally TEST_ORACLE_PORT) to run them.

#![cfg(feature = "oracle")]

use sqlgate::config::MemoryResolver;
use sqlgate::db::{CommandExecutor, ConnectionFactory, Session};
use sqlgate::error::GatewayError;
use sqlgate::models::{BackendKind, CommandKind, ParamType, Parameter, Value};
use std::sync::Arc;

fn live_executor() -> Option<CommandExecutor> {
    let var = |name: &str| std::env::var(name).ok();
    let host = match var("TEST_ORACLE_HOST") {
        Some(host) => host,
        None => {
            eprintln!("Skipping test: TEST_ORACLE_HOST not set");
            return None;
        }
    };

    // Oracle calls default to the OracleConnection section.
    let mut resolver = MemoryResolver::new();
    resolver
        .set("OracleConnection", "DBIP", host)
        .set("OracleConnection", "DBName", var("TEST_ORACLE_SERVICE").unwrap_or_else(|| "FREEPDB1".into()))
        .set("OracleConnection", "UID", var("TEST_ORACLE_USER").unwrap_or_else(|| "system".into()))
        .set("OracleConnection", "PWD", var("TEST_ORACLE_PASSWORD").unwrap_or_default());
    if let Some(port) = var("TEST_ORACLE_PORT") {
        resolver.set("OracleConnection", "Port", port);
    }
    Some(CommandExecutor::new(ConnectionFactory::new(Arc::new(resolver))))
}

#[test]
fn test_oracle_query_with_named_binds() {
    let Some(executor) = live_executor() else {
        return;
    };

    let result = executor
        .query(
            Session::open(BackendKind::Oracle),
            CommandKind::Text,
            "SELECT :a + :b AS total, :name AS name FROM dual",
            &[
                Parameter::input("name", ParamType::VarChar, "abc"),
                Parameter::input("b", ParamType::Int, 2),
                Parameter::input("a", ParamType::Int, 40),
            ],
        )
        .unwrap();

    let table = result.first().unwrap();
    assert_eq!(table.rows[0]["TOTAL"], Value::Int(42));
    assert_eq!(table.rows[0]["NAME"], Value::String("abc".to_string()));
}

#[test]
fn test_oracle_procedure_outputs_and_cursor() {
    let Some(executor) = live_executor() else {
        return;
    };

    executor
        .execute_non_query(
            Session::open(BackendKind::Oracle),
            "CREATE OR REPLACE PROCEDURE sqlgate_echo(p_input IN NUMBER, p_doubled OUT NUMBER, p_label OUT VARCHAR2, p_rows OUT SYS_REFCURSOR) AS BEGIN p_doubled := p_input * 2; p_label := 'done'; OPEN p_rows FOR SELECT LEVEL AS n FROM dual CONNECT BY LEVEL <= 3; END;",
            &[],
        )
        .unwrap();

    let params = vec![
        Parameter::input("p_input", ParamType::Int, 21),
        Parameter::output("p_doubled", ParamType::Decimal),
        Parameter::output("p_label", ParamType::VarChar).with_size(20),
        Parameter::output("p_rows", ParamType::RefCursor),
    ];

    let outputs = executor
        .execute_with_output(Session::open(BackendKind::Oracle), "sqlgate_echo", &params)
        .unwrap();
    assert_eq!(outputs["p_doubled"], Value::Decimal("42".to_string()));
    assert_eq!(outputs["p_label"], Value::String("done".to_string()));
    assert!(!outputs.contains_key("p_rows"));

    let result = executor
        .query(
            Session::open(BackendKind::Oracle),
            CommandKind::StoredProcedure,
            "sqlgate_echo",
            &params,
        )
        .unwrap();
    assert_eq!(result.row_counts(), vec![3]);

    executor
        .execute_non_query(
            Session::open(BackendKind::Oracle),
            "DROP PROCEDURE sqlgate_echo",
            &[],
        )
        .unwrap();
}

#[test]
fn test_oracle_missing_table_is_execution_failed() {
    let Some(executor) = live_executor() else {
        return;
    };

    let err = executor
        .execute_non_query(
            Session::open(BackendKind::Oracle),
            "DELETE FROM sqlgate_no_such_table",
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, GatewayError::ExecutionFailed { .. }));
    assert_eq!(err.driver_code(), Some("ORA-00942"));
}
