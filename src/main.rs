//! sqlgate - Main entry point.
//!
//! Runs one statement or procedure call against SQL Server or Oracle and
//! prints the result as JSON.

use sqlgate::config::{self, Config, GatewayCommand, TargetArgs, TomlFileResolver};
use sqlgate::db::{CommandExecutor, ConnectionFactory, Session};
use sqlgate::models::CommandKind;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout carries only results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn session(target: &TargetArgs) -> Session<'static> {
    match &target.section {
        Some(section) => Session::section(target.backend, section),
        None => Session::open(target.backend),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    config::set_default_config_source(&config.config_source);
    let factory = ConnectionFactory::new(Arc::new(TomlFileResolver::new()));
    let executor = CommandExecutor::new(factory);

    match &config.command {
        GatewayCommand::Exec {
            target,
            sql,
            params,
        } => {
            executor.execute_non_query(session(target), sql, params)?;
            print_json(&serde_json::json!({ "status": "ok" }))
        }
        GatewayCommand::Call {
            target,
            procedure,
            params,
            outputs,
        } => {
            if *outputs {
                let values = executor.execute_with_output(session(target), procedure, params)?;
                print_json(&values)
            } else {
                executor.execute_procedure(session(target), procedure, params)?;
                print_json(&serde_json::json!({ "status": "ok" }))
            }
        }
        GatewayCommand::Query {
            target,
            text,
            procedure,
            params,
        } => {
            let kind = if *procedure {
                CommandKind::StoredProcedure
            } else {
                CommandKind::Text
            };
            let result = executor.query(session(target), kind, text, params)?;
            print_json(&result)
        }
        GatewayCommand::Describe { target } => {
            let resolved = executor.factory().resolve_target(
                target.backend,
                target.section.as_deref(),
                None,
            )?;
            println!("{}", resolved.masked_descriptor(target.backend));
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);
    info!(
        config = %config.config_source,
        "Starting sqlgate v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
