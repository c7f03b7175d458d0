//! SQL Server adapter over `tiberius`.
//!
//! tiberius is async and binds positionally (`@P1`, `@P2`, ...). Each
//! connection owns a current-thread runtime and blocks on it, and each command
//! is compiled into a batch that declares one T-SQL variable per bound
//! parameter, so statements and procedure calls refer to parameters by name:
//!
//! ```text
//! DECLARE @id INT = @P1;
//! DECLARE @total DECIMAL(38, 10) = @P2;
//! EXEC dbo.get_total @id = @id, @total = @total OUTPUT;
//! SELECT @total AS [total];
//! ```
//!
//! The trailing `SELECT` is added only when output parameters are bound; its
//! single row becomes the command's output values.

use crate::db::driver::{Command, Connection, Driver};
use crate::error::{DriverError, DriverResult};
use crate::models::{
    BackendKind, CommandKind, ConnectionTarget, ParamType, Parameter, ResultTable, Value,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use indexmap::IndexMap;
use std::borrow::Cow;
use tiberius::{Client, ColumnData, Config, FromSql, QueryItem, ToSql};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

impl From<tiberius::error::Error> for DriverError {
    fn from(err: tiberius::error::Error) -> Self {
        let code = match &err {
            tiberius::error::Error::Server(token) => {
                Some((token.code().to_string(), token.message().to_string()))
            }
            _ => None,
        };
        match code {
            Some((code, message)) => DriverError::new(message).with_code(code).with_source(err),
            None => DriverError::new(err.to_string()).with_source(err),
        }
    }
}

fn closed_error() -> DriverError {
    DriverError::new("Connection is closed")
}

/// Opens SQL Server sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDriver;

impl SqlServerDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for SqlServerDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::SqlServer
    }

    fn open(&self, target: &ConnectionTarget) -> DriverResult<Box<dyn Connection>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::new(format!("Failed to start I/O runtime: {e}")).with_source(e))?;

        let config = Config::from_ado_string(&target.sql_server_descriptor())?;
        let addr = config.get_addr();
        debug!(addr = %addr, database = %target.database, "Connecting to SQL Server");

        let client = runtime.block_on(async {
            let tcp = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                DriverError::new(format!("Could not reach {addr}: {e}")).with_source(e)
            })?;
            tcp.set_nodelay(true)
                .map_err(|e| DriverError::new(e.to_string()).with_source(e))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(DriverError::from)
        })?;

        Ok(Box::new(SqlServerConnection {
            runtime,
            client: Some(client),
        }))
    }
}

/// A live SQL Server session.
pub struct SqlServerConnection {
    runtime: Runtime,
    /// `None` once closed.
    client: Option<TdsClient>,
}

impl std::fmt::Debug for SqlServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerConnection")
            .field("closed", &self.client.is_none())
            .finish()
    }
}

impl Connection for SqlServerConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::SqlServer
    }

    fn create_command<'c>(
        &'c mut self,
        kind: CommandKind,
        text: &str,
    ) -> DriverResult<Box<dyn Command + 'c>> {
        if self.client.is_none() {
            return Err(closed_error());
        }
        if kind == CommandKind::StoredProcedure {
            check_procedure_name(text)?;
        }
        Ok(Box::new(SqlServerCommand {
            connection: self,
            kind,
            text: text.to_string(),
            binds: IndexMap::new(),
            outputs: None,
        }))
    }

    fn close(&mut self) -> DriverResult<()> {
        let client = self.client.take().ok_or_else(closed_error)?;
        self.runtime.block_on(client.close())?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

/// One batch on a SQL Server session.
struct SqlServerCommand<'c> {
    connection: &'c mut SqlServerConnection,
    kind: CommandKind,
    text: String,
    /// Keyed by lowercased name; rebinding keeps the first position.
    binds: IndexMap<String, Parameter>,
    /// Output values by lowercased name, set by the last execution.
    outputs: Option<IndexMap<String, Value>>,
}

impl SqlServerCommand<'_> {
    fn run(&mut self) -> DriverResult<Vec<ResultTable>> {
        let params: Vec<&Parameter> = self.binds.values().collect();
        let batch = build_batch(self.kind, &self.text, &params)?;
        let values: Vec<TdsParam> = params
            .iter()
            .map(|p| TdsParam::new(p.param_type, p.bound_value()))
            .collect();
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let SqlServerConnection { runtime, client } = &mut *self.connection;
        let client = client.as_mut().ok_or_else(closed_error)?;
        let tables = runtime.block_on(collect_tables(client, &batch, &refs))?;

        let output_names: Vec<&str> = params
            .iter()
            .filter(|p| p.direction.is_output())
            .map(|p| p.name.as_str())
            .collect();
        let (tables, outputs) = split_outputs(tables, &output_names)?;
        self.outputs = Some(outputs);
        Ok(tables)
    }
}

/// Separate the row selected back by the batch's trailing `SELECT` from the
/// command's own result tables.
///
/// The last table must have exactly one row and one column per output name,
/// in order. Anything else means the batch stopped before reading the outputs.
fn split_outputs(
    mut tables: Vec<ResultTable>,
    names: &[&str],
) -> DriverResult<(Vec<ResultTable>, IndexMap<String, Value>)> {
    if names.is_empty() {
        return Ok((tables, IndexMap::new()));
    }

    let selected_back = tables.last().is_some_and(|table| {
        table.rows.len() == 1
            && table.columns.len() == names.len()
            && table
                .columns
                .iter()
                .zip(names)
                .all(|(column, name)| column.eq_ignore_ascii_case(name))
    });
    let row = match tables.pop() {
        Some(table) if selected_back => table.rows.into_iter().next(),
        _ => None,
    }
    .ok_or_else(|| {
        DriverError::new("Output parameter values were not returned; the batch ended early")
    })?;

    let outputs = names
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .zip(row.into_values())
        .collect();
    Ok((tables, outputs))
}

impl Command for SqlServerCommand<'_> {
    fn bind(&mut self, parameter: &Parameter) -> DriverResult<()> {
        self.binds
            .insert(parameter.name.to_ascii_lowercase(), parameter.clone());
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        self.run().map(|_| ())
    }

    fn fetch_tables(&mut self) -> DriverResult<Vec<ResultTable>> {
        self.run()
    }

    fn read_output(&mut self, name: &str) -> DriverResult<Value> {
        let outputs = self
            .outputs
            .as_ref()
            .ok_or_else(|| DriverError::new("Command has not been executed"))?;
        outputs
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DriverError::new(format!("'{name}' is not an output parameter")))
    }

    fn close(&mut self) -> DriverResult<()> {
        self.binds.clear();
        self.outputs = None;
        Ok(())
    }
}

async fn collect_tables(
    client: &mut TdsClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> DriverResult<Vec<ResultTable>> {
    let mut stream = client.query(sql, params).await?;
    let mut tables: Vec<ResultTable> = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                tables.push(ResultTable::new(meta.columns().iter().map(|c| c.name())));
            }
            QueryItem::Row(row) => {
                let values = row
                    .into_iter()
                    .map(column_value)
                    .collect::<DriverResult<Vec<_>>>()?;
                match tables.last_mut() {
                    Some(table) => table.push_row(values),
                    None => return Err(DriverError::new("Row received before column metadata")),
                }
            }
        }
    }
    Ok(tables)
}

/// Procedure names may be schema- or database-qualified and bracket-quoted.
fn check_procedure_name(name: &str) -> DriverResult<()> {
    let valid = !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '$' | '#' | '@'));
    if valid {
        Ok(())
    } else {
        Err(DriverError::new(format!("Invalid procedure name: '{name}'")))
    }
}

/// Build the batch sent for one command.
fn build_batch(kind: CommandKind, text: &str, params: &[&Parameter]) -> DriverResult<String> {
    let mut batch = String::new();
    for (idx, param) in params.iter().enumerate() {
        batch.push_str(&format!(
            "DECLARE @{} {} = @P{};\n",
            param.name,
            tsql_type(param)?,
            idx + 1
        ));
    }

    match kind {
        CommandKind::Text => batch.push_str(text),
        CommandKind::StoredProcedure => {
            let args: Vec<String> = params
                .iter()
                .map(|p| {
                    if p.direction.is_output() {
                        format!("@{0} = @{0} OUTPUT", p.name)
                    } else {
                        format!("@{0} = @{0}", p.name)
                    }
                })
                .collect();
            batch.push_str("EXEC ");
            batch.push_str(text);
            if !args.is_empty() {
                batch.push(' ');
                batch.push_str(&args.join(", "));
            }
            batch.push(';');
        }
    }

    let outputs: Vec<String> = params
        .iter()
        .filter(|p| p.direction.is_output())
        .map(|p| format!("@{0} AS [{0}]", p.name))
        .collect();
    if !outputs.is_empty() {
        batch.push_str("\nSELECT ");
        batch.push_str(&outputs.join(", "));
        batch.push(';');
    }
    Ok(batch)
}

/// T-SQL type used to declare `param`.
fn tsql_type(param: &Parameter) -> DriverResult<String> {
    let bounded = |name: &str, max: u32| match param.size {
        Some(n) if n > 0 && n <= max => Some(format!("{name}({n})")),
        _ => None,
    };
    let max = |name: &str| format!("{name}(MAX)");

    let ty = match param.param_type {
        ParamType::Bit => "BIT".to_string(),
        ParamType::TinyInt => "TINYINT".to_string(),
        ParamType::SmallInt => "SMALLINT".to_string(),
        ParamType::Int => "INT".to_string(),
        ParamType::BigInt => "BIGINT".to_string(),
        ParamType::Real => "REAL".to_string(),
        ParamType::Float => "FLOAT".to_string(),
        ParamType::Decimal => "DECIMAL(38, 10)".to_string(),
        ParamType::Char => bounded("CHAR", 8000).unwrap_or_else(|| max("VARCHAR")),
        ParamType::NChar => bounded("NCHAR", 4000).unwrap_or_else(|| max("NVARCHAR")),
        ParamType::VarChar => bounded("VARCHAR", 8000).unwrap_or_else(|| max("VARCHAR")),
        ParamType::NVarChar => bounded("NVARCHAR", 4000).unwrap_or_else(|| max("NVARCHAR")),
        ParamType::Text => max("VARCHAR"),
        ParamType::NText => max("NVARCHAR"),
        ParamType::Binary => bounded("BINARY", 8000).unwrap_or_else(|| max("VARBINARY")),
        ParamType::VarBinary => bounded("VARBINARY", 8000).unwrap_or_else(|| max("VARBINARY")),
        ParamType::Blob => max("VARBINARY"),
        ParamType::Date => "DATE".to_string(),
        ParamType::DateTime => "DATETIME2".to_string(),
        ParamType::Time => "TIME".to_string(),
        ParamType::Guid => "UNIQUEIDENTIFIER".to_string(),
        ParamType::RefCursor => {
            return Err(DriverError::new(format!(
                "'{}': SQL Server has no cursor parameters",
                param.name
            )));
        }
    };
    Ok(ty)
}

/// Owned value sent for one `@Pn` placeholder.
#[derive(Debug)]
enum TdsParam {
    Null(ParamType),
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
}

impl TdsParam {
    fn new(param_type: ParamType, value: &Value) -> Self {
        match value {
            Value::Null => Self::Null(param_type),
            Value::Bool(v) => Self::Bool(*v),
            Value::Int(v) => Self::I64(*v),
            Value::Float(v) => Self::F64(*v),
            // The declared DECIMAL variable converts exactly from text.
            Value::Decimal(v) | Value::String(v) => Self::String(v.clone()),
            Value::Bytes(v) => Self::Bytes(v.clone()),
            Value::Date(v) => Self::Date(*v),
            Value::DateTime(v) => Self::DateTime(*v),
            Value::Time(v) => Self::Time(*v),
            Value::Uuid(v) => Self::Uuid(*v),
        }
    }
}

impl ToSql for TdsParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Self::Null(param_type) => typed_null(*param_type),
            Self::Bool(v) => ColumnData::Bit(Some(*v)),
            Self::I64(v) => ColumnData::I64(Some(*v)),
            Self::F64(v) => ColumnData::F64(Some(*v)),
            Self::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            Self::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            Self::Date(v) => v.to_sql(),
            Self::DateTime(v) => v.to_sql(),
            Self::Time(v) => v.to_sql(),
            Self::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

fn typed_null(param_type: ParamType) -> ColumnData<'static> {
    match param_type {
        ParamType::Bit => ColumnData::Bit(None),
        ParamType::TinyInt => ColumnData::U8(None),
        ParamType::SmallInt => ColumnData::I16(None),
        ParamType::Int => ColumnData::I32(None),
        ParamType::BigInt => ColumnData::I64(None),
        ParamType::Real => ColumnData::F32(None),
        ParamType::Float => ColumnData::F64(None),
        ParamType::Binary | ParamType::VarBinary | ParamType::Blob => ColumnData::Binary(None),
        ParamType::Date => ColumnData::Date(None),
        ParamType::DateTime => ColumnData::DateTime2(None),
        ParamType::Time => ColumnData::Time(None),
        ParamType::Guid => ColumnData::Guid(None),
        ParamType::Decimal
        | ParamType::Char
        | ParamType::NChar
        | ParamType::VarChar
        | ParamType::NVarChar
        | ParamType::Text
        | ParamType::NText
        | ParamType::RefCursor => ColumnData::String(None),
    }
}

fn column_value(data: ColumnData<'static>) -> DriverResult<Value> {
    let value = match data {
        ColumnData::Bit(v) => v.into(),
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::String(v) => v.map(Cow::into_owned).into(),
        ColumnData::Guid(v) => v.into(),
        ColumnData::Binary(v) => v.map(Cow::into_owned).into(),
        ColumnData::Numeric(v) => v
            .map(|n| Value::Decimal(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null),
        ref data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => NaiveDateTime::from_sql(data)?.into(),
        ref data @ ColumnData::Date(_) => NaiveDate::from_sql(data)?.into(),
        ref data @ ColumnData::Time(_) => NaiveTime::from_sql(data)?
            .map(Value::Time)
            .unwrap_or(Value::Null),
        ref data @ ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)?
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .unwrap_or(Value::Null),
    };
    Ok(value)
}
