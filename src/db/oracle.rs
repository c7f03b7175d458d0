//! Oracle adapter over the `oracle` crate (ODPI-C).
//!
//! Statements bind by name natively (`:name`). Procedures are called through an
//! anonymous PL/SQL block with named association:
//!
//! ```text
//! BEGIN pkg.get_orders(p_customer => :p_customer, p_rows => :p_rows); END;
//! ```
//!
//! `REF CURSOR` output parameters become result tables, in declaration order.

use crate::db::driver::{Command, Connection, Driver};
use crate::error::{DriverError, DriverResult};
use crate::models::{
    BackendKind, CommandKind, ConnectionTarget, Direction, ParamType, Parameter, ResultTable,
    Value,
};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use oracle::sql_type::{OracleType, RefCursor, ToSql};
use oracle::{Row, Statement};
use tracing::debug;

impl From<oracle::Error> for DriverError {
    fn from(err: oracle::Error) -> Self {
        let code = err.db_error().map(|db| format!("ORA-{:05}", db.code()));
        let driver = DriverError::new(err.to_string());
        match code {
            Some(code) => driver.with_code(code).with_source(err),
            None => driver.with_source(err),
        }
    }
}

fn closed_error() -> DriverError {
    DriverError::new("Connection is closed")
}

/// Opens Oracle sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDriver;

impl OracleDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for OracleDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Oracle
    }

    fn open(&self, target: &ConnectionTarget) -> DriverResult<Box<dyn Connection>> {
        let locator = target.oracle_locator();
        debug!(locator = %locator, user = %target.user, "Connecting to Oracle");
        let conn = oracle::Connection::connect(&target.user, &target.password, &locator)?;
        Ok(Box::new(OracleConnection { conn: Some(conn) }))
    }
}

/// A live Oracle session.
pub struct OracleConnection {
    /// `None` once closed.
    conn: Option<oracle::Connection>,
}

impl std::fmt::Debug for OracleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConnection")
            .field("closed", &self.conn.is_none())
            .finish()
    }
}

impl Connection for OracleConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Oracle
    }

    fn create_command<'c>(
        &'c mut self,
        kind: CommandKind,
        text: &str,
    ) -> DriverResult<Box<dyn Command + 'c>> {
        let conn = self.conn.as_ref().ok_or_else(closed_error)?;
        if kind == CommandKind::StoredProcedure && !is_procedure_name(text) {
            return Err(DriverError::new(format!("Invalid procedure name: '{text}'")));
        }
        Ok(Box::new(OracleCommand {
            conn,
            kind,
            text: text.trim_end().to_string(),
            binds: IndexMap::new(),
            outputs: None,
        }))
    }

    fn close(&mut self) -> DriverResult<()> {
        let conn = self.conn.take().ok_or_else(closed_error)?;
        conn.close()?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

/// One statement or procedure call on an Oracle session.
struct OracleCommand<'c> {
    conn: &'c oracle::Connection,
    kind: CommandKind,
    text: String,
    /// Keyed by lowercased name; rebinding keeps the first position.
    binds: IndexMap<String, Parameter>,
    /// Output values by lowercased name, set by the last execution.
    outputs: Option<IndexMap<String, Value>>,
}

impl OracleCommand<'_> {
    fn prepare(&self) -> DriverResult<Statement> {
        let sql = match self.kind {
            CommandKind::Text => self.text.clone(),
            CommandKind::StoredProcedure => {
                let params: Vec<&Parameter> = self.binds.values().collect();
                procedure_block(&self.text, &params)
            }
        };
        let mut stmt = self.conn.statement(&sql).build()?;
        for param in self.binds.values() {
            bind_param(&mut stmt, param)?;
        }
        Ok(stmt)
    }

    fn capture_outputs(&mut self, stmt: &Statement) -> DriverResult<()> {
        let mut outputs = IndexMap::new();
        for param in self
            .binds
            .values()
            .filter(|p| p.direction.is_output() && p.param_type != ParamType::RefCursor)
        {
            outputs.insert(param.name.to_ascii_lowercase(), read_bound(stmt, param)?);
        }
        self.outputs = Some(outputs);
        Ok(())
    }
}

impl Command for OracleCommand<'_> {
    fn bind(&mut self, parameter: &Parameter) -> DriverResult<()> {
        self.binds
            .insert(parameter.name.to_ascii_lowercase(), parameter.clone());
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        let mut stmt = self.prepare()?;
        stmt.execute(&[])?;
        self.capture_outputs(&stmt)
    }

    fn fetch_tables(&mut self) -> DriverResult<Vec<ResultTable>> {
        let mut stmt = self.prepare()?;
        if stmt.is_query() {
            let rows = stmt.query(&[])?;
            let columns = rows
                .column_info()
                .iter()
                .map(|info| (info.name().to_string(), info.oracle_type().clone()))
                .collect();
            let table = collect_table(columns, rows)?;
            self.outputs = Some(IndexMap::new());
            return Ok(vec![table]);
        }

        stmt.execute(&[])?;
        let mut tables = Vec::new();
        for param in self
            .binds
            .values()
            .filter(|p| p.param_type == ParamType::RefCursor && p.direction.is_output())
        {
            let cursor: Option<RefCursor> = stmt.bind_value(param.name.as_str())?;
            let table = match cursor {
                Some(mut cursor) => {
                    let rows = cursor.query()?;
                    let columns = rows
                        .column_info()
                        .iter()
                        .map(|info| (info.name().to_string(), info.oracle_type().clone()))
                        .collect();
                    collect_table(columns, rows)?
                }
                None => ResultTable::default(),
            };
            tables.push(table);
        }
        self.capture_outputs(&stmt)?;
        Ok(tables)
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

fn is_procedure_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|part| {
                let mut chars = part.chars();
                matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'))
            })
}

/// Anonymous block calling `procedure` with named association.
fn procedure_block(procedure: &str, params: &[&Parameter]) -> String {
    if params.is_empty() {
        return format!("BEGIN {procedure}; END;");
    }
    let args: Vec<String> = params
        .iter()
        .map(|p| format!("{0} => :{0}", p.name))
        .collect();
    format!("BEGIN {procedure}({}); END;", args.join(", "))
}

/// Native type used for typed nulls and output buffers.
fn oracle_type(param: &Parameter) -> DriverResult<OracleType> {
    let size = param.size.unwrap_or(4000);
    let ty = match param.param_type {
        ParamType::Bit => OracleType::Number(1, 0),
        ParamType::TinyInt | ParamType::SmallInt | ParamType::Int | ParamType::BigInt => {
            OracleType::Int64
        }
        ParamType::Real => OracleType::BinaryFloat,
        ParamType::Float => OracleType::BinaryDouble,
        ParamType::Decimal => OracleType::Number(0, -127),
        ParamType::Char => OracleType::Char(size),
        ParamType::NChar => OracleType::NChar(size),
        ParamType::VarChar => OracleType::Varchar2(size),
        ParamType::NVarChar => OracleType::NVarchar2(size),
        ParamType::Text => OracleType::CLOB,
        ParamType::NText => OracleType::NCLOB,
        ParamType::Binary | ParamType::VarBinary => OracleType::Raw(param.size.unwrap_or(2000)),
        ParamType::Blob => OracleType::BLOB,
        ParamType::Date => OracleType::Date,
        ParamType::DateTime => OracleType::Timestamp(9),
        ParamType::Guid => OracleType::Raw(16),
        ParamType::RefCursor => OracleType::RefCursor,
        ParamType::Time => {
            return Err(DriverError::new(format!(
                "'{}': Oracle has no TIME type",
                param.name
            )));
        }
    };
    Ok(ty)
}

fn bind_typed<T: ToSql>(
    stmt: &mut Statement,
    param: &Parameter,
    value: &T,
    ty: &OracleType,
) -> oracle::Result<()> {
    let name = param.name.as_str();
    if param.direction == Direction::InOut {
        stmt.bind(name, &(value, ty))
    } else {
        stmt.bind(name, value)
    }
}

fn bind_param(stmt: &mut Statement, param: &Parameter) -> DriverResult<()> {
    let ty = oracle_type(param)?;
    match param.bound_value() {
        // Typed null, also the output buffer for Out parameters.
        Value::Null => stmt.bind(param.name.as_str(), &ty)?,
        Value::Bool(v) => bind_typed(stmt, param, &i64::from(*v), &ty)?,
        Value::Int(v) => bind_typed(stmt, param, v, &ty)?,
        Value::Float(v) => bind_typed(stmt, param, v, &ty)?,
        Value::Decimal(v) => bind_typed(stmt, param, v, &OracleType::Number(0, -127))?,
        Value::String(v) => bind_typed(stmt, param, v, &ty)?,
        Value::Bytes(v) => bind_typed(stmt, param, v, &ty)?,
        Value::Date(v) => bind_typed(stmt, param, v, &ty)?,
        Value::DateTime(v) => bind_typed(stmt, param, v, &ty)?,
        Value::Uuid(v) => bind_typed(stmt, param, &v.as_bytes().to_vec(), &ty)?,
        Value::Time(_) => {
            return Err(DriverError::new(format!(
                "'{}': Oracle has no TIME type",
                param.name
            )));
        }
    }
    Ok(())
}

/// Value of an output parameter after execution.
fn read_bound(stmt: &Statement, param: &Parameter) -> DriverResult<Value> {
    let name = param.name.as_str();
    let value = match param.param_type {
        ParamType::Bit => stmt
            .bind_value::<_, Option<i64>>(name)?
            .map(|v| Value::Bool(v != 0))
            .unwrap_or(Value::Null),
        ParamType::TinyInt | ParamType::SmallInt | ParamType::Int | ParamType::BigInt => {
            stmt.bind_value::<_, Option<i64>>(name)?.into()
        }
        ParamType::Real | ParamType::Float => stmt.bind_value::<_, Option<f64>>(name)?.into(),
        ParamType::Decimal => stmt
            .bind_value::<_, Option<String>>(name)?
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        ParamType::Char
        | ParamType::NChar
        | ParamType::VarChar
        | ParamType::NVarChar
        | ParamType::Text
        | ParamType::NText => stmt.bind_value::<_, Option<String>>(name)?.into(),
        ParamType::Binary | ParamType::VarBinary | ParamType::Blob => {
            stmt.bind_value::<_, Option<Vec<u8>>>(name)?.into()
        }
        ParamType::Guid => match stmt.bind_value::<_, Option<Vec<u8>>>(name)? {
            Some(bytes) => uuid::Uuid::from_slice(&bytes)
                .map(Value::Uuid)
                .unwrap_or(Value::Bytes(bytes)),
            None => Value::Null,
        },
        ParamType::Date => stmt
            .bind_value::<_, Option<NaiveDateTime>>(name)?
            .map(|dt| Value::Date(dt.date()))
            .unwrap_or(Value::Null),
        ParamType::DateTime => stmt.bind_value::<_, Option<NaiveDateTime>>(name)?.into(),
        ParamType::Time | ParamType::RefCursor => Value::Null,
    };
    Ok(value)
}

fn collect_table<I>(columns: Vec<(String, OracleType)>, rows: I) -> DriverResult<ResultTable>
where
    I: Iterator<Item = oracle::Result<Row>>,
{
    let mut table = ResultTable::new(columns.iter().map(|(name, _)| name.as_str()));
    for row in rows {
        let row = row?;
        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, (_, ty))| column_value(&row, idx, ty))
            .collect::<DriverResult<Vec<_>>>()?;
        table.push_row(values);
    }
    Ok(table)
}

fn column_value(row: &Row, idx: usize, ty: &OracleType) -> DriverResult<Value> {
    let value = match ty {
        OracleType::Number(_, _) | OracleType::Float(_) => {
            match row.get::<_, Option<String>>(idx)? {
                Some(text) => number_value(text),
                None => Value::Null,
            }
        }
        OracleType::Int64 => row.get::<_, Option<i64>>(idx)?.into(),
        OracleType::BinaryFloat | OracleType::BinaryDouble => {
            row.get::<_, Option<f64>>(idx)?.into()
        }
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => row.get::<_, Option<NaiveDateTime>>(idx)?.into(),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
            row.get::<_, Option<Vec<u8>>>(idx)?.into()
        }
        OracleType::Boolean => row.get::<_, Option<bool>>(idx)?.into(),
        _ => row.get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

/// Integral numbers that fit become `Int`; everything else keeps its exact text.
fn number_value(text: String) -> Value {
    match text.parse::<i64>() {
        Ok(v) => Value::Int(v),
        Err(_) => Value::Decimal(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_block_named_association() {
        let customer = Parameter::input("p_customer", ParamType::Int, 7);
        let rows = Parameter::output("p_rows", ParamType::RefCursor);
        assert_eq!(
            procedure_block("pkg.get_orders", &[&customer, &rows]),
            "BEGIN pkg.get_orders(p_customer => :p_customer, p_rows => :p_rows); END;"
        );
        assert_eq!(procedure_block("refresh_all", &[]), "BEGIN refresh_all; END;");
    }

    #[test]
    fn test_procedure_names() {
        assert!(is_procedure_name("pkg.proc"));
        assert!(is_procedure_name("schema.pkg.proc$1"));
        assert!(!is_procedure_name("proc; drop"));
        assert!(!is_procedure_name("pkg..proc"));
        assert!(!is_procedure_name(""));
    }

    #[test]
    fn test_oracle_types() {
        let p = Parameter::output("msg", ParamType::NVarChar).with_size(200);
        assert_eq!(oracle_type(&p).unwrap(), OracleType::NVarchar2(200));
        let p = Parameter::output("n", ParamType::BigInt);
        assert_eq!(oracle_type(&p).unwrap(), OracleType::Int64);
        let p = Parameter::output("c", ParamType::RefCursor);
        assert_eq!(oracle_type(&p).unwrap(), OracleType::RefCursor);
        let p = Parameter::input("t", ParamType::Time, Value::Null);
        assert!(oracle_type(&p).is_err());
    }

    #[test]
    fn test_number_values() {
        assert_eq!(number_value("42".to_string()), Value::Int(42));
        assert_eq!(number_value("-7".to_string()), Value::Int(-7));
        assert_eq!(
            number_value("3.14".to_string()),
            Value::Decimal("3.14".to_string())
        );
        assert_eq!(
            number_value("123456789012345678901234".to_string()),
            Value::Decimal("123456789012345678901234".to_string())
        );
    }
}
