//! Command-related data models.
//!
//! This module defines parameter descriptors, the typed value model shared by
//! parameters and result cells, and the shapes results come back in.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

/// Data-flow direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    /// Value is sent to the backend before execution.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Value is read back after execution.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "input" => Ok(Self::In),
            "out" | "output" => Ok(Self::Out),
            "inout" | "in_out" | "in-out" | "inputoutput" => Ok(Self::InOut),
            other => Err(format!("Unknown parameter direction: {other}")),
        }
    }
}

/// Type tag of a bound parameter.
///
/// Covers the native type families of both backends; each driver adapter maps
/// a tag onto its own type system and rejects the tags it can't express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Char,
    NChar,
    VarChar,
    NVarChar,
    /// NVARCHAR(MAX) / CLOB
    Text,
    /// NCLOB
    NText,
    Binary,
    /// VARBINARY / RAW
    VarBinary,
    /// VARBINARY(MAX) / BLOB
    Blob,
    Date,
    /// DATETIME2 / TIMESTAMP
    DateTime,
    Time,
    /// UNIQUEIDENTIFIER
    Guid,
    /// Oracle SYS_REFCURSOR
    RefCursor,
}

impl ParamType {
    /// Variable-length types need a declared capacity when used for output.
    pub fn is_variable_length(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::NChar
                | Self::VarChar
                | Self::NVarChar
                | Self::Binary
                | Self::VarBinary
        )
    }

    /// SQL spelling used in messages.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Bit => "BIT",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Float => "FLOAT",
            Self::Decimal => "DECIMAL",
            Self::Char => "CHAR",
            Self::NChar => "NCHAR",
            Self::VarChar => "VARCHAR",
            Self::NVarChar => "NVARCHAR",
            Self::Text => "TEXT",
            Self::NText => "NTEXT",
            Self::Binary => "BINARY",
            Self::VarBinary => "VARBINARY",
            Self::Blob => "BLOB",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Guid => "GUID",
            Self::RefCursor => "REFCURSOR",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sql_name())
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Self::Bit,
            "tinyint" => Self::TinyInt,
            "smallint" | "int16" => Self::SmallInt,
            "int" | "integer" | "int32" => Self::Int,
            "bigint" | "int64" | "long" => Self::BigInt,
            "real" | "binary_float" => Self::Real,
            "float" | "double" | "binary_double" => Self::Float,
            "decimal" | "numeric" | "number" | "money" => Self::Decimal,
            "char" => Self::Char,
            "nchar" => Self::NChar,
            "varchar" | "varchar2" => Self::VarChar,
            "nvarchar" | "nvarchar2" => Self::NVarChar,
            "text" | "clob" => Self::Text,
            "ntext" | "nclob" => Self::NText,
            "binary" => Self::Binary,
            "varbinary" | "raw" => Self::VarBinary,
            "blob" | "image" => Self::Blob,
            "date" => Self::Date,
            "datetime" | "datetime2" | "timestamp" | "smalldatetime" => Self::DateTime,
            "time" => Self::Time,
            "guid" | "uuid" | "uniqueidentifier" => Self::Guid,
            "refcursor" | "ref_cursor" | "sys_refcursor" | "cursor" => Self::RefCursor,
            other => return Err(format!("Unknown parameter type: {other}")),
        };
        Ok(ty)
    }
}

/// A typed value bound to a parameter or read from a result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    /// Exact numeric kept as its decimal text
    Decimal(String),
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Uuid(Uuid),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
            Self::Uuid(_) => "uuid",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Decimal(v) => Some(v),
            _ => None,
        }
    }

    /// Parse a textual value as the given parameter type.
    ///
    /// The literal `null` (any case) parses to [`Value::Null`]. Binary types
    /// expect base64 input.
    pub fn parse_as(param_type: ParamType, text: &str) -> Result<Self, String> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        if text.eq_ignore_ascii_case("null") {
            return Ok(Self::Null);
        }
        let invalid = |e: &dyn std::fmt::Display| format!("Invalid {param_type} value '{text}': {e}");

        match param_type {
            ParamType::Bit => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(Self::Bool(true)),
                "0" | "false" | "no" => Ok(Self::Bool(false)),
                _ => Err(invalid(&"expected true/false")),
            },
            ParamType::TinyInt | ParamType::SmallInt | ParamType::Int | ParamType::BigInt => {
                text.parse::<i64>().map(Self::Int).map_err(|e| invalid(&e))
            }
            ParamType::Real | ParamType::Float => {
                text.parse::<f64>().map(Self::Float).map_err(|e| invalid(&e))
            }
            ParamType::Decimal if is_decimal_literal(text) => Ok(Self::Decimal(text.to_string())),
            ParamType::Decimal => Err(invalid(&"expected [+-]digits[.digits]")),
            ParamType::Binary | ParamType::VarBinary | ParamType::Blob => STANDARD
                .decode(text)
                .map(Self::Bytes)
                .map_err(|e| invalid(&e)),
            ParamType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|e| invalid(&e)),
            ParamType::DateTime => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .map(Self::DateTime)
                .map_err(|e| invalid(&e)),
            ParamType::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .map(Self::Time)
                .map_err(|e| invalid(&e)),
            ParamType::Guid => Uuid::parse_str(text).map(Self::Uuid).map_err(|e| invalid(&e)),
            ParamType::RefCursor => Err(invalid(&"cursors can't be given as input")),
            ParamType::Char
            | ParamType::NChar
            | ParamType::VarChar
            | ParamType::NVarChar
            | ParamType::Text
            | ParamType::NText => Ok(Self::String(text.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// Backend-neutral description of one bound value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub direction: Direction,
    pub param_type: ParamType,
    /// Bare name, without a leading `@` or `:`.
    pub name: String,
    /// Ignored for `Out` parameters.
    pub value: Value,
    /// Maximum size of variable-length output values.
    pub size: Option<u32>,
}

impl Parameter {
    /// Create a parameter. A leading `@` or `:` on the name is dropped.
    pub fn new(
        direction: Direction,
        param_type: ParamType,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let name = name.into();
        Self {
            direction,
            param_type,
            name: name.trim_start_matches(['@', ':']).to_string(),
            value: value.into(),
            size: None,
        }
    }

    /// Create an input parameter.
    pub fn input(name: impl Into<String>, param_type: ParamType, value: impl Into<Value>) -> Self {
        Self::new(Direction::In, param_type, name, value)
    }

    /// Create an output parameter.
    pub fn output(name: impl Into<String>, param_type: ParamType) -> Self {
        Self::new(Direction::Out, param_type, name, Value::Null)
    }

    /// Create an input/output parameter.
    pub fn in_out(name: impl Into<String>, param_type: ParamType, value: impl Into<Value>) -> Self {
        Self::new(Direction::InOut, param_type, name, value)
    }

    /// Set the maximum size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Value to send before execution; `Out` parameters always send null.
    pub fn bound_value(&self) -> &Value {
        if self.direction.is_input() {
            &self.value
        } else {
            &Value::Null
        }
    }
}

impl FromStr for Parameter {
    type Err = String;

    /// Parse `direction:type[(size)]:name[=value]`, e.g. `in:int:id=42` or
    /// `out:nvarchar(100):message`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(direction), Some(type_spec), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!(
                "Invalid parameter '{s}': expected direction:type[(size)]:name[=value]"
            ));
        };

        let direction: Direction = direction.parse()?;
        let (type_name, size) = match type_spec.split_once('(') {
            Some((ty, size)) => {
                let size = size
                    .strip_suffix(')')
                    .ok_or_else(|| format!("Invalid parameter size in '{type_spec}'"))?;
                let size = size
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| format!("Invalid parameter size in '{type_spec}': {e}"))?;
                (ty, Some(size))
            }
            None => (type_spec, None),
        };
        let param_type: ParamType = type_name.parse()?;

        let (name, value) = match rest.split_once('=') {
            Some((name, text)) => (name, Value::parse_as(param_type, text)?),
            None => (rest, Value::Null),
        };
        if name.trim().is_empty() {
            return Err(format!("Invalid parameter '{s}': name is empty"));
        }

        let mut param = Parameter::new(direction, param_type, name.trim(), value);
        param.size = size;
        Ok(param)
    }
}

/// What the command text names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Raw SQL statement or batch
    Text,
    /// Name of a stored procedure
    StoredProcedure,
}

/// One row: column name to value, in column order.
/// `[+-]digits[.digits]`; one side of the point may be empty, not both.
fn is_decimal_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    !(whole.is_empty() && fraction.is_empty()) && digits(whole) && digits(fraction)
}

pub type Row = IndexMap<String, Value>;

/// One result table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultTable {
    /// Create an empty table with the given column names.
    ///
    /// Unnamed columns become `Column<n>` (1-based position) and repeated names
    /// get a numeric suffix, so every column stays addressable by name.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for (idx, column) in columns.into_iter().enumerate() {
            let column = column.into();
            let base = if column.is_empty() {
                format!("Column{}", idx + 1)
            } else {
                column
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                name = format!("{base}{suffix}");
                suffix += 1;
            }
            names.push(name);
        }
        Self {
            columns: names,
            rows: Vec::new(),
        }
    }

    /// Append a row given values in column order. Missing trailing values
    /// become null.
    pub fn push_row(&mut self, values: Vec<Value>) {
        let mut values = values.into_iter();
        let row = self
            .columns
            .iter()
            .map(|name| (name.clone(), values.next().unwrap_or(Value::Null)))
            .collect();
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ordered result tables of one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabularResult {
    pub tables: Vec<ResultTable>,
}

impl TabularResult {
    pub fn new(tables: Vec<ResultTable>) -> Self {
        Self { tables }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// First table, the common case for single-select statements.
    pub fn first(&self) -> Option<&ResultTable> {
        self.tables.first()
    }

    /// Row counts per table, in order.
    pub fn row_counts(&self) -> Vec<usize> {
        self.tables.iter().map(ResultTable::row_count).collect()
    }
}

/// Output and input/output parameter values, in declaration order.
pub type OutputValues = IndexMap<String, Value>;
