//! Request and response types shared by every gateway surface

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// One result row: column name to JSON value, in column order
pub type Row = serde_json::Map<String, Value>;

// ============================================================================
// Query Types
// ============================================================================

/// A query against a named connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub connection: String,
    pub sql: String,
    /// Positional parameters bound to `$1..$n`
    #[serde(default)]
    pub params: Vec<Value>,
}

impl QueryRequest {
    pub fn new(connection: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Normalized result of a successful query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// A scalar query parameter.
///
/// Strings bind as TEXT, so comparisons against other column types need an
/// explicit cast in the SQL (`WHERE id = $1::uuid`).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<Value> for QueryParam {
    type Error = GatewayError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(QueryParam::Null),
            Value::Bool(b) => Ok(QueryParam::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(QueryParam::Int(i)),
                None => n.as_f64().map(QueryParam::Float).ok_or_else(|| {
                    GatewayError::MalformedRequest(format!("Unsupported numeric parameter: {}", n))
                }),
            },
            Value::String(s) => Ok(QueryParam::Text(s)),
            Value::Array(_) | Value::Object(_) => Err(GatewayError::MalformedRequest(
                "Query parameters must be scalars (null, boolean, number, or string)".to_string(),
            )),
        }
    }
}

// ============================================================================
// Connection and Schema Types
// ============================================================================

/// Public view of a connection: never carries credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub name: String,
    pub description: String,
}

/// Schema introspection request. Without `table`, lists tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRequest {
    pub connection: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Defaults to `public`
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaDescription {
    Columns { table: String, columns: Vec<Row> },
    Tables { tables: Vec<Row> },
}
