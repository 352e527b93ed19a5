//! Parameter types for the gateway's MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sql_guard::{QueryRequest, SchemaRequest};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(description = "Name of the configured connection (see sql.connections)")]
    #[serde(default)]
    pub connection: String,

    #[schemars(description = "A single SQL statement. Reads without LIMIT get the server row ceiling appended")]
    #[serde(default)]
    pub sql: String,

    #[schemars(description = "Positional parameters bound to $1..$n (scalars only; strings bind as text)")]
    #[serde(default)]
    pub params: Vec<Value>,
}

impl From<QueryParams> for QueryRequest {
    fn from(params: QueryParams) -> Self {
        QueryRequest {
            connection: params.connection,
            sql: params.sql,
            params: params.params,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SchemaParams {
    #[schemars(description = "Name of the configured connection")]
    #[serde(default)]
    pub connection: String,

    #[schemars(description = "Table to describe (optional; lists tables when omitted)")]
    #[serde(default)]
    pub table: Option<String>,

    #[schemars(description = "Schema name (optional, defaults to public)")]
    #[serde(default)]
    pub schema: Option<String>,
}

impl From<SchemaParams> for SchemaRequest {
    fn from(params: SchemaParams) -> Self {
        SchemaRequest {
            connection: params.connection,
            table: params.table,
            schema: params.schema,
        }
    }
}
