//! MCP tool handlers
//!
//! Each handler delegates to the shared gatekeeper and renders the outcome:
//! success as a JSON text block, failure as a JSON-RPC error whose code is
//! the taxonomy status code.

use rmcp::{
    model::{CallToolResult, Content, ErrorCode},
    ErrorData as McpError,
};
use serde::Serialize;
use serde_json::json;
use sql_guard::{Gatekeeper, GatewayError};

use crate::params::{QueryParams, SchemaParams};

// ============================================================================
// Helper Functions
// ============================================================================

pub fn gateway_error_to_mcp(err: GatewayError) -> McpError {
    let status = err.status_code();
    let data = json!({
        "error_kind": err.kind(),
        "status_code": status,
    });
    McpError::new(ErrorCode(i32::from(status)), err.to_string(), Some(data))
}

fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn sql_query(gatekeeper: &Gatekeeper, params: QueryParams) -> Result<CallToolResult, McpError> {
    let output = gatekeeper
        .execute(params.into())
        .await
        .map_err(gateway_error_to_mcp)?;
    json_success(&output)
}

pub fn list_connections(gatekeeper: &Gatekeeper) -> Result<CallToolResult, McpError> {
    let connections = gatekeeper.list_connections();
    json_success(&json!({
        "count": connections.len(),
        "connections": connections,
    }))
}

pub async fn describe_schema(
    gatekeeper: &Gatekeeper,
    params: SchemaParams,
) -> Result<CallToolResult, McpError> {
    let description = gatekeeper
        .describe_schema(params.into())
        .await
        .map_err(gateway_error_to_mcp)?;
    json_success(&description)
}
