//! MCP server exposing the gateway as tools
//!
//! Handler implementations are in the handlers module.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use sql_guard::Gatekeeper;

use crate::handlers;
use crate::params::{QueryParams, SchemaParams};

/// The PostgreSQL gateway MCP server
#[derive(Clone)]
pub struct PostgresMcpServer {
    gatekeeper: Gatekeeper,
    name: String,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl PostgresMcpServer {
    pub fn new(gatekeeper: Gatekeeper, name: impl Into<String>) -> Self {
        Self {
            gatekeeper,
            name: name.into(),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "sql.query",
        description = "Execute a SQL statement against a named connection. Read-only unless writes are enabled; reads without LIMIT are capped at the server row ceiling."
    )]
    async fn sql_query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::sql_query(&self.gatekeeper, params).await
    }

    #[tool(
        name = "sql.connections",
        description = "List the configured database connections with their descriptions"
    )]
    async fn sql_connections(&self) -> Result<CallToolResult, McpError> {
        handlers::list_connections(&self.gatekeeper)
    }

    #[tool(
        name = "sql.schema",
        description = "List tables in a schema, or describe the columns of one table"
    )]
    async fn sql_schema(
        &self,
        Parameters(params): Parameters<SchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_schema(&self.gatekeeper, params).await
    }
}

impl PostgresMcpServer {
    fn instructions(&self) -> String {
        let policy = self.gatekeeper.policy();
        let summaries = self.gatekeeper.list_connections();
        let connections = if summaries.is_empty() {
            "(none configured)".to_string()
        } else {
            summaries
                .iter()
                .map(|c| format!("- {}: {}", c.name, c.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "PostgreSQL gateway ({mode}). Use sql.connections to list databases, \
             sql.schema to explore tables, and sql.query to run SQL. \
             Reads without an explicit LIMIT return at most {limit} rows; \
             statements time out after {timeout} ms.\n\nConnections:\n{connections}",
            mode = policy.mode(),
            limit = policy.row_limit,
            timeout = policy.timeout_ms(),
            connections = connections,
        )
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for PostgresMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(self.instructions()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}
