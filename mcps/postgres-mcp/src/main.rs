//! PostgreSQL MCP - read-only-by-default database gateway
//!
//! Serves MCP over streamable HTTP (with the REST API alongside) or stdio.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rmcp::ServiceExt;

use postgres_mcp::http::{self, AppState};
use postgres_mcp::init::init_tracing;
use postgres_mcp::{build_gatekeeper, AppConfig, PostgresMcpServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Streamable HTTP MCP endpoint plus REST API
    Http,
    /// MCP over stdin/stdout
    Stdio,
}

#[derive(Parser)]
#[command(name = "postgres-mcp")]
#[command(about = "PostgreSQL/Supabase gateway over MCP and REST")]
struct Cli {
    /// Transport to serve
    #[arg(long, value_enum, env = "MCP_TRANSPORT", default_value = "http")]
    transport: Transport,

    /// Config file (defaults to GATEWAY_CONFIG_PATH, then ~/.config/postgres-mcp/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen host (overrides MCP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides MCP_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let (gatekeeper, executor) =
        build_gatekeeper(config.guard).context("Invalid database configuration")?;

    let policy = gatekeeper.policy();
    tracing::info!(
        server = %config.server.name,
        mode = policy.mode(),
        row_limit = policy.row_limit,
        timeout_ms = policy.timeout_ms(),
        connections = ?gatekeeper.registry().names(),
        "Starting postgres-mcp"
    );
    if gatekeeper.registry().is_empty() {
        tracing::error!(
            "No database connections configured. Define CONN_<name>_HOST, CONN_<name>_DBNAME and CONN_<name>_USER"
        );
    }

    match cli.transport {
        Transport::Http => {
            http::serve(AppState::new(gatekeeper, config.server)).await?;
        }
        Transport::Stdio => {
            let server = PostgresMcpServer::new(gatekeeper, config.server.name.clone());
            let service = server.serve(rmcp::transport::stdio()).await?;
            tracing::info!("Server running on stdio, waiting for requests...");
            service.waiting().await?;
        }
    }

    executor.close().await;
    tracing::info!("Server shutting down");
    Ok(())
}
