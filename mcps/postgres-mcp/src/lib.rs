//! PostgreSQL MCP Library
//!
//! Gateway exposing named PostgreSQL/Supabase connections to remote clients
//! over MCP (streamable HTTP or stdio) and a small REST API. All queries pass
//! through the `sql-guard` gatekeeper: read-only by default, row ceilings on
//! unbounded reads, and a hard execution deadline.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use postgres_mcp::{http, AppConfig};
//!
//! let config = AppConfig::load(None)?;
//! let (gatekeeper, executor) = postgres_mcp::build_gatekeeper(config.guard)?;
//! http::serve(http::AppState::new(gatekeeper, config.server)).await?;
//! ```

pub mod auth;
pub mod config;
pub mod handlers;
pub mod http;
pub mod init;
pub mod params;
pub mod rest;
pub mod server;

use std::sync::Arc;

use sql_guard::{ConfigError, Gatekeeper, GuardConfig, PgExecutor};

pub use config::{AppConfig, ServerConfig};
pub use server::PostgresMcpServer;

/// Build the gatekeeper over lazily-connected PostgreSQL pools.
///
/// The executor handle is returned so callers can close the pools on
/// shutdown.
pub fn build_gatekeeper(guard: GuardConfig) -> Result<(Gatekeeper, Arc<PgExecutor>), ConfigError> {
    let pool_max_connections = guard.policy.pool_max_connections;
    let (registry, policy) = guard.into_parts()?;
    let executor = Arc::new(PgExecutor::connect_lazy(&registry, &policy, pool_max_connections));
    let gatekeeper = Gatekeeper::new(registry, policy, executor.clone());
    Ok((gatekeeper, executor))
}
