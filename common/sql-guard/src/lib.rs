//! Query-safety gatekeeper for named PostgreSQL connections
//!
//! Provides:
//! - Connection registry with credential-safe descriptors
//! - Lexical SQL classification (READ / WRITE)
//! - Query guard: write policy, row-limit injection, execution deadline
//! - Result normalization to ordered JSON rows
//! - Error taxonomy with SQLSTATE-driven driver error mapping
//! - A sqlx-backed PostgreSQL executor
//!
//! # Example
//!
//! ```rust,ignore
//! use sql_guard::{Gatekeeper, GuardConfig, PgExecutor, QueryRequest};
//!
//! let (registry, policy) = GuardConfig::default().into_parts()?;
//! let executor = PgExecutor::connect_lazy(&registry, &policy, 5);
//! let gatekeeper = Gatekeeper::new(registry, policy, Arc::new(executor));
//! let output = gatekeeper.execute(QueryRequest::new("main", "SELECT 1 AS x")).await?;
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod lexer;
pub mod normalize;
pub mod postgres;
pub mod registry;
pub mod schema;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use classifier::{analyze, classify, Classification, ClassifierOptions, StatementAnalysis, WriteReason};
pub use config::{GuardConfig, PolicyConfig};
pub use error::{ConfigError, ErrorKind, ExecutionCause, GatewayError};
pub use executor::QueryExecutor;
pub use guard::{Gatekeeper, GuardPolicy, GuardedStatement};
pub use postgres::PgExecutor;
pub use registry::{ConnectionDescriptor, ConnectionRegistry, SslMode};
pub use types::{
    ConnectionSummary, QueryOutput, QueryParam, QueryRequest, Row, SchemaDescription,
    SchemaRequest,
};
