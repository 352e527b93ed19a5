//! PostgreSQL executor backed by one lazily-connected sqlx pool per connection

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Executor, Postgres};

use crate::error::GatewayError;
use crate::executor::QueryExecutor;
use crate::guard::GuardPolicy;
use crate::normalize::pg_row_to_json;
use crate::registry::{ConnectionDescriptor, ConnectionRegistry};
use crate::types::{QueryParam, Row};

const APPLICATION_NAME: &str = "postgres-mcp";

/// Run on every connection returned to the pool. `RESET ALL` restores the
/// startup-packet settings, so a `set_config(...)` from one request cannot
/// lift the read-only session or the statement timeout for the next.
const RESET_SESSION_SQL: &str = "RESET ALL";

pub struct PgExecutor {
    pools: HashMap<String, PgPool>,
    statement_timeout_ms: u64,
}

impl PgExecutor {
    /// Build a pool for every registered connection without opening sockets.
    /// The first query on a connection pays for the handshake.
    pub fn connect_lazy(
        registry: &ConnectionRegistry,
        policy: &GuardPolicy,
        max_connections: u32,
    ) -> Self {
        let statement_timeout_ms = policy.query_timeout.as_millis() as u64;
        let pools = registry
            .iter()
            .map(|descriptor| {
                let options = connect_options(
                    descriptor,
                    statement_timeout_ms,
                    policy.writes_allowed(descriptor),
                );
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(policy.query_timeout)
                    .after_release(|conn, _meta| {
                        Box::pin(async move {
                            conn.execute(RESET_SESSION_SQL).await?;
                            Ok(true)
                        })
                    })
                    .connect_lazy_with(options);
                tracing::debug!(
                    connection = %descriptor.name,
                    host = %descriptor.host,
                    max_connections,
                    "Created lazy connection pool"
                );
                (descriptor.name.clone(), pool)
            })
            .collect();

        Self {
            pools,
            statement_timeout_ms,
        }
    }

    pub async fn close(&self) {
        for (name, pool) in &self.pools {
            pool.close().await;
            tracing::debug!(connection = %name, "Closed connection pool");
        }
    }
}

/// Session settings ride on the startup packet so every pooled connection
/// carries them, including ones re-opened after a discarded connection.
fn connect_options(
    descriptor: &ConnectionDescriptor,
    statement_timeout_ms: u64,
    writes_allowed: bool,
) -> PgConnectOptions {
    let mut settings = vec![("statement_timeout", statement_timeout_ms.to_string())];
    if !writes_allowed {
        settings.push(("default_transaction_read_only", "on".to_string()));
    }

    PgConnectOptions::new()
        .host(&descriptor.host)
        .port(descriptor.port)
        .database(&descriptor.database)
        .username(&descriptor.user)
        .password(&descriptor.password)
        .ssl_mode(descriptor.sslmode.into())
        .application_name(APPLICATION_NAME)
        .options(settings)
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &QueryParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(b) => query.bind(*b),
        QueryParam::Int(i) => query.bind(*i),
        QueryParam::Float(f) => query.bind(*f),
        QueryParam::Text(s) => query.bind(s.clone()),
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Row>, GatewayError> {
        let pool = self.pools.get(&connection.name).ok_or_else(|| {
            GatewayError::Internal(format!("No pool for connection '{}'", connection.name))
        })?;

        let query = params
            .iter()
            .fold(sqlx::query(sql).persistent(false), bind_param);

        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::from_driver(&connection.name, e, self.statement_timeout_ms))?;

        rows.iter().map(pg_row_to_json).collect()
    }
}
