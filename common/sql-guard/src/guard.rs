//! Query guard - policy enforcement in front of the executor
//!
//! Every statement passes through the same pipeline: request validation,
//! connection lookup, classification, the write policy, row-limit injection
//! and a hard execution deadline. Nothing reaches the executor unless every
//! earlier step accepted it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classifier::{analyze, Classification, ClassifierOptions};
use crate::error::{ErrorKind, GatewayError};
use crate::executor::QueryExecutor;
use crate::normalize::normalize;
use crate::registry::{ConnectionDescriptor, ConnectionRegistry};
use crate::types::{ConnectionSummary, QueryOutput, QueryParam, QueryRequest};

/// Immutable guard settings
#[derive(Debug, Clone, PartialEq)]
pub struct GuardPolicy {
    /// Global write switch; a connection's `allow_write` overrides it
    pub allow_write: bool,
    /// Row ceiling injected into unbounded reads
    pub row_limit: u64,
    /// Server-side statement timeout
    pub query_timeout: Duration,
    /// Extra client-side wait before the call is abandoned
    pub cancel_grace: Duration,
    pub classifier: ClassifierOptions,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            allow_write: false,
            row_limit: 5000,
            query_timeout: Duration::from_millis(15_000),
            cancel_grace: Duration::from_millis(1_000),
            classifier: ClassifierOptions::default(),
        }
    }
}

impl GuardPolicy {
    pub fn writes_allowed(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.allow_write.unwrap_or(self.allow_write)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.query_timeout.as_millis() as u64
    }

    /// Human-readable mode for logs and server instructions
    pub fn mode(&self) -> &'static str {
        if self.allow_write {
            "read-write"
        } else {
            "read-only"
        }
    }
}

/// A statement cleared for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedStatement {
    /// SQL to send, possibly with an appended `LIMIT`
    pub sql: String,
    pub classification: Classification,
    pub limit_injected: bool,
}

/// Shared entry point for both adapters
#[derive(Clone)]
pub struct Gatekeeper {
    registry: Arc<ConnectionRegistry>,
    policy: Arc<GuardPolicy>,
    executor: Arc<dyn QueryExecutor>,
}

impl Gatekeeper {
    pub fn new(
        registry: ConnectionRegistry,
        policy: GuardPolicy,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            policy: Arc::new(policy),
            executor,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn list_connections(&self) -> Vec<ConnectionSummary> {
        self.registry.summaries()
    }

    /// Apply the write policy and the row ceiling to one statement
    pub fn check(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<GuardedStatement, GatewayError> {
        let analysis = analyze(sql, &self.policy.classifier);
        if analysis.is_empty() {
            return Err(GatewayError::MalformedRequest(
                "SQL contains no statement".to_string(),
            ));
        }

        if analysis.is_write() && !self.policy.writes_allowed(descriptor) {
            let reason = analysis
                .write_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "statement modifies the database".to_string());
            return Err(GatewayError::WriteRejected {
                connection: descriptor.name.clone(),
                reason,
            });
        }

        if analysis.classification == Classification::Read
            && analysis.accepts_row_limit
            && !analysis.has_row_limit
        {
            // Newline keeps a trailing line comment from swallowing the clause
            return Ok(GuardedStatement {
                sql: format!("{}\nLIMIT {}", &sql[..analysis.body_end], self.policy.row_limit),
                classification: analysis.classification,
                limit_injected: true,
            });
        }

        Ok(GuardedStatement {
            sql: sql.to_string(),
            classification: analysis.classification,
            limit_injected: false,
        })
    }

    /// Validate, guard and run a query
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryOutput, GatewayError> {
        let connection = request.connection.trim();
        let result = self.execute_inner(connection, &request).await;
        if let Err(err) = &result {
            log_failure(connection, err);
        }
        result
    }

    async fn execute_inner(
        &self,
        connection: &str,
        request: &QueryRequest,
    ) -> Result<QueryOutput, GatewayError> {
        if connection.is_empty() {
            return Err(GatewayError::MalformedRequest(
                "Missing required field: connection".to_string(),
            ));
        }
        if request.sql.trim().is_empty() {
            return Err(GatewayError::MalformedRequest(
                "Missing required field: sql".to_string(),
            ));
        }

        let descriptor = self.registry.get(connection)?;
        let params = request
            .params
            .iter()
            .cloned()
            .map(QueryParam::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let statement = self.check(descriptor, &request.sql)?;

        tracing::debug!(
            connection = %connection,
            classification = ?statement.classification,
            limit_injected = statement.limit_injected,
            "Executing statement"
        );

        let deadline = self.policy.query_timeout + self.policy.cancel_grace;
        let start = Instant::now();
        let rows = tokio::time::timeout(
            deadline,
            self.executor.execute(descriptor, &statement.sql, &params),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: self.policy.timeout_ms(),
        })??;

        let output = normalize(rows, start.elapsed());
        tracing::info!(
            connection = %connection,
            row_count = output.row_count,
            duration_ms = output.execution_time_ms,
            "Query executed"
        );
        Ok(output)
    }
}

fn log_failure(connection: &str, err: &GatewayError) {
    let kind = err.kind();
    match kind {
        ErrorKind::ConnectionUnavailable | ErrorKind::InternalError => {
            tracing::error!(connection = %connection, error_kind = %kind, error = %err, "Query failed")
        }
        _ => tracing::warn!(connection = %connection, error_kind = %kind, error = %err, "Query rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, FakeExecutor};
    use serde_json::json;

    fn registry() -> ConnectionRegistry {
        let mut writable = ConnectionDescriptor::new("scratch", "localhost", "app", "writer");
        writable.allow_write = Some(true);
        ConnectionRegistry::new(vec![
            ConnectionDescriptor::new("main", "localhost", "app", "reader"),
            writable,
        ])
        .unwrap()
    }

    fn gatekeeper(executor: Arc<FakeExecutor>, policy: GuardPolicy) -> Gatekeeper {
        Gatekeeper::new(registry(), policy, executor)
    }

    fn table(rows: usize) -> Arc<FakeExecutor> {
        Arc::new(FakeExecutor::new(Behavior::Table(rows)))
    }

    #[tokio::test]
    async fn test_select_returns_rows() {
        let executor = Arc::new(FakeExecutor::rows(vec![json!({"x": 1})]));
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let output = gk.execute(QueryRequest::new("main", "SELECT 1 AS x")).await.unwrap();
        assert_eq!(output.row_count, 1);
        assert_eq!(output.rows[0]["x"], json!(1));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_connection_never_executes() {
        let executor = table(10);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let err = gk.execute(QueryRequest::new("nope", "SELECT 1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConnection);
        assert_eq!(err.status_code(), 404);
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_write_rejected_in_read_only_mode() {
        let executor = table(10);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        for sql in ["DROP TABLE vehicles", "SELECT 1; DELETE FROM t", "WITH d AS (DELETE FROM t RETURNING 1) SELECT * FROM d"] {
            let err = gk.execute(QueryRequest::new("main", sql)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::WriteRejected, "{}", sql);
            assert_eq!(err.status_code(), 403);
        }
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_per_connection_write_override() {
        let executor = table(0);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        gk.execute(QueryRequest::new("scratch", "INSERT INTO t VALUES (1)"))
            .await
            .unwrap();
        assert_eq!(executor.last_sql().as_deref(), Some("INSERT INTO t VALUES (1)"));
    }

    #[tokio::test]
    async fn test_connection_override_can_deny() {
        let mut locked = ConnectionDescriptor::new("locked", "localhost", "app", "reader");
        locked.allow_write = Some(false);
        let executor = table(0);
        let policy = GuardPolicy {
            allow_write: true,
            ..GuardPolicy::default()
        };
        let gk = Gatekeeper::new(ConnectionRegistry::new(vec![locked]).unwrap(), policy, executor.clone());

        let err = gk.execute(QueryRequest::new("locked", "DELETE FROM t")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteRejected);
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_row_ceiling_injected() {
        let executor = table(10_000);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let output = gk
            .execute(QueryRequest::new("main", "SELECT * FROM big;"))
            .await
            .unwrap();
        assert_eq!(output.row_count, 5000);
        assert_eq!(executor.last_sql().as_deref(), Some("SELECT * FROM big\nLIMIT 5000"));
    }

    #[tokio::test]
    async fn test_explicit_limit_respected() {
        let executor = table(10_000);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let output = gk
            .execute(QueryRequest::new("main", "SELECT * FROM big LIMIT 3"))
            .await
            .unwrap();
        assert_eq!(output.row_count, 3);

        // Larger than the ceiling, still verbatim
        let output = gk
            .execute(QueryRequest::new("main", "SELECT * FROM big LIMIT 6000"))
            .await
            .unwrap();
        assert_eq!(output.row_count, 6000);
        assert_eq!(executor.last_sql().as_deref(), Some("SELECT * FROM big LIMIT 6000"));
    }

    #[tokio::test]
    async fn test_fetch_alias_still_gets_ceiling() {
        let executor = table(50);
        let policy = GuardPolicy {
            row_limit: 10,
            ..GuardPolicy::default()
        };
        let gk = gatekeeper(executor.clone(), policy);

        let output = gk
            .execute(QueryRequest::new(
                "main",
                "SELECT g AS fetch FROM generate_series(1, 50) AS g",
            ))
            .await
            .unwrap();
        assert_eq!(output.row_count, 10);
        assert_eq!(
            executor.last_sql().as_deref(),
            Some("SELECT g AS fetch FROM generate_series(1, 50) AS g\nLIMIT 10")
        );
    }

    #[tokio::test]
    async fn test_untokenizable_sql_rejected_on_read_only() {
        let executor = table(10);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let err = gk
            .execute(QueryRequest::new("main", "SELECT 'unterminated"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteRejected);
        assert_eq!(executor.calls(), 0);
    }

    #[test]
    fn test_limit_injection_after_trailing_comment() {
        let gk = gatekeeper(table(0), GuardPolicy::default());
        let descriptor = ConnectionDescriptor::new("main", "localhost", "app", "reader");

        let statement = gk.check(&descriptor, "SELECT * FROM t -- all of them").unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t\nLIMIT 5000");
        assert!(statement.limit_injected);
    }

    #[test]
    fn test_non_select_reads_not_rewritten() {
        let gk = gatekeeper(table(0), GuardPolicy::default());
        let descriptor = ConnectionDescriptor::new("main", "localhost", "app", "reader");

        for sql in ["SHOW search_path", "EXPLAIN SELECT * FROM t"] {
            let statement = gk.check(&descriptor, sql).unwrap();
            assert_eq!(statement.sql, sql);
            assert!(!statement.limit_injected);
        }
    }

    #[test]
    fn test_writes_not_rewritten_when_allowed() {
        let policy = GuardPolicy {
            allow_write: true,
            ..GuardPolicy::default()
        };
        let gk = gatekeeper(table(0), policy);
        let descriptor = ConnectionDescriptor::new("main", "localhost", "app", "writer");

        let statement = gk.check(&descriptor, "UPDATE t SET a = 1").unwrap();
        assert_eq!(statement.sql, "UPDATE t SET a = 1");
        assert_eq!(statement.classification, Classification::Write);
    }

    #[tokio::test]
    async fn test_timeout_fires_at_deadline() {
        let executor = Arc::new(FakeExecutor::new(Behavior::Sleep(Duration::from_secs(5))));
        let policy = GuardPolicy {
            query_timeout: Duration::from_millis(50),
            cancel_grace: Duration::from_millis(50),
            ..GuardPolicy::default()
        };
        let gk = gatekeeper(executor, policy);

        let start = Instant::now();
        let err = gk
            .execute(QueryRequest::new("main", "SELECT pg_sleep(5)"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.status_code(), 408);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_driver_errors_are_mapped() {
        let executor = Arc::new(FakeExecutor::new(Behavior::Fail {
            sqlstate: "42P01".to_string(),
            message: "relation \"nope\" does not exist".to_string(),
        }));
        let gk = gatekeeper(executor, GuardPolicy::default());

        let err = gk
            .execute(QueryRequest::new("main", "SELECT * FROM nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxOrExecutionError);
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let executor = table(1);
        let gk = gatekeeper(executor.clone(), GuardPolicy::default());

        let cases = [
            QueryRequest::new("", "SELECT 1"),
            QueryRequest::new("main", "   "),
            QueryRequest::new("main", "-- only a comment"),
            QueryRequest::new("main", "SELECT $1").with_params(vec![json!([1, 2])]),
        ];
        for request in cases {
            let err = gk.execute(request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedRequest);
        }
        assert_eq!(executor.calls(), 0);
    }

    #[test]
    fn test_list_connections_sorted() {
        let gk = gatekeeper(table(0), GuardPolicy::default());
        let names: Vec<String> = gk.list_connections().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["main", "scratch"]);
    }
}
