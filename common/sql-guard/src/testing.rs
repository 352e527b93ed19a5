//! In-memory executor for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::executor::QueryExecutor;
use crate::registry::ConnectionDescriptor;
use crate::types::{QueryParam, Row};

/// What the fake executor does with every statement
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return these rows
    Rows(Vec<Row>),
    /// Act as a table of `n` rows `{id: 1..=n}`, honouring a trailing `LIMIT k`
    Table(usize),
    /// Sleep, then return no rows
    Sleep(Duration),
    /// Fail with an engine error carrying this SQLSTATE
    Fail { sqlstate: String, message: String },
}

/// Records every statement it is asked to run
pub struct FakeExecutor {
    behavior: Behavior,
    calls: AtomicUsize,
    executed: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn rows(rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self::new(Behavior::Rows(rows))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(connection, sql)` pairs in execution order
    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.executed().last().map(|(_, sql)| sql.clone())
    }
}

fn trailing_limit(sql: &str) -> Option<usize> {
    let mut words = sql.split_whitespace().rev();
    let value = words.next()?.trim_end_matches(';');
    let keyword = words.next()?;
    if keyword.eq_ignore_ascii_case("LIMIT") {
        value.parse().ok()
    } else {
        None
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        sql: &str,
        _params: &[QueryParam],
    ) -> Result<Vec<Row>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut executed) = self.executed.lock() {
            executed.push((connection.name.clone(), sql.to_string()));
        }

        match &self.behavior {
            Behavior::Rows(rows) => Ok(rows.clone()),
            Behavior::Table(size) => {
                let count = trailing_limit(sql).map_or(*size, |limit| limit.min(*size));
                Ok((1..=count)
                    .filter_map(|id| match json!({ "id": id }) {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect())
            }
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Vec::new())
            }
            Behavior::Fail { sqlstate, message } => Err(GatewayError::from_sqlstate(
                &connection.name,
                sqlstate,
                message,
                0,
            )),
        }
    }
}
