//! Schema introspection routed through the guard

use serde_json::Value;

use crate::error::GatewayError;
use crate::guard::Gatekeeper;
use crate::types::{QueryRequest, SchemaDescription, SchemaRequest};

const DEFAULT_SCHEMA: &str = "public";

const TABLES_SQL: &str = "SELECT table_name::text AS table_name, table_schema::text AS table_schema \
FROM information_schema.tables \
WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, data_type::text AS data_type, \
is_nullable::text AS is_nullable, column_default::text AS column_default \
FROM information_schema.columns \
WHERE table_schema = $1 AND table_name = $2 \
ORDER BY ordinal_position";

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Catalog query for a schema request: tables, or one table's columns
pub fn introspection_query(request: &SchemaRequest) -> QueryRequest {
    let schema = non_blank(request.schema.as_deref()).unwrap_or(DEFAULT_SCHEMA);
    match non_blank(request.table.as_deref()) {
        Some(table) => QueryRequest::new(request.connection.clone(), COLUMNS_SQL).with_params(vec![
            Value::String(schema.to_string()),
            Value::String(table.to_string()),
        ]),
        None => QueryRequest::new(request.connection.clone(), TABLES_SQL)
            .with_params(vec![Value::String(schema.to_string())]),
    }
}

impl Gatekeeper {
    /// List tables, or describe one table's columns. Runs as an ordinary
    /// guarded read, so the row ceiling and deadline apply.
    pub async fn describe_schema(
        &self,
        request: SchemaRequest,
    ) -> Result<SchemaDescription, GatewayError> {
        let query = introspection_query(&request);
        let output = self.execute(query).await?;

        Ok(match non_blank(request.table.as_deref()) {
            Some(table) => SchemaDescription::Columns {
                table: table.to_string(),
                columns: output.rows,
            },
            None => SchemaDescription::Tables {
                tables: output.rows,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, Classification};
    use crate::error::ErrorKind;
    use crate::guard::GuardPolicy;
    use crate::registry::{ConnectionDescriptor, ConnectionRegistry};
    use crate::testing::FakeExecutor;
    use serde_json::json;
    use std::sync::Arc;

    fn gatekeeper(executor: Arc<FakeExecutor>) -> Gatekeeper {
        let registry = ConnectionRegistry::new(vec![ConnectionDescriptor::new(
            "main", "localhost", "app", "reader",
        )])
        .unwrap();
        Gatekeeper::new(registry, GuardPolicy::default(), executor)
    }

    #[test]
    fn test_catalog_queries_are_reads() {
        assert_eq!(classify(TABLES_SQL), Classification::Read);
        assert_eq!(classify(COLUMNS_SQL), Classification::Read);
    }

    #[test]
    fn test_schema_defaults_to_public() {
        let query = introspection_query(&SchemaRequest {
            connection: "main".to_string(),
            table: None,
            schema: Some("  ".to_string()),
        });
        assert_eq!(query.params, vec![json!("public")]);
        assert_eq!(query.sql, TABLES_SQL);
    }

    #[test]
    fn test_table_bound_as_parameter() {
        let query = introspection_query(&SchemaRequest {
            connection: "main".to_string(),
            table: Some("vehicles'; DROP TABLE x; --".to_string()),
            schema: Some("fleet".to_string()),
        });
        assert_eq!(query.sql, COLUMNS_SQL);
        assert_eq!(query.params[0], json!("fleet"));
        assert_eq!(query.params[1], json!("vehicles'; DROP TABLE x; --"));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let executor = Arc::new(FakeExecutor::rows(vec![
            json!({"table_name": "vehicles", "table_schema": "public"}),
        ]));
        let gk = gatekeeper(executor.clone());

        let description = gk
            .describe_schema(SchemaRequest {
                connection: "main".to_string(),
                ..SchemaRequest::default()
            })
            .await
            .unwrap();
        match description {
            SchemaDescription::Tables { tables } => assert_eq!(tables[0]["table_name"], json!("vehicles")),
            other => panic!("unexpected: {:?}", other),
        }
        // Went through the guard: ceiling appended
        assert!(executor.last_sql().unwrap().ends_with("\nLIMIT 5000"));
    }

    #[tokio::test]
    async fn test_describe_columns() {
        let executor = Arc::new(FakeExecutor::rows(vec![json!({
            "column_name": "id",
            "data_type": "integer",
            "is_nullable": "NO",
            "column_default": null
        })]));
        let gk = gatekeeper(executor);

        let description = gk
            .describe_schema(SchemaRequest {
                connection: "main".to_string(),
                table: Some("vehicles".to_string()),
                schema: None,
            })
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&description).unwrap()["table"],
            json!("vehicles")
        );
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let executor = Arc::new(FakeExecutor::rows(vec![]));
        let gk = gatekeeper(executor.clone());

        let err = gk
            .describe_schema(SchemaRequest {
                connection: "missing".to_string(),
                ..SchemaRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConnection);
        assert_eq!(executor.calls(), 0);
    }
}
