//! REST API for workflow tools
//!
//! Same gatekeeper as the MCP tools, plain JSON in and out. Every response
//! carries `ok`; failures use the taxonomy status as the HTTP status.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use sql_guard::{ErrorKind, GatewayError, QueryRequest, SchemaDescription, SchemaRequest};

use crate::http::AppState;

/// Failure body shared by every REST route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error_kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(err: GatewayError) -> ApiError {
    let status_code = err.status_code();
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error_kind: err.kind(),
            message: err.to_string(),
            status_code,
        }),
    )
}

fn malformed(rejection: JsonRejection) -> ApiError {
    error_response(GatewayError::MalformedRequest(rejection.body_text()))
}

/// GET /api/connections
pub async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let connections = state.gatekeeper.list_connections();
    Json(json!({
        "ok": true,
        "count": connections.len(),
        "connections": connections,
    }))
}

/// POST /api/query
pub async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(malformed)?;
    let connection = request.connection.clone();

    let output = state
        .gatekeeper
        .execute(request)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({
        "ok": true,
        "rows": output.rows,
        "row_count": output.row_count,
        "connection": connection,
        "execution_time_ms": output.execution_time_ms,
    })))
}

/// POST /api/schema
pub async fn schema(
    State(state): State<AppState>,
    body: Result<Json<SchemaRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(malformed)?;
    let connection = request.connection.clone();

    let description = state
        .gatekeeper
        .describe_schema(request)
        .await
        .map_err(error_response)?;

    Ok(Json(match description {
        SchemaDescription::Tables { tables } => json!({
            "ok": true,
            "connection": connection,
            "tables": tables,
        }),
        SchemaDescription::Columns { table, columns } => json!({
            "ok": true,
            "connection": connection,
            "table": table,
            "columns": columns,
        }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let (status, Json(body)) = error_response(GatewayError::WriteRejected {
            connection: "main".to_string(),
            reason: "DROP statements modify the database".to_string(),
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body = serde_json::to_value(body).unwrap();
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error_kind"], json!("WriteRejected"));
        assert_eq!(body["status_code"], json!(403));
    }

    #[test]
    fn test_timeout_status() {
        let (status, _) = error_response(GatewayError::Timeout { timeout_ms: 10 });
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }
}
