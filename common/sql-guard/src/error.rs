//! Error taxonomy and driver error mapping

use serde::Serialize;
use thiserror::Error;

/// Stable, client-facing error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnknownConnection,
    WriteRejected,
    MalformedRequest,
    SyntaxOrExecutionError,
    Timeout,
    ConnectionUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownConnection => "UnknownConnection",
            ErrorKind::WriteRejected => "WriteRejected",
            ErrorKind::MalformedRequest => "MalformedRequest",
            ErrorKind::SyntaxOrExecutionError => "SyntaxOrExecutionError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ConnectionUnavailable => "ConnectionUnavailable",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the engine refused a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCause {
    /// Syntax errors, missing relations, constraint violations, ...
    Rejected,
    /// Insufficient privilege or a read-only transaction
    PermissionDenied,
}

/// Every way a gateway request can fail
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unknown connection '{name}'. Available connections: {}", available_list(.available))]
    UnknownConnection { name: String, available: Vec<String> },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Write operations are disabled for connection '{connection}': {reason}")]
    WriteRejected { connection: String, reason: String },

    #[error("{message}")]
    Execution {
        message: String,
        cause: ExecutionCause,
    },

    #[error("Query exceeded the {timeout_ms} ms timeout and was cancelled")]
    Timeout { timeout_ms: u64 },

    /// `detail` is for logs only; it may name hosts
    #[error("Database unavailable for connection '{connection}'")]
    ConnectionUnavailable { connection: String, detail: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn available_list(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnknownConnection { .. } => ErrorKind::UnknownConnection,
            GatewayError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            GatewayError::WriteRejected { .. } => ErrorKind::WriteRejected,
            GatewayError::Execution { .. } => ErrorKind::SyntaxOrExecutionError,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::ConnectionUnavailable { .. } => ErrorKind::ConnectionUnavailable,
            GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// HTTP-style status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::UnknownConnection { .. } => 404,
            GatewayError::WriteRejected { .. } => 403,
            GatewayError::MalformedRequest(_) => 400,
            GatewayError::Execution {
                cause: ExecutionCause::PermissionDenied,
                ..
            } => 403,
            GatewayError::Execution { .. } => 400,
            GatewayError::Timeout { .. } => 408,
            GatewayError::ConnectionUnavailable { .. } => 503,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Map a driver error onto the taxonomy.
    ///
    /// Connection-level detail is logged here and withheld from the message.
    pub fn from_driver(connection: &str, err: sqlx::Error, timeout_ms: u64) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                Self::from_sqlstate(connection, &code, db.message(), timeout_ms)
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => {
                let detail = err.to_string();
                tracing::error!(connection = %connection, error = %detail, "Database connection failed");
                GatewayError::ConnectionUnavailable {
                    connection: connection.to_string(),
                    detail,
                }
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }

    /// SQLSTATE-driven classification of an engine error
    pub fn from_sqlstate(connection: &str, code: &str, message: &str, timeout_ms: u64) -> Self {
        match code {
            // query_canceled: statement_timeout fired
            "57014" => GatewayError::Timeout { timeout_ms },
            // insufficient_privilege, read_only_sql_transaction
            "42501" | "25006" => GatewayError::Execution {
                message: message.to_string(),
                cause: ExecutionCause::PermissionDenied,
            },
            // protocol_violation: parameter count mismatch and the like
            "08P01" => GatewayError::Execution {
                message: message.to_string(),
                cause: ExecutionCause::Rejected,
            },
            // admin/crash shutdown, cannot_connect_now
            "57P01" | "57P02" | "57P03" | "3D000" => unavailable(connection, code, message),
            c if c.starts_with("08") || c.starts_with("28") || c.starts_with("53") => {
                unavailable(connection, code, message)
            }
            _ => GatewayError::Execution {
                message: message.to_string(),
                cause: ExecutionCause::Rejected,
            },
        }
    }
}

fn unavailable(connection: &str, code: &str, message: &str) -> GatewayError {
    tracing::error!(connection = %connection, sqlstate = %code, error = %message, "Database unavailable");
    GatewayError::ConnectionUnavailable {
        connection: connection.to_string(),
        detail: format!("{} ({})", message, code),
    }
}

/// Configuration errors, fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Connection '{0}' is defined more than once")]
    DuplicateConnection(String),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(code: &str) -> GatewayError {
        GatewayError::from_sqlstate("main", code, "boom", 15000)
    }

    #[test]
    fn test_status_codes() {
        let unknown = GatewayError::UnknownConnection {
            name: "x".to_string(),
            available: vec![],
        };
        assert_eq!(unknown.status_code(), 404);
        assert_eq!(
            GatewayError::WriteRejected {
                connection: "main".to_string(),
                reason: "DROP".to_string()
            }
            .status_code(),
            403
        );
        assert_eq!(GatewayError::MalformedRequest("x".to_string()).status_code(), 400);
        assert_eq!(GatewayError::Timeout { timeout_ms: 1 }.status_code(), 408);
        assert_eq!(GatewayError::Internal("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_statement_timeout_maps_to_timeout() {
        let err = map("57014");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.status_code(), 408);
    }

    #[test]
    fn test_permission_errors_are_forbidden() {
        for code in ["42501", "25006"] {
            let err = map(code);
            assert_eq!(err.kind(), ErrorKind::SyntaxOrExecutionError);
            assert_eq!(err.status_code(), 403);
        }
    }

    #[test]
    fn test_connection_classes_are_unavailable() {
        for code in ["08006", "08001", "28P01", "53300", "57P01", "3D000"] {
            let err = map(code);
            assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable, "{}", code);
            assert_eq!(err.status_code(), 503);
        }
    }

    #[test]
    fn test_engine_errors_are_bad_requests() {
        for code in ["42601", "42P01", "23505", "08P01", ""] {
            let err = map(code);
            assert_eq!(err.kind(), ErrorKind::SyntaxOrExecutionError);
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.to_string(), "boom");
        }
    }

    #[test]
    fn test_unavailable_message_hides_detail() {
        let err = GatewayError::ConnectionUnavailable {
            connection: "main".to_string(),
            detail: "could not reach db.internal:5432".to_string(),
        };
        assert!(!err.to_string().contains("db.internal"));
    }

    #[test]
    fn test_transport_errors_are_unavailable() {
        let err = GatewayError::from_driver("main", sqlx::Error::PoolTimedOut, 1000);
        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = GatewayError::from_driver("main", sqlx::Error::Io(io), 1000);
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_other_driver_errors_are_internal() {
        let err = GatewayError::from_driver("main", sqlx::Error::RowNotFound, 1000);
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn test_unknown_connection_lists_available() {
        let err = GatewayError::UnknownConnection {
            name: "nope".to_string(),
            available: vec!["main".to_string(), "replica".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown connection 'nope'. Available connections: main, replica"
        );
    }
}
