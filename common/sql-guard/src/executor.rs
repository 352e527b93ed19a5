//! The opaque execution capability behind the guard

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::registry::ConnectionDescriptor;
use crate::types::{QueryParam, Row};

/// Runs an already-guarded statement against a connection.
///
/// Implementations map their own failures through
/// [`GatewayError::from_driver`] or an equivalent; the guard owns the
/// client-side deadline and never retries.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Row>, GatewayError>;
}
