//! Connection registry: named, immutable PostgreSQL descriptors

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgSslMode;

use crate::error::{ConfigError, GatewayError};
use crate::types::ConnectionSummary;

/// TLS negotiation mode, named as in libpq's `sslmode`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::InvalidValue {
                key: "sslmode".to_string(),
                value: other.to_string(),
                reason: "expected disable, allow, prefer, require, verify-ca or verify-full"
                    .to_string(),
            }),
        }
    }
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

fn default_port() -> u16 {
    5432
}

/// Everything needed to reach one PostgreSQL instance
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(alias = "dbname")]
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sslmode: SslMode,
    /// Overrides the global write policy for this connection only
    #[serde(default)]
    pub allow_write: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ConnectionDescriptor {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            database: database.into(),
            user: user.into(),
            password: String::new(),
            sslmode: SslMode::default(),
            allow_write: None,
            description: None,
        }
    }

    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Database connection: {}", self.name))
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            name: self.name.clone(),
            description: self.description(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("sslmode", &self.sslmode)
            .field("allow_write", &self.allow_write)
            .finish()
    }
}

/// Name-keyed, read-only set of connections
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, ConnectionDescriptor>,
}

impl ConnectionRegistry {
    pub fn new(descriptors: Vec<ConnectionDescriptor>) -> Result<Self, ConfigError> {
        let mut connections = BTreeMap::new();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if connections.insert(name.clone(), descriptor).is_some() {
                return Err(ConfigError::DuplicateConnection(name));
            }
        }
        Ok(Self { connections })
    }

    /// Lookup by exact name. Never touches the network.
    pub fn get(&self, name: &str) -> Result<&ConnectionDescriptor, GatewayError> {
        self.connections
            .get(name)
            .ok_or_else(|| GatewayError::UnknownConnection {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionDescriptor> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Name-ordered public listing
    pub fn summaries(&self) -> Vec<ConnectionSummary> {
        self.iter().map(ConnectionDescriptor::summary).collect()
    }
}
