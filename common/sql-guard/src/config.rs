//! Guard configuration: policy and connections from TOML and environment

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierOptions;
use crate::error::ConfigError;
use crate::guard::GuardPolicy;
use crate::registry::{ConnectionDescriptor, ConnectionRegistry, SslMode};

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allow_write: bool,

    /// Row ceiling for reads without an explicit limit
    #[serde(default = "default_row_limit")]
    pub row_limit: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Client-side slack on top of the server-side timeout
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    #[serde(default)]
    pub locking_reads_are_writes: bool,

    /// Pool size per connection
    #[serde(default = "default_pool_max_connections")]
    pub pool_max_connections: u32,
}

fn default_row_limit() -> u64 {
    5000
}

fn default_query_timeout_ms() -> u64 {
    15_000
}

fn default_cancel_grace_ms() -> u64 {
    1_000
}

fn default_pool_max_connections() -> u32 {
    5
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_write: false,
            row_limit: default_row_limit(),
            query_timeout_ms: default_query_timeout_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            locking_reads_are_writes: false,
            pool_max_connections: default_pool_max_connections(),
        }
    }
}

impl PolicyConfig {
    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            allow_write: self.allow_write,
            row_limit: self.row_limit,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
            classifier: ClassifierOptions {
                locking_reads_are_writes: self.locking_reads_are_writes,
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("row_limit", self.row_limit),
            ("query_timeout_ms", self.query_timeout_ms),
            ("pool_max_connections", self.pool_max_connections as u64),
        ] {
            if value == 0 {
                return Err(invalid(key, "0", "must be greater than zero"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Guard configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,
}

const CONN_FIELDS: &[&str] = &[
    "HOST",
    "PORT",
    "DBNAME",
    "USER",
    "PASSWORD",
    "SSLMODE",
    "ALLOW_WRITE",
    "DESCRIPTION",
];

impl GuardConfig {
    /// Parse the `[policy]` and `[[connections]]` sections of a config file
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Layer environment variables over the file configuration.
    ///
    /// `CONN_<name>_*` connections replace file connections of the same name.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        let policy = &mut self.policy;
        if let Some(v) = vars.get("ALLOW_WRITE") {
            policy.allow_write = parse_bool("ALLOW_WRITE", v)?;
        }
        if let Some(v) = vars.get("ROW_LIMIT") {
            policy.row_limit = parse_number("ROW_LIMIT", v)?;
        }
        if let Some(v) = vars.get("QUERY_TIMEOUT_MS") {
            policy.query_timeout_ms = parse_number("QUERY_TIMEOUT_MS", v)?;
        }
        if let Some(v) = vars.get("CANCEL_GRACE_MS") {
            policy.cancel_grace_ms = parse_number("CANCEL_GRACE_MS", v)?;
        }
        if let Some(v) = vars.get("LOCKING_READS_ARE_WRITES") {
            policy.locking_reads_are_writes = parse_bool("LOCKING_READS_ARE_WRITES", v)?;
        }
        if let Some(v) = vars.get("POOL_MAX_CONNECTIONS") {
            policy.pool_max_connections = parse_number("POOL_MAX_CONNECTIONS", v)?;
        }

        for descriptor in env_connections(vars)? {
            self.connections.retain(|c| c.name != descriptor.name);
            self.connections.push(descriptor);
        }
        Ok(())
    }

    /// Validate and split into the registry and the guard policy
    pub fn into_parts(self) -> Result<(ConnectionRegistry, GuardPolicy), ConfigError> {
        self.policy.validate()?;
        let policy = self.policy.guard_policy();
        let registry = ConnectionRegistry::new(self.connections)?;
        Ok((registry, policy))
    }
}

/// Connections named by `CONN_<name>_HOST`; names keep their case
fn env_connections(vars: &HashMap<String, String>) -> Result<Vec<ConnectionDescriptor>, ConfigError> {
    let mut names: Vec<&str> = vars
        .keys()
        .filter_map(|k| k.strip_prefix("CONN_")?.strip_suffix("_HOST"))
        .filter(|name| !name.is_empty())
        .collect();
    names.sort_unstable();

    let mut descriptors = Vec::new();
    for name in names {
        let field = |suffix: &str| {
            vars.get(&format!("CONN_{}_{}", name, suffix))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (Some(host), Some(database), Some(user)) = (field("HOST"), field("DBNAME"), field("USER"))
        else {
            tracing::warn!(
                connection = %name,
                "Skipping incomplete connection: CONN_{}_HOST, CONN_{}_DBNAME and CONN_{}_USER are required",
                name, name, name
            );
            continue;
        };

        let mut descriptor = ConnectionDescriptor::new(name, host, database, user);
        if let Some(port) = field("PORT") {
            descriptor.port = parse_number(&format!("CONN_{}_PORT", name), &port)?;
        }
        if let Some(password) = vars.get(&format!("CONN_{}_PASSWORD", name)) {
            descriptor.password = password.clone();
        }
        if let Some(sslmode) = field("SSLMODE") {
            descriptor.sslmode = sslmode.parse::<SslMode>().map_err(|_| {
                invalid(
                    &format!("CONN_{}_SSLMODE", name),
                    &sslmode,
                    "expected disable, allow, prefer, require, verify-ca or verify-full",
                )
            })?;
        }
        if let Some(allow) = field("ALLOW_WRITE") {
            descriptor.allow_write = Some(parse_bool(&format!("CONN_{}_ALLOW_WRITE", name), &allow)?);
        }
        descriptor.description = field("DESCRIPTION");

        tracing::debug!(connection = %name, host = %descriptor.host, port = descriptor.port, "Loaded connection from environment");
        descriptors.push(descriptor);
    }

    for key in vars.keys().filter(|k| k.starts_with("CONN_")) {
        let known = CONN_FIELDS.iter().any(|f| key.ends_with(&format!("_{}", f)));
        if !known {
            tracing::warn!(variable = %key, "Ignoring unrecognised connection variable");
        }
    }

    Ok(descriptors)
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Strict boolean: true/false, 1/0, yes/no, on/off
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true/false, 1/0, yes/no or on/off")),
    }
}

pub fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert!(!config.policy.allow_write);
        assert_eq!(config.policy.row_limit, 5000);
        assert_eq!(config.policy.query_timeout_ms, 15_000);
        assert_eq!(config.policy.cancel_grace_ms, 1_000);
        assert_eq!(config.policy.pool_max_connections, 5);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_env_connections() {
        let mut config = GuardConfig::default();
        config
            .apply_env(&env(&[
                ("CONN_prod_HOST", "db.example.com"),
                ("CONN_prod_DBNAME", "postgres"),
                ("CONN_prod_USER", "mcp_ro"),
                ("CONN_prod_PASSWORD", "secret"),
                ("CONN_prod_SSLMODE", "require"),
                ("CONN_my_dev_HOST", "localhost"),
                ("CONN_my_dev_PORT", "6543"),
                ("CONN_my_dev_DBNAME", "dev"),
                ("CONN_my_dev_USER", "dev"),
                ("CONN_my_dev_ALLOW_WRITE", "yes"),
                ("CONN_my_dev_DESCRIPTION", "Local sandbox"),
            ]))
            .unwrap();

        let (registry, _) = config.into_parts().unwrap();
        assert_eq!(registry.names(), vec!["my_dev", "prod"]);

        let prod = registry.get("prod").unwrap();
        assert_eq!(prod.password, "secret");
        assert_eq!(prod.sslmode, SslMode::Require);
        assert_eq!(prod.port, 5432);
        assert_eq!(prod.allow_write, None);

        let dev = registry.get("my_dev").unwrap();
        assert_eq!(dev.port, 6543);
        assert_eq!(dev.allow_write, Some(true));
        assert_eq!(dev.description(), "Local sandbox");
    }

    #[test]
    fn test_incomplete_connection_skipped() {
        let mut config = GuardConfig::default();
        config
            .apply_env(&env(&[("CONN_half_HOST", "localhost"), ("CONN_half_USER", "u")]))
            .unwrap();
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_policy_env() {
        let mut config = GuardConfig::default();
        config
            .apply_env(&env(&[
                ("ALLOW_WRITE", "true"),
                ("ROW_LIMIT", "100"),
                ("QUERY_TIMEOUT_MS", "2500"),
                ("LOCKING_READS_ARE_WRITES", "on"),
            ]))
            .unwrap();
        let (_, policy) = config.into_parts().unwrap();
        assert!(policy.allow_write);
        assert_eq!(policy.row_limit, 100);
        assert_eq!(policy.query_timeout, Duration::from_millis(2500));
        assert!(policy.classifier.locking_reads_are_writes);
    }

    #[test]
    fn test_invalid_values_fail() {
        let mut config = GuardConfig::default();
        assert!(config.apply_env(&env(&[("ALLOW_WRITE", "sure")])).is_err());
        assert!(config.apply_env(&env(&[("ROW_LIMIT", "-5")])).is_err());
        assert!(config
            .apply_env(&env(&[
                ("CONN_x_HOST", "h"),
                ("CONN_x_DBNAME", "d"),
                ("CONN_x_USER", "u"),
                ("CONN_x_PORT", "abc"),
            ]))
            .is_err());
    }

    #[test]
    fn test_zero_row_limit_rejected() {
        let mut config = GuardConfig::default();
        config.apply_env(&env(&[("ROW_LIMIT", "0")])).unwrap();
        assert!(matches!(config.into_parts(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_toml_file() {
        let config = GuardConfig::from_toml_str(
            r#"
            [policy]
            row_limit = 250

            [[connections]]
            name = "main"
            host = "db1"
            database = "app"
            user = "reader"
            allow_write = true
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.row_limit, 250);
        assert_eq!(config.policy.query_timeout_ms, 15_000);
        assert_eq!(config.connections[0].allow_write, Some(true));
    }

    #[test]
    fn test_env_overrides_file_connection() {
        let mut config = GuardConfig::from_toml_str(
            r#"
            [[connections]]
            name = "main"
            host = "from-file"
            dbname = "app"
            user = "reader"
            "#,
        )
        .unwrap();
        config
            .apply_env(&env(&[
                ("CONN_main_HOST", "from-env"),
                ("CONN_main_DBNAME", "app"),
                ("CONN_main_USER", "reader"),
            ]))
            .unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.connections[0].host, "from-env");
    }

    #[test]
    fn test_duplicate_file_connections() {
        let config = GuardConfig::from_toml_str(
            r#"
            [[connections]]
            name = "main"
            host = "a"
            dbname = "app"
            user = "u"

            [[connections]]
            name = "main"
            host = "b"
            dbname = "app"
            user = "u"
            "#,
        )
        .unwrap();
        assert!(matches!(config.into_parts(), Err(ConfigError::DuplicateConnection(_))));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            GuardConfig::from_toml_str("[policy\nrow_limit = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
