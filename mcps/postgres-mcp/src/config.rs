//! Gateway configuration
//!
//! Layered once at startup: optional TOML file, then environment variables,
//! then CLI flags (applied by `main`). The result is immutable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sql_guard::config::{parse_number, GuardConfig};
use sql_guard::ConfigError;

const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

// ============================================================================
// Server Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name reported in MCP server info and health checks
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount point of the streamable HTTP MCP endpoint
    #[serde(default = "default_path")]
    pub path: String,

    /// Shared secret; access is open when unset
    #[serde(default)]
    pub token: Option<String>,
}

fn default_name() -> String {
    "postgres-mcp".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8799
}

fn default_path() -> String {
    "/mcp".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            path: default_path(),
            token: None,
        }
    }
}

impl ServerConfig {
    fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(token) = vars.get("MCP_TOKEN") {
            self.token = Some(token.clone());
        }
        if let Some(name) = vars.get("MCP_SERVER_NAME") {
            self.name = name.clone();
        }
        if let Some(path) = vars.get("MCP_PATH") {
            self.path = path.clone();
        }
        if let Some(host) = vars.get("MCP_HOST") {
            self.host = host.clone();
        }
        if let Some(port) = vars.get("MCP_PORT") {
            self.port = parse_number("MCP_PORT", port)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        self.token = self.token.take().filter(|t| !t.trim().is_empty());

        let path = self.path.trim().trim_end_matches('/');
        if !path.starts_with('/') || path.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MCP_PATH".to_string(),
                value: self.path.clone(),
                reason: "must start with '/' and not be the root".to_string(),
            });
        }
        self.path = path.to_string();
        Ok(())
    }

    pub fn auth_enabled(&self) -> bool {
        self.token.is_some()
    }
}

// ============================================================================
// Application Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(flatten)]
    pub guard: GuardConfig,
}

impl AppConfig {
    /// Load from the config file (if any) and the process environment
    pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();

        let contents = match resolve_config_path(explicit_path, &vars) {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                tracing::info!("Loaded config from {}", path.display());
                Some(contents)
            }
            None => None,
        };

        Self::from_sources(contents.as_deref(), &vars).context("Invalid configuration")
    }

    /// Pure layering of file contents and environment variables
    pub fn from_sources(
        file_contents: Option<&str>,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file_contents {
            Some(contents) => toml::from_str::<AppConfig>(contents)?,
            None => AppConfig::default(),
        };
        config.server.apply_env(vars)?;
        config.guard.apply_env(vars)?;
        config.server.validate()?;
        Ok(config)
    }
}

/// Explicit path, then `GATEWAY_CONFIG_PATH`, then the user config directory.
/// Explicit locations must exist; the default location is optional.
fn resolve_config_path(explicit: Option<&Path>, vars: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = vars.get(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("postgres-mcp").join("config.toml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_sources(None, &HashMap::new()).unwrap();
        assert_eq!(config.server.name, "postgres-mcp");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8799);
        assert_eq!(config.server.path, "/mcp");
        assert!(!config.server.auth_enabled());
        assert_eq!(config.guard.policy.row_limit, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_sources(
            None,
            &env(&[
                ("MCP_TOKEN", "s3cret"),
                ("MCP_PORT", "9000"),
                ("MCP_PATH", "/gateway/"),
                ("MCP_SERVER_NAME", "fleet-db"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.token.as_deref(), Some("s3cret"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.path, "/gateway");
        assert_eq!(config.server.name, "fleet-db");
    }

    #[test]
    fn test_blank_token_disables_auth() {
        let config = AppConfig::from_sources(None, &env(&[("MCP_TOKEN", "  ")])).unwrap();
        assert!(!config.server.auth_enabled());
    }

    #[test]
    fn test_invalid_path_rejected() {
        for path in ["/", "mcp", ""] {
            let result = AppConfig::from_sources(None, &env(&[("MCP_PATH", path)]));
            assert!(result.is_err(), "{:?}", path);
        }
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(AppConfig::from_sources(None, &env(&[("MCP_PORT", "http")])).is_err());
    }

    #[test]
    fn test_file_then_env() {
        let file = r#"
            [server]
            port = 9100
            token = "from-file"

            [policy]
            allow_write = true
            query_timeout_ms = 5000

            [[connections]]
            name = "main"
            host = "db1"
            dbname = "app"
            user = "reader"
        "#;
        let config = AppConfig::from_sources(Some(file), &env(&[("MCP_PORT", "9200")])).unwrap();
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.server.token.as_deref(), Some("from-file"));
        assert!(config.guard.policy.allow_write);
        assert_eq!(config.guard.policy.query_timeout_ms, 5000);
        assert_eq!(config.guard.connections.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nrow_limit = 42").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.guard.policy.row_limit, 42);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/postgres-mcp.toml")));
        assert!(result.is_err());
    }
}
