use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RelaygateError, Result};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_DB_PATH: &str = "relaygate.db";
pub const DEFAULT_CONFIG_ENV: &str = "COVEN_CONFIG";

/// Top-level config — loaded from a single YAML file (`relaygate.yaml` by
/// default), overridable via the `COVEN_CONFIG` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaygateConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
}

impl Default for RelaygateConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: "change-me".to_string(),
                jwt_issuer: None,
            },
            registration: RegistrationConfig::default(),
        }
    }
}

/// Bind address for the single listener that serves the agent/pack control
/// streams, the client RPC stream, and the HTTP bridge surface — they're
/// just different axum routes on one router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_bind_addr")]
    pub addr: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { addr: default_bind_addr() }
    }
}

fn default_bind_addr() -> String {
    format!("{DEFAULT_BIND}:{DEFAULT_PORT}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

/// JWT bearer auth settings — see §6 "Authentication metadata".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
}

/// Controls whether an unrecognized SSH fingerprint is auto-registered as a
/// pending principal (per §4.2) or rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "bool_true")]
    pub auto_register_unknown_fingerprints: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            auto_register_unknown_fingerprints: true,
        }
    }
}

fn bool_true() -> bool {
    true
}

impl RelaygateConfig {
    /// Load config from a YAML file, honoring `COVEN_CONFIG` as an override
    /// for the file path when `config_path` isn't supplied explicitly.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var(DEFAULT_CONFIG_ENV).ok())
            .unwrap_or_else(|| "relaygate.yaml".to_string());

        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: RelaygateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| RelaygateError::Config(format!("{path}: {e}")))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RelaygateConfig::load(Some("/nonexistent/relaygate.yaml")).unwrap();
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaygate.yaml");
        std::fs::write(
            &path,
            "auth:\n  jwt_secret: topsecret\ndatabase:\n  path: /tmp/x.db\n",
        )
        .unwrap();

        let config = RelaygateConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.auth.jwt_secret, "topsecret");
        assert_eq!(config.database.path, "/tmp/x.db");
    }
}
