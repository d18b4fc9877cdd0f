//! Secrets seeded into Vault at deploy time

use crate::{ConfigError, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Key/value payload of one secret
pub type SecretData = serde_json::Map<String, Value>;

/// Secrets keyed by `<app>/<category>` path
#[derive(Debug, Clone, PartialEq)]
pub struct SecretsFile {
    /// Secret payloads by path
    pub secrets: BTreeMap<String, SecretData>,
    /// Whether the built-in defaults were used
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
struct RawSecretsFile {
    secrets: Option<BTreeMap<String, SecretData>>,
}

impl SecretsFile {
    /// Load `path`, falling back to the built-in set when the file is absent,
    /// empty or has no `secrets` section.
    ///
    /// A file that exists but does not decode is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            warn!(
                "Secrets file {} not found, using default secrets",
                path.display()
            );
            return Ok(Self::defaults());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: Option<RawSecretsFile> = if content.trim().is_empty() {
            None
        } else {
            serde_yaml::from_str(&content)?
        };

        match raw.and_then(|r| r.secrets) {
            Some(secrets) => {
                debug!("Loaded {} secrets from {}", secrets.len(), path.display());
                Ok(Self {
                    secrets,
                    is_default: false,
                })
            }
            None => {
                warn!(
                    "No secrets section found in {}, using default secrets",
                    path.display()
                );
                Ok(Self::defaults())
            }
        }
    }

    /// Built-in development secrets
    pub fn defaults() -> Self {
        let entries = [
            (
                "custom-client/config",
                json!({
                    "api_key": "mock-api-key-12345",
                    "database_url": "postgresql://user:pass@db:5432/app",
                    "jwt_secret": "mock-jwt-secret-67890",
                    "encryption_key": "mock-encryption-key-abcdef",
                    "log_level": "INFO",
                    "max_connections": "100"
                }),
            ),
            (
                "custom-client/external-apis",
                json!({
                    "file_storage_url": "http://file-storage:9000",
                    "logthon_url": "http://logthon:5000"
                }),
            ),
            (
                "terrarium/tls",
                json!({
                    "cert": "mock-tls-cert",
                    "key": "mock-tls-key"
                }),
            ),
        ];

        let secrets = entries
            .into_iter()
            .filter_map(|(path, value)| match value {
                Value::Object(map) => Some((path.to_string(), map)),
                _ => None,
            })
            .collect();

        Self {
            secrets,
            is_default: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = SecretsFile::load(dir.path().join("vault-secrets.yml")).unwrap();

        assert!(file.is_default);
        assert_eq!(
            file.secrets.keys().collect::<Vec<_>>(),
            vec![
                "custom-client/config",
                "custom-client/external-apis",
                "terrarium/tls"
            ]
        );
    }

    #[test]
    fn test_file_without_secrets_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault-secrets.yml");
        std::fs::write(&path, "version: 1\n").unwrap();

        assert!(SecretsFile::load(&path).unwrap().is_default);
    }

    #[test]
    fn test_file_secrets_keep_value_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault-secrets.yml");
        std::fs::write(
            &path,
            "secrets:\n  logthon/config:\n    retention_days: 7\n    ui_title: Logthon\n",
        )
        .unwrap();

        let file = SecretsFile::load(&path).unwrap();
        assert!(!file.is_default);
        let config = &file.secrets["logthon/config"];
        assert_eq!(config["retention_days"], json!(7));
        assert_eq!(config["ui_title"], json!("Logthon"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault-secrets.yml");
        std::fs::write(&path, "secrets: [not, a, map]\n").unwrap();

        assert!(matches!(
            SecretsFile::load(&path),
            Err(ConfigError::YamlError(_))
        ));
    }
}
