//! Vault client and the secret seeding performed during a deploy

use crate::context::sleep;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use terrarium_config::{SecretData, SecretsFile, ServiceDescriptor};
use tracing::{debug, info, warn};

/// Path of the TLS material inside the kv mount
pub const TLS_SECRET_PATH: &str = "terrarium/tls";

const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";
const PASSWORD_LENGTH: usize = 32;

/// Everything but RFC 3986 unreserved characters is escaped in userinfo
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Outcome of enabling the kv-v2 mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// The mount was created
    Enabled,
    /// The mount existed already, or Vault refused in a way treated as such
    AlreadyEnabled,
}

/// Body of `GET /v1/sys/health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultHealth {
    /// Whether Vault is initialized
    pub initialized: bool,
    /// Whether Vault is sealed
    pub sealed: bool,
    /// Whether this node is a standby
    pub standby: bool,
    /// Server version
    pub version: Option<String>,
    /// Cluster name
    pub cluster_name: Option<String>,
}

/// HTTP client for the Vault API
#[derive(Clone)]
pub struct SecretStore {
    base_url: String,
    token: String,
    http: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl SecretStore {
    /// Client for the Vault at `base_url`, authenticating with `token`
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
            timeout: Duration::from_secs(10),
        }
    }

    /// Use `timeout` for every request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL of the Vault API
    pub fn address(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, endpoint: &str) -> Result<HttpResponse> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, endpoint))
            .header("X-Vault-Token", &self.token)
            .timeout(self.timeout);
        self.http.send(request).await
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<HttpResponse> {
        let request = HttpRequest::post(format!("{}{}", self.base_url, endpoint), body)
            .header("X-Vault-Token", &self.token)
            .timeout(self.timeout);
        self.http.send(request).await
    }

    /// `GET /v1/sys/health`; anything but 200 is an error
    pub async fn health(&self) -> Result<VaultHealth> {
        let response = self.get("/v1/sys/health").await?;
        if response.status != 200 {
            return Err(Error::SecretStore(format!(
                "health check returned {}",
                response.status
            )));
        }
        // Older Vault builds may return an empty body.
        Ok(response.json().unwrap_or_default())
    }

    /// Poll [`SecretStore::health`] until it succeeds or `attempts` run out
    pub async fn wait_until_healthy(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=attempts {
            match self.health().await {
                Ok(_) => return true,
                Err(e) => debug!("Vault not healthy yet ({}/{}): {}", attempt, attempts, e),
            }
            if attempt < attempts {
                sleep(interval).await;
            }
        }
        false
    }

    /// Enable the kv-v2 engine at `secret/`
    pub async fn enable_kv_v2(&self) -> Result<MountOutcome> {
        let response = self
            .post(
                "/v1/sys/mounts/secret",
                json!({"type": "kv", "options": {"version": "2"}}),
            )
            .await?;

        match response.status {
            200 | 204 => {
                info!("KV secrets engine enabled");
                Ok(MountOutcome::Enabled)
            }
            400 if mentions_existing_mount(&response.body) => {
                info!("KV secrets engine already enabled");
                Ok(MountOutcome::AlreadyEnabled)
            }
            status => {
                warn!(
                    "KV secrets engine may already be enabled (mount returned {}: {})",
                    status,
                    response.body.trim()
                );
                Ok(MountOutcome::AlreadyEnabled)
            }
        }
    }

    /// Write `data` at `path` under the kv mount
    pub async fn write(&self, path: &str, data: &SecretData) -> Result<()> {
        let response = self
            .post(&format!("/v1/secret/data/{}", path), json!({ "data": data }))
            .await?;
        if response.is_success() {
            debug!("Stored secret {}", path);
            Ok(())
        } else {
            Err(Error::SecretStore(format!(
                "writing {} returned {}: {}",
                path,
                response.status,
                response.body.trim()
            )))
        }
    }

    /// Read the latest version of `path`; `None` if it does not exist
    pub async fn read(&self, path: &str) -> Result<Option<SecretData>> {
        let response = self.get(&format!("/v1/secret/data/{}", path)).await?;
        match response.status {
            200 => {
                let body: Value = response.json()?;
                match body.pointer("/data/data") {
                    Some(Value::Object(data)) => Ok(Some(data.clone())),
                    _ => Ok(Some(SecretData::new())),
                }
            }
            404 => Ok(None),
            status => Err(Error::SecretStore(format!(
                "reading {} returned {}",
                path, status
            ))),
        }
    }

    /// List the top-level keys of the kv mount
    pub async fn list(&self) -> Result<Vec<String>> {
        let response = self.get("/v1/secret/metadata?list=true").await?;
        match response.status {
            200 => {
                let body: Value = response.json()?;
                Ok(body
                    .pointer("/data/keys")
                    .and_then(Value::as_array)
                    .map(|keys| {
                        keys.iter()
                            .filter_map(|k| k.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default())
            }
            404 => Ok(Vec::new()),
            status => Err(Error::SecretStore(format!("listing secrets returned {}", status))),
        }
    }
}

fn mentions_existing_mount(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("already") || body.contains("existing mount")
}

/// Generated credentials for one requested database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    /// Service hostname, `<app>-<db>-db`
    pub host: String,
    /// Port
    pub port: u16,
    /// Login role, `<app>_<db>_user`
    pub username: String,
    /// Random password
    pub password: String,
    /// Database name
    pub database_name: String,
}

impl DatabaseCredentials {
    /// Generate credentials with a fresh random password
    pub fn generate(app: &str, database: &str) -> Self {
        Self::generate_with(app, database, &mut rand::thread_rng())
    }

    /// Generate credentials drawing the password from `rng`
    pub fn generate_with<R: Rng>(app: &str, database: &str, rng: &mut R) -> Self {
        let password = (0..PASSWORD_LENGTH)
            .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
            .collect();
        Self {
            host: format!("{}-{}-db", app, database),
            port: 5432,
            username: format!("{}_{}_user", app, database),
            password,
            database_name: database.to_string(),
        }
    }

    /// Vault path the credentials are stored at
    pub fn secret_path(app: &str, database: &str) -> String {
        format!("{}/database/{}", app, database)
    }

    /// Connection URL with the credentials percent-encoded
    pub fn url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.username, USERINFO),
            utf8_percent_encode(&self.password, USERINFO),
            self.host,
            self.port,
            self.database_name
        )
    }

    /// Secret payload stored in Vault
    pub fn to_secret_data(&self) -> SecretData {
        let value = json!({
            "host": self.host,
            "port": self.port.to_string(),
            "username": self.username,
            "password": self.password,
            "database_name": self.database_name,
            "url": self.url(),
        });
        match value {
            Value::Object(map) => map,
            _ => SecretData::new(),
        }
    }
}

/// Base64-encoded certificate and key, when both files exist
pub fn tls_secret(cert_file: &Path, key_file: &Path) -> Result<Option<SecretData>> {
    if !cert_file.is_file() || !key_file.is_file() {
        return Ok(None);
    }
    let cert = BASE64.encode(std::fs::read(cert_file)?);
    let key = BASE64.encode(std::fs::read(key_file)?);

    let mut data = SecretData::new();
    data.insert("cert".to_string(), Value::String(cert));
    data.insert("key".to_string(), Value::String(key));
    Ok(Some(data))
}

/// What [`initialize_secrets`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretInitReport {
    /// Result of enabling the kv mount
    pub mount: MountOutcome,
    /// Paths written successfully, in write order
    pub written: Vec<String>,
    /// Paths that failed with the reason
    pub failed: Vec<(String, String)>,
}

impl SecretInitReport {
    fn record(&mut self, path: String, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.written.push(path),
            Err(e) => {
                warn!("Failed to store secret {}: {}", path, e);
                self.failed.push((path, e.to_string()));
            }
        }
    }
}

/// Seed Vault: enable the kv mount, write the configured secrets, the TLS
/// material and one credential set per enabled database.
///
/// An unreachable Vault is an error; individual write failures are
/// collected in the report.
pub async fn initialize_secrets(
    store: &SecretStore,
    secrets: &SecretsFile,
    tls: Option<SecretData>,
    services: &[ServiceDescriptor],
) -> Result<SecretInitReport> {
    store.health().await.map_err(|e| {
        Error::SecretStore(format!(
            "Vault is not accessible at {}: {}",
            store.address(),
            e
        ))
    })?;

    let mut report = SecretInitReport {
        mount: store.enable_kv_v2().await?,
        written: Vec::new(),
        failed: Vec::new(),
    };

    for (path, data) in &secrets.secrets {
        let outcome = store.write(path, data).await;
        report.record(path.clone(), outcome);
    }

    if let Some(tls) = tls {
        let outcome = store.write(TLS_SECRET_PATH, &tls).await;
        report.record(TLS_SECRET_PATH.to_string(), outcome);
    }

    for service in services {
        for database in service.enabled_databases() {
            if database.engine != "postgresql" {
                warn!(
                    "Skipping database {} of {}: unsupported type {}",
                    database.name, service.name, database.engine
                );
                continue;
            }
            let credentials = DatabaseCredentials::generate(&service.name, &database.name);
            let path = DatabaseCredentials::secret_path(&service.name, &database.name);
            let outcome = store.write(&path, &credentials.to_secret_data()).await;
            report.record(path, outcome);
        }
    }

    info!(
        "Stored {} secrets ({} failed)",
        report.written.len(),
        report.failed.len()
    );
    Ok(report)
}
