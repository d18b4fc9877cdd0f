use crate::VaultCommands;
use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use std::path::Path;
use terrarium_config::{SecretData, SecretsFile};
use terrarium_orchestration::{DeployContext, DeployOptions, initialize_secrets, tls_secret};

pub async fn run(project_dir: &Path, command: VaultCommands) -> Result<()> {
    let ctx = DeployContext::load(project_dir, DeployOptions::default())
        .context("Failed to load project configuration")?;

    match command {
        VaultCommands::Init => init(&ctx).await,
        VaultCommands::Status => status(&ctx).await,
        VaultCommands::Secrets => list(&ctx).await,
        VaultCommands::Get { path } => get(&ctx, &path).await,
        VaultCommands::Set { path, data } => set(&ctx, &path, &data).await,
    }
}

async fn init(ctx: &DeployContext) -> Result<()> {
    let store = ctx.secret_store();
    println!("Initializing Vault at {}...", store.address());

    let secrets = SecretsFile::load(ctx.layout.secrets_file())?;
    let tls = tls_secret(
        &ctx.layout.cert_file(&ctx.settings),
        &ctx.layout.key_file(&ctx.settings),
    )?;
    let report = initialize_secrets(&store, &secrets, tls, &ctx.services).await?;

    for path in &report.written {
        println!("  ✓ {}", path);
    }
    for (path, reason) in &report.failed {
        println!("  ✗ {}: {}", path, reason);
    }
    if !report.failed.is_empty() {
        bail!("{} secrets could not be stored", report.failed.len());
    }
    println!("✓ Vault initialized");
    Ok(())
}

async fn status(ctx: &DeployContext) -> Result<()> {
    let store = ctx.secret_store();
    let health = store
        .health()
        .await
        .with_context(|| format!("Vault is not accessible at {}", store.address()))?;

    println!("Vault at {}", store.address());
    println!("  Initialized: {}", health.initialized);
    println!("  Sealed: {}", health.sealed);
    if let Some(version) = &health.version {
        println!("  Version: {}", version);
    }
    if let Some(cluster) = &health.cluster_name {
        println!("  Cluster: {}", cluster);
    }
    Ok(())
}

async fn list(ctx: &DeployContext) -> Result<()> {
    let keys = ctx.secret_store().list().await?;
    if keys.is_empty() {
        println!("No secrets stored");
    }
    for key in keys {
        println!("{}", key);
    }
    Ok(())
}

async fn get(ctx: &DeployContext, path: &str) -> Result<()> {
    let data = ctx
        .secret_store()
        .read(path)
        .await?
        .ok_or_else(|| anyhow!("No secret at {}", path))?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

async fn set(ctx: &DeployContext, path: &str, data: &str) -> Result<()> {
    let payload = parse_payload(data)?;
    ctx.secret_store().write(path, &payload).await?;
    println!("✓ Stored {}", path);
    Ok(())
}

fn parse_payload(data: &str) -> Result<SecretData> {
    match serde_json::from_str(data).context("Secret data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Secret data must be a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        let payload = parse_payload(r#"{"api_key": "abc", "retries": 3}"#).unwrap();
        assert_eq!(payload["api_key"], "abc");
        assert_eq!(payload["retries"], 3);

        assert!(parse_payload("[1, 2]").is_err());
        assert!(parse_payload("api_key=abc").is_err());
    }
}
