use anyhow::{Context, Result};
use std::path::Path;
use terrarium_orchestration::{
    BackendKind, DeployContext, DeployOptions, DeploymentReport, Error, TunnelReport, backend_for,
};

pub async fn run(project_dir: &Path, kind: BackendKind, clean: bool, build: bool) -> Result<()> {
    let ctx = DeployContext::load(project_dir, DeployOptions { clean, build })
        .context("Failed to load project configuration")?;

    println!(
        "Deploying {} services with {}...",
        ctx.services.len(),
        kind
    );

    let backend = backend_for(kind);
    match backend.deploy(&ctx).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Deployment failed");
            if let Some(hint) = failure_hint(&e) {
                eprintln!("  {}", hint);
            }
            Err(e.into())
        }
    }
}

/// Next step to suggest for errors the user can act on
fn failure_hint(error: &Error) -> Option<&'static str> {
    match error {
        Error::SecretStore(_) => Some(
            "Vault must be reachable before any service starts, since secrets are seeded first. \
             Check it with `terrarium vault status` and deploy again.",
        ),
        Error::Prerequisite(_) => {
            Some("Install the missing tool or generate the missing files, then deploy again.")
        }
        _ => None,
    }
}

fn print_report(report: &DeploymentReport) {
    println!("✓ Deployment finished ({})", report.phase);
    if !report.order.is_empty() {
        println!("  Order: {}", report.order.join(" -> "));
    }

    if let Some(secrets) = &report.secrets {
        println!(
            "  Secrets: {} stored, {} failed",
            secrets.written.len(),
            secrets.failed.len()
        );
    }

    if let Some(tunnels) = &report.tunnel_report {
        print_tunnels(tunnels);
    }

    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }

    println!();
    print!("{}", report.summary);
}

fn print_tunnels(report: &TunnelReport) {
    println!("  Port forwards:");
    for check in &report.checks {
        match (check.status, &check.error) {
            (Some(200), _) => println!("    ✓ {}", check.spec),
            (Some(status), _) => println!("    ⚠ {} (HTTP {})", check.spec, status),
            (None, Some(error)) => println!("    ⚠ {} ({})", check.spec, error),
            (None, None) => println!("    ⚠ {}", check.spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_vault_failure_explains_itself() {
        let error = Error::SecretStore(
            "Vault is not accessible at http://localhost:8200/: connection refused".to_string(),
        );
        let hint = failure_hint(&error).unwrap();
        assert!(hint.contains("Vault must be reachable"));
        assert!(hint.contains("terrarium vault status"));

        assert!(failure_hint(&Error::Prerequisite("docker-compose not found".to_string())).is_some());
        let timeout = Error::ReadinessTimeout {
            resource: "deployment/logthon".to_string(),
            diagnostics: String::new(),
        };
        assert!(failure_hint(&timeout).is_none());
    }
}
