use anyhow::{Context, Result, bail};
use std::path::Path;
use terrarium_config::parser::unknown_dependencies;
use terrarium_config::{ConfigError, ProjectLayout, Settings, load_descriptors};
use terrarium_orchestration::resolve_order;

pub fn run(project_dir: &Path) -> Result<()> {
    let layout = ProjectLayout::new(project_dir);
    println!("Validating {}...", layout.root().display());

    let settings = Settings::load(layout.root()).context("Failed to load settings")?;
    settings.validate().context("Invalid settings")?;
    println!("✓ Settings valid");
    println!("  Project: {}", settings.project_name);
    println!("  Namespace: {}", settings.namespace);

    let services = match load_descriptors(layout.apps_dir()) {
        Ok(services) => services,
        Err(ConfigError::Invalid(problems)) => {
            println!("✗ {} problems in app descriptors:", problems.len());
            for problem in &problems {
                println!("  - {}", problem);
            }
            bail!("Validation failed");
        }
        Err(e) => return Err(e).context("Failed to load app descriptors"),
    };

    println!("✓ {} app descriptors valid", services.len());
    for service in &services {
        println!(
            "  {} ({}, port {})",
            service.name,
            service.image_ref(),
            service.runtime.port
        );
    }

    for warning in unknown_dependencies(&services) {
        println!("  ⚠ {}", warning);
    }

    let order = resolve_order(&services);
    if !order.order.is_empty() {
        println!("  Deploy order: {}", order.order.join(" -> "));
    }
    if !order.is_complete() {
        println!(
            "  ⚠ Dependencies of {} could not be resolved",
            order.unresolved.join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_empty_project_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path()).is_ok());
    }

    #[test]
    fn test_invalid_descriptor_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "apps/broken/app-config.yml",
            "name: broken\nruntime:\n  port: 0\n",
        );

        let err = run(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed");
    }
}
