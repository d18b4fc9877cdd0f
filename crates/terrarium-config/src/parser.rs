//! Descriptor parser with environment variable substitution

use crate::{
    ConfigError, DatabaseRequest, EnvSource, EnvVar, HealthCheck, ImageSource, Result, Route,
    Runtime, ServiceDescriptor, Volume,
};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the descriptor file inside each app directory
pub const DESCRIPTOR_FILE: &str = "app-config.yml";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEALTH_PATH: &str = "/health";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDescriptor {
    name: Option<String>,
    description: Option<String>,
    docker: Option<RawDocker>,
    runtime: Option<RawRuntime>,
    routes: Option<Vec<RawRoute>>,
    dependencies: Option<Vec<String>>,
    health_checks: Option<BTreeMap<String, RawHealthCheck>>,
    volumes: Option<Vec<RawVolume>>,
    databases: Option<Vec<RawDatabase>>,
    environment: Option<Vec<RawEnvVar>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocker {
    build_context: Option<PathBuf>,
    dockerfile: Option<String>,
    image_name: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRuntime {
    port: Option<i64>,
    health_check_path: Option<String>,
    startup_timeout: Option<u64>,
    port_forward: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoute {
    path: String,
    target: Option<String>,
    strip_prefix: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHealthCheck {
    path: Option<String>,
    port: Option<i64>,
    period_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    failure_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVolume {
    name: String,
    mount_path: String,
    size: Option<String>,
    access_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDatabase {
    #[serde(rename = "type")]
    engine: Option<String>,
    name: String,
    enabled: Option<bool>,
    init_scripts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEnvVar {
    name: String,
    value: Option<serde_yaml::Value>,
    value_from: Option<String>,
}

/// Parse one descriptor, substituting `${VAR}` references from the process environment.
///
/// `fallback_name` is used when the descriptor has no `name` field, normally the
/// app directory name.
pub fn parse_descriptor(content: &str, fallback_name: &str) -> Result<ServiceDescriptor> {
    parse_descriptor_with(content, fallback_name, |var| std::env::var(var).ok())
}

/// Like [`parse_descriptor`] with an explicit variable lookup
pub fn parse_descriptor_with<F>(
    content: &str,
    fallback_name: &str,
    lookup: F,
) -> Result<ServiceDescriptor>
where
    F: Fn(&str) -> Option<String>,
{
    let content = substitute_with(content, lookup)?;
    let raw: RawDescriptor = if content.trim().is_empty() {
        RawDescriptor::default()
    } else {
        serde_yaml::from_str(&content)?
    };

    let mut errors = Vec::new();
    let descriptor = build_descriptor(raw, fallback_name, &mut errors);
    if errors.is_empty() {
        Ok(descriptor)
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

fn build_descriptor(
    raw: RawDescriptor,
    fallback_name: &str,
    errors: &mut Vec<String>,
) -> ServiceDescriptor {
    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| fallback_name.to_string());
    if name.is_empty() {
        errors.push("name is required".to_string());
    } else if !is_dns_label(&name) {
        errors.push(format!(
            "name '{}' must be lowercase alphanumerics and '-', at most 63 characters",
            name
        ));
    }

    let raw_runtime = raw.runtime.unwrap_or_default();
    let port = checked_port(raw_runtime.port, DEFAULT_PORT, "runtime.port", errors);
    let port_forward = raw_runtime.port_forward.and_then(|p| {
        let checked = u16::try_from(p).ok().filter(|p| *p != 0);
        if checked.is_none() {
            errors.push(format!(
                "runtime.port_forward {} is not a valid host port",
                p
            ));
        }
        checked
    });
    let runtime = Runtime {
        port,
        health_check_path: raw_runtime
            .health_check_path
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
        startup_timeout: raw_runtime.startup_timeout.unwrap_or(30),
        port_forward,
    };

    let docker = raw.docker.unwrap_or_default();
    let image_name = docker
        .image_name
        .unwrap_or_else(|| format!("edge-terrarium-{}", name));
    let tag = docker.tag.unwrap_or_else(|| "latest".to_string());
    let image = match docker.build_context {
        Some(context) => ImageSource::Build {
            context,
            dockerfile: docker.dockerfile.unwrap_or_else(|| "Dockerfile".to_string()),
            image_name,
            tag,
        },
        None => ImageSource::Prebuilt { image_name, tag },
    };

    let routes = raw
        .routes
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, route)| {
            if route.path.trim().is_empty() {
                errors.push(format!("routes[{}].path must not be empty", i));
            }
            Route {
                path: route.path,
                target: route.target.unwrap_or_else(|| "/".to_string()),
                strip_prefix: route.strip_prefix.unwrap_or(true),
            }
        })
        .collect();

    let health_checks = raw
        .health_checks
        .unwrap_or_default()
        .into_iter()
        .map(|(kind, check)| {
            let field = format!("health_checks.{}.port", kind);
            let check = HealthCheck {
                path: check
                    .path
                    .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
                port: checked_port(check.port, port, &field, errors),
                period_seconds: check.period_seconds.unwrap_or(30),
                timeout_seconds: check.timeout_seconds.unwrap_or(3),
                failure_threshold: check.failure_threshold.unwrap_or(3),
            };
            (kind, check)
        })
        .collect();

    let volumes = raw
        .volumes
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, volume)| {
            if volume.name.trim().is_empty() {
                errors.push(format!("volumes[{}].name must not be empty", i));
            }
            if volume.mount_path.trim().is_empty() {
                errors.push(format!("volumes[{}].mount_path must not be empty", i));
            }
            Volume {
                name: volume.name,
                mount_path: volume.mount_path,
                size: volume.size.unwrap_or_else(|| "1Gi".to_string()),
                access_mode: volume
                    .access_mode
                    .unwrap_or_else(|| "ReadWriteOnce".to_string()),
            }
        })
        .collect();

    let databases = raw
        .databases
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, db)| {
            if db.name.trim().is_empty() {
                errors.push(format!("databases[{}].name must not be empty", i));
            }
            DatabaseRequest {
                engine: db.engine.unwrap_or_else(|| "postgresql".to_string()),
                name: db.name,
                enabled: db.enabled.unwrap_or(true),
                init_scripts: db.init_scripts,
            }
        })
        .collect();

    let environment = raw
        .environment
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, var)| build_env_var(i, var, errors))
        .collect();

    ServiceDescriptor {
        name,
        description: raw.description.unwrap_or_default(),
        image,
        runtime,
        routes,
        dependencies: raw.dependencies.unwrap_or_default(),
        health_checks,
        volumes,
        databases,
        environment,
    }
}

fn build_env_var(index: usize, raw: RawEnvVar, errors: &mut Vec<String>) -> Option<EnvVar> {
    let label = if raw.name.is_empty() {
        format!("environment[{}]", index)
    } else {
        format!("environment '{}'", raw.name)
    };
    if raw.name.trim().is_empty() {
        errors.push(format!("{}: name must not be empty", label));
    }

    let source = match (raw.value, raw.value_from) {
        (Some(value), None) => EnvSource::Value(scalar_to_string(value)),
        (None, Some(reference)) => match parse_vault_reference(&reference) {
            Some((path, key)) => EnvSource::Vault { path, key },
            None => {
                errors.push(format!(
                    "{}: value_from '{}' must have the form vault:<path>#<key>",
                    label, reference
                ));
                return None;
            }
        },
        (Some(_), Some(_)) => {
            errors.push(format!(
                "{}: set exactly one of value or value_from, not both",
                label
            ));
            return None;
        }
        (None, None) => {
            errors.push(format!("{}: one of value or value_from is required", label));
            return None;
        }
    };

    Some(EnvVar {
        name: raw.name,
        source,
    })
}

fn scalar_to_string(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Split `vault:<path>#<key>` into its path and key
pub fn parse_vault_reference(reference: &str) -> Option<(String, String)> {
    let (path, key) = reference.strip_prefix("vault:")?.split_once('#')?;
    let valid = |s: &str| !s.is_empty() && !s.contains(char::is_whitespace);
    (valid(path) && valid(key) && !path.starts_with('/')).then(|| (path.to_string(), key.to_string()))
}

fn checked_port(value: Option<i64>, default: u16, field: &str, errors: &mut Vec<String>) -> u16 {
    match value {
        None => default,
        Some(p) => match u16::try_from(p) {
            Ok(port) if port != 0 => port,
            _ => {
                errors.push(format!("{} {} must be between 1 and 65535", field, p));
                default
            }
        },
    }
}

fn is_dns_label(name: &str) -> bool {
    name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Substitute environment variables in a string
///
/// Supports `${VAR}` and `${VAR:-default}`. Every unset variable without a
/// default is reported in a single error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    substitute_with(input, |var| std::env::var(var).ok())
}

/// Like [`substitute_env_vars`] with an explicit variable lookup
pub fn substitute_with<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}")?;
    let mut missing = Vec::new();

    let result = re.replace_all(input, |cap: &Captures<'_>| {
        let var_expr = &cap[1];

        // Handle default values: ${VAR:-default}
        let (var_name, default_value) = match var_expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (var_expr, None),
        };

        match (lookup(var_name), default_value) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result.into_owned())
}

/// Load every `apps/*/app-config.yml` under `apps_dir`.
///
/// Problems from all files are collected into one [`ConfigError::Invalid`].
/// Dependencies on unknown services are logged as warnings only.
pub fn load_descriptors(apps_dir: impl AsRef<Path>) -> Result<Vec<ServiceDescriptor>> {
    let apps_dir = apps_dir.as_ref();
    if !apps_dir.is_dir() {
        warn!("Apps directory {} does not exist", apps_dir.display());
        return Ok(Vec::new());
    }

    let read_err = |source| ConfigError::ReadError {
        path: apps_dir.to_path_buf(),
        source,
    };
    let mut app_dirs: Vec<PathBuf> = std::fs::read_dir(apps_dir)
        .map_err(read_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    app_dirs.sort();

    let mut descriptors = Vec::new();
    let mut errors = Vec::new();

    for app_dir in app_dirs {
        let file = app_dir.join(DESCRIPTOR_FILE);
        if !file.is_file() {
            debug!("Skipping {}: no {}", app_dir.display(), DESCRIPTOR_FILE);
            continue;
        }
        let content = std::fs::read_to_string(&file).map_err(|source| ConfigError::ReadError {
            path: file.clone(),
            source,
        })?;
        let fallback = app_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match parse_descriptor(&content, &fallback) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(ConfigError::Invalid(problems)) => errors.extend(
                problems
                    .into_iter()
                    .map(|p| format!("{}: {}", file.display(), p)),
            ),
            Err(other) => errors.push(format!("{}: {}", file.display(), other)),
        }
    }

    let mut seen = BTreeSet::new();
    for descriptor in &descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            errors.push(format!(
                "service name '{}' is declared more than once",
                descriptor.name
            ));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }

    for warning in unknown_dependencies(&descriptors) {
        warn!("{}", warning);
    }

    debug!("Loaded {} service descriptors", descriptors.len());
    Ok(descriptors)
}

/// Describe every dependency that names no known service
pub fn unknown_dependencies(descriptors: &[ServiceDescriptor]) -> Vec<String> {
    let known: BTreeSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    descriptors
        .iter()
        .flat_map(|d| {
            d.dependencies
                .iter()
                .filter(|dep| !known.contains(dep.as_str()))
                .map(move |dep| format!("Service '{}' depends on unknown service '{}'", d.name, dep))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_env_substitution() {
        let lookup = |var: &str| (var == "LOG_LEVEL").then(|| "debug".to_string());

        let result = substitute_with("level: ${LOG_LEVEL}", lookup).unwrap();
        assert_eq!(result, "level: debug");

        let result = substitute_with("port: ${FILE_STORAGE_PORT:-9000}", lookup).unwrap();
        assert_eq!(result, "port: 9000");
    }

    #[test]
    fn test_env_substitution_reports_all_missing() {
        let err = substitute_with("${ONE} ${TWO:-2} ${THREE}", no_env).unwrap_err();
        match err {
            ConfigError::EnvVarNotFound(vars) => assert_eq!(vars, "ONE, THREE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let d = parse_descriptor_with("description: sink\n", "service-sink", no_env).unwrap();

        assert_eq!(d.name, "service-sink");
        assert_eq!(d.runtime.port, 8080);
        assert_eq!(d.runtime.health_check_path, "/health");
        assert_eq!(d.runtime.startup_timeout, 30);
        assert_eq!(d.runtime.port_forward, None);
        assert_eq!(
            d.image,
            ImageSource::Prebuilt {
                image_name: "edge-terrarium-service-sink".to_string(),
                tag: "latest".to_string()
            }
        );
        assert!(d.dependencies.is_empty());
    }

    #[test]
    fn test_full_descriptor() {
        let yaml = r#"
name: custom-client
description: C client that reads secrets
docker:
  build_context: apps/custom-client
  image_name: edge-terrarium-custom-client
  tag: "0.2"
runtime:
  port: 1337
  health_check_path: /healthz
  port_forward: 1337
routes:
  - path: /fake-provider/
    target: /
  - path: /storage/
    strip_prefix: false
dependencies: [logthon, vault]
health_checks:
  readiness:
    path: /ready
    period_seconds: 5
volumes:
  - name: data
    mount_path: /data
databases:
  - name: orders
environment:
  - name: LOG_LEVEL
    value: INFO
  - name: MAX_CONNECTIONS
    value: 100
  - name: DB_PASSWORD
    value_from: vault:custom-client/database/orders#password
"#;
        let d = parse_descriptor_with(yaml, "ignored", no_env).unwrap();

        assert_eq!(d.name, "custom-client");
        assert_eq!(d.image_ref(), "edge-terrarium-custom-client:0.2");
        match &d.image {
            ImageSource::Build {
                context, dockerfile, ..
            } => {
                assert_eq!(context, Path::new("apps/custom-client"));
                assert_eq!(dockerfile, "Dockerfile");
            }
            other => panic!("expected build image, got {:?}", other),
        }
        assert_eq!(d.runtime.port_forward, Some(1337));
        assert_eq!(d.routes.len(), 2);
        assert_eq!(d.routes[0].target, "/");
        assert!(d.routes[0].strip_prefix);
        assert!(!d.routes[1].strip_prefix);
        assert_eq!(d.dependencies, vec!["logthon", "vault"]);

        let readiness = &d.health_checks["readiness"];
        assert_eq!(readiness.port, 1337);
        assert_eq!(readiness.period_seconds, 5);
        assert_eq!(readiness.timeout_seconds, 3);

        assert_eq!(d.volumes[0].size, "1Gi");
        assert_eq!(d.volumes[0].access_mode, "ReadWriteOnce");
        assert_eq!(d.databases[0].engine, "postgresql");
        assert!(d.databases[0].enabled);

        assert_eq!(d.environment[1].source, EnvSource::Value("100".to_string()));
        assert_eq!(
            d.environment[2].source,
            EnvSource::Vault {
                path: "custom-client/database/orders".to_string(),
                key: "password".to_string()
            }
        );
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = r#"
runtime:
  port: 0
  port_forward: 70000
routes:
  - target: /x
volumes:
  - name: ""
    mount_path: /data
databases:
  - type: postgresql
environment:
  - name: BOTH
    value: a
    value_from: vault:a#b
  - name: NEITHER
  - name: BROKEN
    value_from: vault:no-key
"#;
        let err = parse_descriptor_with(yaml, "bad", no_env).unwrap_err();
        let ConfigError::Invalid(errors) = err else {
            panic!("expected validation errors, got {err}");
        };

        assert_eq!(errors.len(), 8, "{:#?}", errors);
        assert!(errors.iter().any(|e| e.contains("runtime.port 0")));
        assert!(errors.iter().any(|e| e.contains("port_forward 70000")));
        assert!(errors.iter().any(|e| e.contains("routes[0].path")));
        assert!(errors.iter().any(|e| e.contains("volumes[0].name")));
        assert!(errors.iter().any(|e| e.contains("databases[0].name")));
        assert!(errors.iter().any(|e| e.contains("'BOTH'") && e.contains("not both")));
        assert!(errors.iter().any(|e| e.contains("'NEITHER'")));
        assert!(errors.iter().any(|e| e.contains("'BROKEN'") && e.contains("vault:<path>#<key>")));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = parse_descriptor_with("name: Bad_Name\n", "x", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref e) if e[0].contains("Bad_Name")));
    }

    #[test]
    fn test_null_dependencies_are_empty() {
        let d = parse_descriptor_with("dependencies:\n", "logthon", no_env).unwrap();
        assert!(d.dependencies.is_empty());
    }

    #[test]
    fn test_vault_reference_parsing() {
        assert_eq!(
            parse_vault_reference("vault:logthon/config#token"),
            Some(("logthon/config".to_string(), "token".to_string()))
        );
        assert_eq!(parse_vault_reference("vault:#token"), None);
        assert_eq!(parse_vault_reference("vault:path#"), None);
        assert_eq!(parse_vault_reference("env:path#key"), None);
    }

    #[test]
    fn test_unknown_dependencies() {
        let a = parse_descriptor_with("dependencies: [b, ghost]\n", "a", no_env).unwrap();
        let b = parse_descriptor_with("", "b", no_env).unwrap();

        let warnings = unknown_dependencies(&[a, b]);
        assert_eq!(
            warnings,
            vec!["Service 'a' depends on unknown service 'ghost'".to_string()]
        );
    }
}
