//! Loading descriptors from an apps directory on disk

use std::fs;
use std::path::Path;
use terrarium_config::{ConfigError, load_descriptors};

fn write_app(apps: &Path, dir: &str, content: &str) {
    let app_dir = apps.join(dir);
    fs::create_dir_all(&app_dir).unwrap();
    fs::write(app_dir.join("app-config.yml"), content).unwrap();
}

#[test]
fn test_loads_every_app_in_directory_order() {
    let root = tempfile::tempdir().unwrap();
    let apps = root.path().join("apps");
    write_app(
        &apps,
        "logthon",
        "runtime:\n  port: 5000\n  port_forward: 5001\n",
    );
    write_app(
        &apps,
        "file-storage",
        "name: file-storage\nruntime:\n  port: 9000\ndependencies: [logthon]\n",
    );
    // Directories without a descriptor are skipped.
    fs::create_dir_all(apps.join("shared")).unwrap();

    let descriptors = load_descriptors(&apps).unwrap();
    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["file-storage", "logthon"]);
    assert_eq!(descriptors[1].runtime.port_forward, Some(5001));
}

#[test]
fn test_missing_apps_directory_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let descriptors = load_descriptors(root.path().join("apps")).unwrap();
    assert!(descriptors.is_empty());
}

#[test]
fn test_errors_from_all_files_are_collected() {
    let root = tempfile::tempdir().unwrap();
    let apps = root.path().join("apps");
    write_app(&apps, "a", "runtime:\n  port: 0\n");
    write_app(&apps, "b", "volumes:\n  - mount_path: /data\n");
    write_app(&apps, "c", "name: a\n");

    let Err(ConfigError::Invalid(errors)) = load_descriptors(&apps) else {
        panic!("expected validation errors");
    };

    assert_eq!(errors.len(), 2, "{:#?}", errors);
    assert!(errors[0].contains("a/app-config.yml") && errors[0].contains("runtime.port"));
    assert!(errors[1].contains("b/app-config.yml") && errors[1].contains("volumes[0].name"));
}

#[test]
fn test_duplicate_names_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let apps = root.path().join("apps");
    write_app(&apps, "a", "");
    write_app(&apps, "b", "name: a\n");

    let Err(ConfigError::Invalid(errors)) = load_descriptors(&apps) else {
        panic!("expected duplicate name error");
    };
    assert_eq!(errors, vec!["service name 'a' is declared more than once"]);
}

#[test]
fn test_unknown_dependency_is_only_a_warning() {
    let root = tempfile::tempdir().unwrap();
    let apps = root.path().join("apps");
    write_app(&apps, "custom-client", "dependencies: [ghost]\n");

    let descriptors = load_descriptors(&apps).unwrap();
    assert_eq!(descriptors[0].dependencies, vec!["ghost"]);
}

#[test]
fn test_yaml_syntax_error_names_the_file() {
    let root = tempfile::tempdir().unwrap();
    let apps = root.path().join("apps");
    write_app(&apps, "broken", "runtime: [port: 1\n");

    let Err(ConfigError::Invalid(errors)) = load_descriptors(&apps) else {
        panic!("expected an error");
    };
    assert!(errors[0].contains("broken/app-config.yml"));
    assert!(errors[0].contains("Failed to parse YAML"));
}
