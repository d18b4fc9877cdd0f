//! Docker Compose deployments replayed against scripted tools and Vault

mod common;

use command_executor::ExitResult;
use common::{Project, VAULT};
use terrarium_orchestration::testing::descriptor;
use terrarium_orchestration::{
    ComposeBackend, DeployOptions, DeployPhase, DeploymentBackend, Error, MountOutcome,
};

const COMPOSE_FILE: &str = "configs/docker/docker-compose.yml";

fn project() -> Project {
    let project = Project::new();
    project.file(COMPOSE_FILE, "services: {}\n");
    project
}

fn compose_line(project: &Project, args: &str) -> String {
    format!(
        "docker-compose -f {} -p edge-terrarium {}",
        project.path(COMPOSE_FILE),
        args
    )
}

fn ps_line(project: &Project) -> String {
    compose_line(project, "ps -a --format json")
}

/// One `ps --format json` row per `(service, state)` pair, newline separated
fn ps_rows(rows: &[(&str, &str)]) -> String {
    rows.iter()
        .map(|(service, state)| {
            format!(
                r#"{{"Name":"edge-terrarium-{service}-1","Service":"{service}","State":"{state}"}}"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[smol_potat::test]
async fn test_compose_deploy_runs_every_phase_in_order() {
    let project = project();
    let vault_status = compose_line(&project, "exec -T vault vault status");
    project.launcher.respond_sequence(
        &vault_status,
        vec![
            ExitResult::failed(1, "connection refused"),
            ExitResult::failed(1, "connection refused"),
            ExitResult::ok("Sealed false"),
        ],
    );
    project.launcher.stdout(
        &ps_line(&project),
        &ps_rows(&[
            ("vault", "running"),
            ("a", "running"),
            ("b", "running"),
            ("c", "running"),
        ]),
    );
    project.transport.healthy_vault(VAULT);

    let services = vec![
        descriptor("c", &["b"]),
        descriptor("a", &[]),
        descriptor("b", &["a"]),
    ];
    let ctx = project.context(services, DeployOptions::default());
    let report = ComposeBackend.deploy(&ctx).await.unwrap();

    assert_eq!(report.phase, DeployPhase::Done);
    assert_eq!(report.order, vec!["a", "b", "c"]);
    assert!(report.warnings.is_empty());
    assert!(report.tunnels.is_empty());

    let secrets = report.secrets.unwrap();
    assert_eq!(secrets.mount, MountOutcome::Enabled);
    assert!(secrets.written.contains(&"custom-client/config".to_string()));
    assert!(secrets.written.contains(&"terrarium/tls".to_string()));

    assert_eq!(project.launcher.count(&vault_status), 3);
    let stop = project.index_of("k3d cluster stop edge-terrarium");
    let vault_up = project.index_of(&compose_line(&project, "up -d vault"));
    let all_up = project.index_of(&compose_line(&project, "up -d"));
    let ps = project.index_of(&ps_line(&project));
    assert!(stop < vault_up && vault_up < all_up && all_up < ps);
    assert!(!project.ran_exactly(&compose_line(&project, "down -v")));
}

#[smol_potat::test]
async fn test_vault_never_ready_is_a_warning() {
    let project = project();
    let vault_status = compose_line(&project, "exec -T vault vault status");
    project.launcher.fail(&vault_status, "dial tcp: connection refused");
    project.launcher.stdout(
        &ps_line(&project),
        r#"[{"Service":"vault","State":"running"}]"#,
    );
    project.transport.healthy_vault(VAULT);

    let ctx = project.context(vec![], DeployOptions::default());
    let report = ComposeBackend.deploy(&ctx).await.unwrap();

    assert_eq!(project.launcher.count(&vault_status), 30);
    assert_eq!(report.warnings, vec!["Vault may not be ready, continuing"]);
    assert_eq!(report.phase, DeployPhase::Done);
}

#[smol_potat::test]
async fn test_clean_flag_tears_down_before_bring_up() {
    let project = project();
    project
        .launcher
        .stdout(&ps_line(&project), &ps_rows(&[("vault", "running")]));
    project.transport.healthy_vault(VAULT);

    let ctx = project.context(
        vec![],
        DeployOptions {
            clean: true,
            build: false,
        },
    );
    ComposeBackend.deploy(&ctx).await.unwrap();

    let down = project.index_of(&compose_line(&project, "down -v"));
    let vault_up = project.index_of(&compose_line(&project, "up -d vault"));
    assert!(down < vault_up);
}

#[smol_potat::test]
async fn test_unreachable_vault_stops_before_bring_up() {
    let project = project();

    let ctx = project.context(vec![descriptor("logthon", &[])], DeployOptions::default());
    let err = ComposeBackend.deploy(&ctx).await.unwrap_err();

    assert!(matches!(err, Error::SecretStore(_)));
    assert!(project.ran_exactly(&compose_line(&project, "up -d vault")));
    assert!(!project.ran_exactly(&compose_line(&project, "up -d")));
}

#[smol_potat::test]
async fn test_containers_not_running_fails_verification() {
    let project = project();
    project
        .launcher
        .stdout(&ps_line(&project), &ps_rows(&[("vault", "exited")]));
    project.transport.healthy_vault(VAULT);

    let ctx = project.context(vec![], DeployOptions::default());
    let err = ComposeBackend.deploy(&ctx).await.unwrap_err();

    match err {
        Error::Provisioning { step, output, .. } => {
            assert_eq!(step, "Verification");
            assert!(output.contains("vault (exited)"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[smol_potat::test]
async fn test_one_exited_service_fails_even_when_vault_runs() {
    let project = project();
    project.launcher.stdout(
        &ps_line(&project),
        &ps_rows(&[
            ("vault", "running"),
            ("file-storage", "running"),
            ("logthon", "exited"),
        ]),
    );
    project.transport.healthy_vault(VAULT);

    let services = vec![
        descriptor("file-storage", &[]),
        descriptor("logthon", &[]),
        descriptor("custom-client", &[]),
    ];
    let ctx = project.context(services, DeployOptions::default());
    let err = ComposeBackend.deploy(&ctx).await.unwrap_err();

    match err {
        Error::Provisioning { step, output, .. } => {
            assert_eq!(step, "Verification");
            assert!(output.contains("logthon (exited)"));
            assert!(output.contains("custom-client (no container)"));
            assert!(!output.contains("file-storage ("));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[smol_potat::test]
async fn test_missing_tool_fails_before_any_command() {
    let project = project();
    project.launcher.missing_tool("docker-compose");

    let ctx = project.context(vec![], DeployOptions::default());
    let err = ComposeBackend.deploy(&ctx).await.unwrap_err();

    assert!(matches!(err, Error::Prerequisite(ref msg) if msg.contains("docker-compose")));
    assert!(project.launcher.commands().is_empty());
}

#[smol_potat::test]
async fn test_missing_compose_file_is_reported() {
    let project = Project::new();

    let ctx = project.context(vec![], DeployOptions::default());
    let err = ComposeBackend.deploy(&ctx).await.unwrap_err();

    assert!(matches!(err, Error::Prerequisite(ref msg) if msg.contains("Compose file")));
}
