//! Apply order of the generated cluster manifests and stale resource detection

use crate::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Vault manifests, applied on their own before everything else
pub const VAULT_MANIFESTS: [&str; 3] = ["vault-pvc.yaml", "vault-deployment.yaml", "vault-service.yaml"];

/// Gateway configuration, applied ahead of Vault
pub const GATEWAY_CONFIG_MANIFEST: &str = "nginx-configmap.yaml";

/// Files in the manifest directory that the bulk apply skips
pub const EXCLUDED_MANIFESTS: [&str; 7] = [
    "vault-pvc.yaml",
    "vault-deployment.yaml",
    "vault-service.yaml",
    "kustomization.yaml",
    "namespace.yaml",
    "nginx-ingress-controller.yaml",
    GATEWAY_CONFIG_MANIFEST,
];

/// Deployments never pruned
pub const PROTECTED_DEPLOYMENTS: [&str; 2] = ["nginx", "vault"];

/// Services never pruned
pub const PROTECTED_SERVICES: [&str; 4] = ["nginx", "vault", "kubernetes", "kube-dns"];

/// Resource group of a manifest file; groups are applied in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestKind {
    /// Persistent volume claims
    StorageClaim,
    /// ConfigMaps and Secrets
    ConfigOrSecret,
    /// Deployments
    Deployment,
    /// Services
    Service,
    /// Anything else, e.g. ingresses
    Other,
}

impl ManifestKind {
    /// Human readable group name
    pub fn label(self) -> &'static str {
        match self {
            ManifestKind::StorageClaim => "PVCs",
            ManifestKind::ConfigOrSecret => "ConfigMaps and Secrets",
            ManifestKind::Deployment => "Deployments",
            ManifestKind::Service => "Services",
            ManifestKind::Other => "Other resources",
        }
    }
}

/// Classify a manifest by its file name.
///
/// The `-<kind>` suffix decides first, so `service-sink-deployment.yaml` is a
/// deployment; names without a known suffix fall back to a substring match.
pub fn classify(file_name: &str) -> ManifestKind {
    let stem = file_name
        .strip_suffix(".yaml")
        .or_else(|| file_name.strip_suffix(".yml"))
        .unwrap_or(file_name);

    const SUFFIXES: [(&str, ManifestKind); 6] = [
        ("-pvc", ManifestKind::StorageClaim),
        ("-configmap", ManifestKind::ConfigOrSecret),
        ("-secret", ManifestKind::ConfigOrSecret),
        ("-secrets", ManifestKind::ConfigOrSecret),
        ("-deployment", ManifestKind::Deployment),
        ("-service", ManifestKind::Service),
    ];
    if let Some((_, kind)) = SUFFIXES.iter().find(|(suffix, _)| stem.ends_with(suffix)) {
        return *kind;
    }

    if stem.contains("pvc") {
        ManifestKind::StorageClaim
    } else if stem.contains("configmap") || stem.contains("secret") {
        ManifestKind::ConfigOrSecret
    } else if stem.contains("deployment") {
        ManifestKind::Deployment
    } else if stem.contains("service") {
        ManifestKind::Service
    } else {
        ManifestKind::Other
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Sort manifest paths into apply order: by group, then alphabetically
pub fn order_manifests(mut paths: Vec<PathBuf>) -> Vec<(ManifestKind, PathBuf)> {
    paths.sort_by(|a, b| file_name(a).cmp(file_name(b)));
    let mut ordered: Vec<(ManifestKind, PathBuf)> = paths
        .into_iter()
        .map(|path| (classify(file_name(&path)), path))
        .collect();
    // Stable sort keeps the alphabetical order inside each group.
    ordered.sort_by_key(|(kind, _)| *kind);
    ordered
}

/// Every `.yaml` manifest under `dir` except the excluded ones, in apply order
pub fn plan_apply(dir: &Path) -> Result<Vec<(ManifestKind, PathBuf)>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = file_name(&path);
        if path.is_file() && name.ends_with(".yaml") && !EXCLUDED_MANIFESTS.contains(&name) {
            paths.push(path);
        }
    }
    Ok(order_manifests(paths))
}

/// Names in `existing` that are neither current nor protected, sorted
pub fn stale_resources<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    current: &BTreeSet<String>,
    protected: &[&str],
) -> Vec<String> {
    existing
        .into_iter()
        .filter(|name| !current.contains(*name) && !protected.contains(name))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ordered: &[(ManifestKind, PathBuf)]) -> Vec<&str> {
        ordered.iter().map(|(_, p)| file_name(p)).collect()
    }

    #[test]
    fn test_classify_prefers_suffix() {
        assert_eq!(classify("service-sink-deployment.yaml"), ManifestKind::Deployment);
        assert_eq!(classify("service-sink-service.yaml"), ManifestKind::Service);
        assert_eq!(classify("file-storage-pvc.yaml"), ManifestKind::StorageClaim);
        assert_eq!(classify("custom-client-secrets.yaml"), ManifestKind::ConfigOrSecret);
        assert_eq!(classify("ingress.yaml"), ManifestKind::Other);
        assert_eq!(classify("pvc-defaults.yaml"), ManifestKind::StorageClaim);
    }

    #[test]
    fn test_pvc_applied_before_deployment() {
        let ordered = order_manifests(vec![
            PathBuf::from("k3s/logthon-service.yaml"),
            PathBuf::from("k3s/logthon-deployment.yaml"),
            PathBuf::from("k3s/ingress.yaml"),
            PathBuf::from("k3s/logthon-pvc.yaml"),
            PathBuf::from("k3s/file-storage-deployment.yaml"),
            PathBuf::from("k3s/file-storage-pvc.yaml"),
            PathBuf::from("k3s/nginx-configmap-extra.yaml"),
        ]);

        assert_eq!(
            names(&ordered),
            vec![
                "file-storage-pvc.yaml",
                "logthon-pvc.yaml",
                "nginx-configmap-extra.yaml",
                "file-storage-deployment.yaml",
                "logthon-deployment.yaml",
                "logthon-service.yaml",
                "ingress.yaml",
            ]
        );
    }

    #[test]
    fn test_plan_apply_skips_excluded_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "vault-deployment.yaml",
            "vault-pvc.yaml",
            "vault-service.yaml",
            "namespace.yaml",
            "kustomization.yaml",
            "nginx-ingress-controller.yaml",
            "nginx-configmap.yaml",
            "logthon-deployment.yaml",
            "logthon-pvc.yaml",
            "README.md",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let plan = plan_apply(dir.path()).unwrap();
        assert_eq!(names(&plan), vec!["logthon-pvc.yaml", "logthon-deployment.yaml"]);
    }

    #[test]
    fn test_protected_names_never_pruned() {
        let current: BTreeSet<String> = ["logthon".to_string()].into();
        let stale = stale_resources(
            ["nginx", "vault", "kubernetes", "kube-dns", "logthon", "old-app"],
            &current,
            &PROTECTED_SERVICES,
        );
        assert_eq!(stale, vec!["old-app"]);

        let stale = stale_resources(["nginx", "vault", "old-app", "kube-dns"], &current, &PROTECTED_DEPLOYMENTS);
        assert_eq!(stale, vec!["kube-dns", "old-app"]);
    }
}
