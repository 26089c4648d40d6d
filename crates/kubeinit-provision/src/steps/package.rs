//! Package installation steps

use super::{CloudInitFragment, Step, guarded};
use crate::config::KubeVersion;
use crate::pkg::PackageManager;

/// Upstream package repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository id, also used for file names
    pub name: String,
    /// Base URL of the repository
    pub base_url: String,
    /// URL of the signing key
    pub key_url: String,
    /// Packages the repository pins (excluded from blanket upgrades)
    pub pinned: Vec<String>,
}

impl Repository {
    /// Kubernetes community repository for one minor release channel
    pub fn kubernetes_apt(version: &KubeVersion) -> Self {
        let base_url = format!(
            "https://pkgs.k8s.io/core:/stable:/{}/deb/",
            version.minor_channel()
        );
        Self {
            name: "kubernetes".into(),
            key_url: format!("{base_url}Release.key"),
            base_url,
            pinned: kubernetes_components(),
        }
    }

    /// Legacy Google-hosted Kubernetes RPM channel
    pub fn kubernetes_rpm() -> Self {
        Self {
            name: "kubernetes".into(),
            base_url: "https://packages.cloud.google.com/yum/repos/kubernetes-el7-$basearch".into(),
            key_url: "https://packages.cloud.google.com/yum/doc/rpm-package-key.gpg".into(),
            pinned: kubernetes_components(),
        }
    }
}

fn kubernetes_components() -> Vec<String> {
    ["kubelet", "kubeadm", "kubectl"].map(String::from).to_vec()
}

/// A package, optionally pinned to a Kubernetes release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<KubeVersion>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn pinned(name: impl Into<String>, version: KubeVersion) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
        }
    }
}

/// Install packages through the host's package manager
#[derive(Debug, Clone)]
pub struct InstallPackage {
    /// Packages installed together
    pub packages: Vec<PackageSpec>,
    /// Install command rendered by the package manager
    install: String,
    /// Succeeds when every package is present at the wanted version
    check: String,
    /// Description
    description: String,
}

impl InstallPackage {
    /// Create a step installing a single unpinned package
    pub fn new(manager: &dyn PackageManager, name: impl Into<String>) -> Self {
        Self::packages(manager, vec![PackageSpec::new(name)], None)
    }

    /// Create a step installing several packages at once
    ///
    /// `repository` names the repository whose excludes are lifted for
    /// this install.
    pub fn packages(
        manager: &dyn PackageManager,
        packages: Vec<PackageSpec>,
        repository: Option<&str>,
    ) -> Self {
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        let description = match packages.first().and_then(|p| p.version) {
            Some(version) => format!("Install {} {version}", names.join(", ")),
            None => format!("Install {}", names.join(", ")),
        };
        let install = manager.install(&packages, repository);
        let check = packages
            .iter()
            .map(|p| manager.is_installed(p))
            .collect::<Vec<_>>()
            .join(" && ");

        Self {
            packages,
            install,
            check,
            description,
        }
    }
}

impl Step for InstallPackage {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_cloud_init(&self) -> CloudInitFragment {
        CloudInitFragment {
            runcmd: self.to_bash(),
            ..Default::default()
        }
    }

    fn to_bash(&self) -> Vec<String> {
        vec![guarded(Some(&self.check), &self.install)]
    }

    fn check_command(&self) -> Option<String> {
        Some(self.check.clone())
    }
}
