//! kubeinit Provision - Node Bootstrap Step Library
//!
//! This crate provides the types and steps that turn a fresh Debian, Ubuntu,
//! CentOS or Fedora host into a Kubernetes node. Steps are idempotent and
//! can be run directly, or rendered to a bash script or cloud-init YAML.
//!
//! # Architecture
//!
//! - [`InstallConfig`]: Resolved settings for one node
//! - [`host`] module: OS probing and preflight checks
//! - [`pkg`] module: apt / yum / dnf package manager strategies
//! - [`Step`] trait: Common interface for all installation steps
//! - [`steps`] module: Concrete step implementations
//! - [`Manifest`]: The ordered step list for a node
//! - [`Runner`]: Applies a manifest through a [`Shell`], halting on failure
//! - [`render`] module: Output renderers (bash, cloud-init)
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use kubeinit_provision::{Cni, HostProfile, InstallConfig, LocalShell, Manifest, NoProgress, Runner};
//!
//! let config = InstallConfig::builder().cni(Cni::Flannel).build();
//! let host = HostProfile::detect(Path::new("/"))?;
//!
//! let manifest = Manifest::node(&config, &host)?;
//! let report = Runner::new(LocalShell::new()).run(&manifest, &mut NoProgress)?;
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod manifest;
pub mod pkg;
pub mod render;
pub mod runner;
pub mod shell;
pub mod steps;
pub mod templates;

pub use config::{Cni, InstallConfig, KubeVersion, NodeRole, Operator};
pub use error::{ConfigError, ManifestError, PreflightError, ProbeError, RunError, ShellError};
pub use host::{HostFacts, HostProfile, OsFamily, parse_hostname, preflight, sanitize_hostname};
pub use manifest::Manifest;
pub use render::{BashRenderer, CloudInitRenderer, Renderer};
pub use runner::{NoProgress, Progress, RunReport, Runner, StepRecord};
pub use shell::{LocalShell, Shell};
pub use steps::{Step, StepResult};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::RecordingShell;
    use crate::steps::{EnsureDirectory, EnsureService, InstallPackage, RunCommand, WriteFile};

    fn ubuntu() -> HostProfile {
        HostProfile {
            os: OsFamily::Ubuntu,
            hostname: "node-1".into(),
        }
    }

    fn descriptions(manifest: &Manifest) -> Vec<&str> {
        manifest.steps.iter().map(|s| s.description()).collect()
    }

    #[test]
    fn test_install_package_idempotent() {
        let step = InstallPackage::new(&pkg::Apt, "curl");
        let bash = step.to_bash();

        assert_eq!(bash.len(), 1);
        assert!(bash[0].contains("dpkg -s curl"));
        assert!(bash[0].contains("apt-get install -y --allow-change-held-packages curl"));
    }

    #[test]
    fn test_write_file_uses_checksum() {
        let step = WriteFile::new("/etc/test.conf", "test content").with_permissions("0644");

        let bash = step.to_bash();
        let check = step.check_command();

        // Should use sha256sum for comparison
        assert!(bash.iter().any(|c| c.contains("sha256sum")));
        assert!(check.is_some());
        assert!(check.unwrap().contains("sha256sum"));
    }

    #[test]
    fn test_ensure_directory_idempotent() {
        let step = EnsureDirectory::new("/etc/apt/keyrings").with_permissions("0755");

        let check = step.check_command();
        assert_eq!(check, Some("[ -d /etc/apt/keyrings ]".into()));
    }

    #[test]
    fn test_ensure_service_checks_state() {
        let step = EnsureService::new("containerd");
        let check = step.check_command().unwrap();

        assert!(check.contains("systemctl is-enabled containerd"));
        assert!(check.contains("systemctl is-active containerd"));
        assert_eq!(step.to_bash(), vec!["systemctl enable --now containerd"]);
    }

    #[test]
    fn test_run_command_with_unless() {
        let step = RunCommand::new("Create directory", "mkdir /test").unless("[ -d /test ]");

        let bash = step.to_bash();
        let check = step.check_command();

        assert!(bash[0].contains("[ -d /test ] || { mkdir /test; }"));
        assert_eq!(check, Some("[ -d /test ]".into()));
    }

    #[test]
    fn test_worker_never_initializes_cluster() {
        let config = InstallConfig::test_config();
        let manifest = Manifest::node(&config, &ubuntu()).unwrap();
        let script = BashRenderer::new().render(&manifest).unwrap();

        assert!(!script.contains("kubeadm init"));
        assert!(!script.contains(".kube/config"));
        assert!(!descriptions(&manifest).iter().any(|d| d.contains("kubeconfig")));
    }

    #[test]
    fn test_flannel_control_plane() {
        let config = InstallConfig::builder()
            .cni(Cni::Flannel)
            .operator(InstallConfig::test_config().operator)
            .build();
        let manifest = Manifest::node(&config, &ubuntu()).unwrap();
        let script = BashRenderer::new().render(&manifest).unwrap();

        assert!(script.contains("--pod-network-cidr=10.244.0.0/16"));
        assert!(script.contains("kube-flannel.yml"));
        assert!(script.contains("/home/testuser/.kube/config"));
    }

    #[test]
    fn test_requested_version_pins_packages() {
        let config = InstallConfig::builder()
            .kubernetes_version("v1.34.0".parse().unwrap())
            .build();
        let manifest = Manifest::node(&config, &ubuntu()).unwrap();
        let script = BashRenderer::new().render(&manifest).unwrap();

        assert!(script.contains("pkgs.k8s.io/core:/stable:/v1.34/deb/"));
        assert!(script.contains("'kubelet=1.34.0-*' 'kubeadm=1.34.0-*' 'kubectl=1.34.0-*'"));
        assert!(script.contains("--kubernetes-version v1.34.0"));
        assert!(!script.contains("1.33.2"));
    }

    #[test]
    fn test_completion_lines_target_operator() {
        let manifest = Manifest::node(&InstallConfig::test_config(), &ubuntu()).unwrap();
        let lines: Vec<String> = manifest
            .steps
            .iter()
            .filter(|s| s.description().contains("completion"))
            .flat_map(|s| s.to_bash())
            .collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("'source <(kubectl completion bash)' /home/testuser/.bashrc"));
        assert_eq!(lines[1], "chown 1000:1000 /home/testuser/.bashrc");
        assert!(lines[2].contains("kubeadm completion bash"));
    }

    #[test]
    fn test_rerun_on_prepared_node_changes_nothing() {
        let manifest = Manifest::node(&InstallConfig::test_config(), &ubuntu()).unwrap();
        // Every check succeeds; only the unguarded steps run
        let shell = RecordingShell {
            satisfied: vec![String::new()],
            ..RecordingShell::default()
        };
        let mut runner = Runner::new(shell);

        let report = runner.run(&manifest, &mut NoProgress).unwrap();
        let shell = runner.into_shell();

        let unguarded = manifest
            .steps
            .iter()
            .filter(|s| s.check_command().is_none())
            .count();
        assert_eq!(report.applied(), unguarded);
        assert_eq!(report.skipped(), manifest.len() - unguarded);
        assert!(shell.commands.iter().all(|c| !c.contains("apt-get install")));
    }
}
