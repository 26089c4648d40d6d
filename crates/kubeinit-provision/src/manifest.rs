//! Installation manifest - complete step sequence

use crate::config::InstallConfig;
use crate::error::ManifestError;
use crate::host::{DistroFamily, HostProfile, sanitize_hostname};
use crate::steps::{
    DisableFirewall, DisableSwap, EnsureDirectory, EnsureLine, EnsureService, InstallPackage,
    PackageSpec, PullImages, RunCommand, SetHostname, Step, WriteFile, shell_quote,
};
use crate::templates;

/// kubeconfig written by `kubeadm init`
pub const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";

/// containerd configuration file
pub const CONTAINERD_CONFIG: &str = "/etc/containerd/config.toml";

/// Sysctl drop-in enabling bridged traffic filtering
pub const SYSCTL_DROP_IN: &str = "/etc/sysctl.d/k8s.conf";

/// SELinux mode persisted across reboots
pub const SELINUX_CONFIG: &str = "/etc/selinux/config";

/// Switch SELinux to permissive now and after reboot
///
/// Skipped on hosts without SELinux tooling, or when neither the runtime
/// mode nor `config` is enforcing.
fn permissive_selinux(config: &str) -> RunCommand {
    let config = shell_quote(config);
    RunCommand::new(
        "Set SELinux to permissive",
        format!(
            "if [ \"$(getenforce)\" = Enforcing ]; then setenforce 0; fi\n\
             if [ -f {config} ]; then sed -i 's/^SELINUX=enforcing$/SELINUX=permissive/' {config}; fi"
        ),
    )
    .unless(format!(
        "! command -v getenforce >/dev/null 2>&1 || \
         {{ [ \"$(getenforce)\" != Enforcing ] && ! grep -qx 'SELINUX=enforcing' {config} 2>/dev/null; }}"
    ))
    .best_effort()
}

/// Complete node installation manifest
pub struct Manifest {
    /// Hostname the node ends up with, when kubeinit sets one
    pub hostname: Option<String>,
    /// Ordered list of installation steps
    pub steps: Vec<Box<dyn Step>>,
}

impl Manifest {
    /// Create a new empty manifest
    pub fn new() -> Self {
        Self {
            hostname: None,
            steps: vec![],
        }
    }

    /// Add a step to the manifest
    pub fn add_step<S: Step + 'static>(&mut self, step: S) {
        self.steps.push(Box::new(step));
    }

    /// Add a step fluently
    pub fn with_step<S: Step + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Create the installation manifest for one node
    ///
    /// Phases run strictly in order:
    /// - Hostname, swap, SELinux, and on Red Hat hosts firewalld and sysctl
    /// - Base packages
    /// - containerd with the systemd cgroup driver
    /// - Pinned kubelet, kubeadm and kubectl plus shell completion
    /// - Image prefetch
    /// - `kubeadm init`, kubeconfig and CNI on control-plane nodes
    #[allow(clippy::too_many_lines)]
    pub fn node(config: &InstallConfig, host: &HostProfile) -> Result<Self, ManifestError> {
        let mut manifest = Self::new();
        let pm = host.package_manager();
        let version = config.kubernetes_version;
        let operator = &config.operator;

        // =========================================================
        // Phase 1: Host Preparation
        // =========================================================
        let hostname = config.hostname.clone().or_else(|| {
            host.hostname_needs_sanitizing()
                .then(|| sanitize_hostname(&host.hostname))
        });
        if let Some(name) = &hostname {
            manifest.add_step(SetHostname::new(name));
            manifest.add_step(
                EnsureLine::new("/etc/hosts", format!("127.0.0.1 {name}"))
                    .describe(format!("Map {name} to 127.0.0.1")),
            );
        }
        manifest.hostname = hostname;

        manifest.add_step(DisableSwap::new());

        manifest.add_step(permissive_selinux(SELINUX_CONFIG));

        if host.family() == DistroFamily::RedHat {
            manifest.add_step(DisableFirewall::new());
            manifest.add_step(
                WriteFile::new(SYSCTL_DROP_IN, templates::sysctl_conf(config.sysctl_keys())?)
                    .with_permissions("0644")
                    .describe("Enable bridged traffic filtering"),
            );
            manifest.add_step(RunCommand::new(
                "Reload kernel parameters",
                "modprobe br_netfilter && sysctl --system",
            ));
        }

        // =========================================================
        // Phase 2: Base Packages
        // =========================================================
        for pkg in pm.base_packages() {
            manifest.add_step(InstallPackage::new(pm.as_ref(), *pkg));
        }

        // =========================================================
        // Phase 3: Container Runtime
        // =========================================================
        manifest.add_step(
            RunCommand::new(
                "Configure containerd with the systemd cgroup driver",
                format!(
                    "mkdir -p /etc/containerd && containerd config default > {CONTAINERD_CONFIG} \
                     && sed -i 's/SystemdCgroup = false/SystemdCgroup = true/' {CONTAINERD_CONFIG} \
                     && systemctl restart containerd"
                ),
            )
            .unless(format!(
                "grep -q 'SystemdCgroup = true' {CONTAINERD_CONFIG} 2>/dev/null"
            )),
        );
        manifest.add_step(EnsureService::new("containerd"));

        // =========================================================
        // Phase 4: Kubernetes Packages
        // =========================================================
        let repo = pm.kubernetes_repository(&version);
        manifest.steps.extend(pm.add_repository(&repo)?);

        let components: Vec<PackageSpec> = repo
            .pinned
            .iter()
            .map(|name| PackageSpec::pinned(name.as_str(), version))
            .collect();
        manifest.add_step(InstallPackage::packages(
            pm.as_ref(),
            components,
            Some(&repo.name),
        ));
        if let Some(hold) = pm.hold(&repo.pinned) {
            manifest.add_step(hold);
        }
        manifest.add_step(EnsureService::new("kubelet").with_daemon_reload());

        let profile = operator.shell_profile().display().to_string();
        for tool in ["kubectl", "kubeadm"] {
            manifest.add_step(
                EnsureLine::new(&profile, format!("source <({tool} completion bash)"))
                    .with_owner(operator.owner())
                    .describe(format!("Enable {tool} completion for {}", operator.name)),
            );
        }

        // =========================================================
        // Phase 5: Image Prefetch
        // =========================================================
        manifest.add_step(PullImages::new(version));

        // =========================================================
        // Phase 6: Cluster Bootstrap (control-plane only)
        // =========================================================
        if config.is_control_plane() {
            let mut init = format!("kubeadm init --kubernetes-version={}", version.tag());
            if let Some(cidr) = config.pod_network_cidr() {
                init.push_str(&format!(" --pod-network-cidr={cidr}"));
            }
            manifest.add_step(
                RunCommand::new("Initialize control plane", init)
                    .unless(format!("[ -f {ADMIN_KUBECONFIG} ]")),
            );

            let kubeconfig = operator.kubeconfig_path().display().to_string();
            let kube_dir = operator.home.join(".kube").display().to_string();
            manifest.add_step(
                EnsureDirectory::new(&kube_dir)
                    .with_permissions("0700")
                    .with_owner(operator.owner()),
            );
            let target = shell_quote(&kubeconfig);
            manifest.add_step(
                RunCommand::new(
                    format!("Copy admin kubeconfig for {}", operator.name),
                    format!(
                        "cp -f {ADMIN_KUBECONFIG} {target} && chown {} {target} && chmod 0600 {target}",
                        operator.owner()
                    ),
                )
                .unless(format!("cmp -s {ADMIN_KUBECONFIG} {target}")),
            );

            if let (Some(url), Some(present)) =
                (config.cni.manifest_url(), config.cni.presence_check())
            {
                manifest.add_step(
                    RunCommand::new(
                        format!("Apply {} network plugin", config.cni),
                        format!("kubectl --kubeconfig={ADMIN_KUBECONFIG} apply -f {url}"),
                    )
                    .unless(format!("KUBECONFIG={ADMIN_KUBECONFIG} {present} >/dev/null 2>&1")),
                );
            }
        }

        Ok(manifest)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cni;
    use crate::host::OsFamily;
    use crate::shell::{LocalShell, Shell};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn selinux_config_is_fixed_even_when_already_permissive() {
        let dir = TempDir::new().unwrap();
        let getenforce = dir.path().join("getenforce");
        fs::write(&getenforce, "#!/bin/sh\necho Permissive\n").unwrap();
        fs::set_permissions(&getenforce, fs::Permissions::from_mode(0o755)).unwrap();
        let config = dir.path().join("selinux-config");
        fs::write(&config, "SELINUX=enforcing\nSELINUXTYPE=targeted\n").unwrap();

        let step = permissive_selinux(config.to_str().unwrap());
        let path = format!("export PATH={}:$PATH\n", dir.path().display());
        let check = step.check_command().unwrap();
        let mut shell = LocalShell::new();

        assert!(!shell.succeeds(&format!("{path}{check}")).unwrap());
        for cmd in step.to_bash() {
            shell.run(&format!("{path}{cmd}")).unwrap();
        }
        assert_eq!(
            fs::read_to_string(&config).unwrap(),
            "SELINUX=permissive\nSELINUXTYPE=targeted\n"
        );
        assert!(shell.succeeds(&format!("{path}{check}")).unwrap());
    }

    fn host(os: OsFamily, hostname: &str) -> HostProfile {
        HostProfile {
            os,
            hostname: hostname.into(),
        }
    }

    fn script(manifest: &Manifest) -> String {
        manifest
            .steps
            .iter()
            .flat_map(|s| s.to_bash())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn underscored_hostname_is_rewritten_first() {
        let manifest = Manifest::node(
            &InstallConfig::test_config(),
            &host(OsFamily::Ubuntu, "my_node_1"),
        )
        .unwrap();

        assert_eq!(manifest.hostname.as_deref(), Some("my-node-1"));
        assert_eq!(manifest.steps[0].description(), "Set hostname to my-node-1");
        assert!(manifest.steps[1].to_bash()[0].contains("'127.0.0.1 my-node-1'"));
    }

    #[test]
    fn clean_hostname_is_left_alone() {
        let manifest = Manifest::node(
            &InstallConfig::test_config(),
            &host(OsFamily::Debian, "node-1"),
        )
        .unwrap();

        assert!(manifest.hostname.is_none());
        assert_eq!(manifest.steps[0].description(), "Disable swap");
    }

    #[test]
    fn redhat_hosts_get_firewall_and_sysctl() {
        let config = InstallConfig::test_config();
        let fedora = Manifest::node(&config, &host(OsFamily::Fedora, "n")).unwrap();
        let ubuntu = Manifest::node(&config, &host(OsFamily::Ubuntu, "n")).unwrap();

        let fedora_script = script(&fedora);
        assert!(fedora_script.contains("systemctl disable --now firewalld"));
        assert!(fedora_script.contains(SYSCTL_DROP_IN));
        assert!(fedora_script.contains("net.bridge.bridge-nf-call-iptables = 1"));
        assert!(fedora_script.contains("dnf install -y kubelet-1.33.2"));

        let ubuntu_script = script(&ubuntu);
        assert!(!ubuntu_script.contains("firewalld"));
        assert!(!ubuntu_script.contains(SYSCTL_DROP_IN));
        assert!(ubuntu_script.contains("apt-mark hold kubelet kubeadm kubectl"));
    }

    #[test]
    fn runtime_configured_before_kubelet() {
        let manifest =
            Manifest::node(&InstallConfig::test_config(), &host(OsFamily::Ubuntu, "n")).unwrap();
        let descriptions: Vec<&str> = manifest.steps.iter().map(|s| s.description()).collect();

        let position = |needle: &str| {
            descriptions
                .iter()
                .position(|d| d.contains(needle))
                .unwrap_or_else(|| panic!("no step matching {needle}"))
        };
        assert!(position("Disable swap") < position("containerd with the systemd"));
        assert!(position("containerd with the systemd") < position("Install kubelet"));
        assert!(position("Install kubelet") < position("Ensure service kubelet"));
        assert!(position("Ensure service kubelet") < position("Pull Kubernetes"));
    }

    #[test]
    fn control_plane_bootstraps_cluster() {
        let config = InstallConfig {
            cni: Cni::Calico,
            role: crate::config::NodeRole::ControlPlane,
            ..InstallConfig::test_config()
        };
        let manifest = Manifest::node(&config, &host(OsFamily::Debian, "cp")).unwrap();
        let bash = script(&manifest);

        assert!(bash.contains(
            "kubeadm init --kubernetes-version=v1.33.2 --pod-network-cidr=192.168.0.0/16"
        ));
        assert!(bash.contains("chown 1000:1000 /home/testuser/.kube/config"));
        assert!(bash.contains("calico/v3.28.0/manifests/calico.yaml"));
        assert_eq!(
            manifest.steps.last().unwrap().description(),
            "Apply calico network plugin"
        );
    }

    #[test]
    fn control_plane_without_cni_skips_plugin() {
        let config = InstallConfig {
            role: crate::config::NodeRole::ControlPlane,
            ..InstallConfig::test_config()
        };
        let bash = script(&Manifest::node(&config, &host(OsFamily::Debian, "cp")).unwrap());

        assert!(bash.contains("kubeadm init --kubernetes-version=v1.33.2"));
        assert!(!bash.contains("--pod-network-cidr"));
        assert!(!bash.contains("kubectl --kubeconfig"));
    }
}
