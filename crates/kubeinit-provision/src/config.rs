//! Configuration types for node bootstrap

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use nix::unistd::{Uid, User};
use regex::Regex;

use crate::error::ConfigError;

/// Kubernetes release installed when none is requested
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.33.2";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("valid version regex"));

/// A `MAJOR.MINOR.PATCH` Kubernetes release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KubeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KubeVersion {
    /// Release channel used by pkgs.k8s.io (e.g. `v1.33`)
    pub fn minor_channel(&self) -> String {
        format!("v{}.{}", self.major, self.minor)
    }

    /// Tag form understood by kubeadm (e.g. `v1.33.2`)
    pub fn tag(&self) -> String {
        format!("v{self}")
    }

    /// Apt version constraint, matching any package revision
    pub fn apt_pin(&self) -> String {
        format!("{self}-*")
    }

    /// Rpm version constraint
    pub fn rpm_pin(&self) -> String {
        self.to_string()
    }
}

impl Default for KubeVersion {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 33,
            patch: 2,
        }
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for KubeVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let caps = VERSION_RE
            .captures(bare)
            .ok_or_else(|| ConfigError::InvalidVersion(s.to_string()))?;
        let part = |i: usize| {
            caps[i]
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidVersion(s.to_string()))
        };

        Ok(Self {
            major: part(1)?,
            minor: part(2)?,
            patch: part(3)?,
        })
    }
}

/// Pod network plugin applied after `kubeadm init`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cni {
    #[default]
    None,
    Flannel,
    Calico,
}

impl Cni {
    /// Pod network CIDR passed to `kubeadm init`
    pub fn pod_network_cidr(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Flannel => Some("10.244.0.0/16"),
            Self::Calico => Some("192.168.0.0/16"),
        }
    }

    /// Manifest applied with `kubectl apply -f`
    pub fn manifest_url(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Flannel => Some(
                "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml",
            ),
            Self::Calico => Some(
                "https://raw.githubusercontent.com/projectcalico/calico/v3.28.0/manifests/calico.yaml",
            ),
        }
    }

    /// Command that succeeds once the plugin is deployed
    pub fn presence_check(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Flannel => Some("kubectl get namespace kube-flannel"),
            Self::Calico => Some("kubectl -n kube-system get daemonset calico-node"),
        }
    }
}

impl fmt::Display for Cni {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Flannel => "flannel",
            Self::Calico => "calico",
        })
    }
}

impl FromStr for Cni {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "flannel" => Ok(Self::Flannel),
            "calico" => Ok(Self::Calico),
            _ => Err(ConfigError::InvalidCni(s.to_string())),
        }
    }
}

/// Role this node plays in the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeRole {
    #[default]
    Worker,
    ControlPlane,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Worker => "worker",
            Self::ControlPlane => "control-plane",
        })
    }
}

/// The account that invoked kubeinit
///
/// Under sudo this is `SUDO_USER`, otherwise the effective user. The
/// kubeconfig and shell completion lines are written into its home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
    pub home: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

impl Operator {
    /// The root account
    pub fn root() -> Self {
        Self {
            name: "root".into(),
            home: PathBuf::from("/root"),
            uid: 0,
            gid: 0,
        }
    }

    /// Resolve the invoking account from `SUDO_USER` or the effective uid
    pub fn resolve(sudo_user: Option<&str>) -> Result<Self, ConfigError> {
        let user = match sudo_user.map(str::trim).filter(|u| !u.is_empty()) {
            Some(name) => User::from_name(name)?
                .ok_or_else(|| ConfigError::UnknownUser(name.to_string()))?,
            None => match User::from_uid(Uid::effective())? {
                Some(user) => user,
                None => return Ok(Self::root()),
            },
        };

        Ok(Self {
            name: user.name,
            home: user.dir,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }

    /// `uid:gid` pair for chown
    pub fn owner(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }

    /// Location of the operator's kubeconfig
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.home.join(".kube").join("config")
    }

    /// Shell profile receiving completion lines
    pub fn shell_profile(&self) -> PathBuf {
        self.home.join(".bashrc")
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::root()
    }
}

/// Configuration for one node installation
#[derive(Debug, Clone, Default)]
pub struct InstallConfig {
    /// Kubernetes release to install
    pub kubernetes_version: KubeVersion,
    /// Worker or control-plane
    pub role: NodeRole,
    /// Pod network plugin (control-plane only)
    pub cni: Cni,
    /// Requested hostname, already sanitized
    pub hostname: Option<String>,
    /// Account receiving kubeconfig and completion
    pub operator: Operator,
}

impl InstallConfig {
    /// Create a new config builder
    pub fn builder() -> InstallConfigBuilder {
        InstallConfigBuilder::default()
    }

    pub fn is_control_plane(&self) -> bool {
        self.role == NodeRole::ControlPlane
    }

    /// Pod network CIDR for `kubeadm init`, if this node initializes a cluster
    pub fn pod_network_cidr(&self) -> Option<&'static str> {
        if self.is_control_plane() {
            self.cni.pod_network_cidr()
        } else {
            None
        }
    }

    /// Kernel parameters the sysctl drop-in sets to 1
    pub fn sysctl_keys(&self) -> &'static [&'static str] {
        &[
            "net.bridge.bridge-nf-call-ip6tables",
            "net.bridge.bridge-nf-call-iptables",
        ]
    }

    /// Create a test configuration for unit tests
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            kubernetes_version: KubeVersion::default(),
            role: NodeRole::Worker,
            cni: Cni::None,
            hostname: None,
            operator: Operator {
                name: "testuser".into(),
                home: PathBuf::from("/home/testuser"),
                uid: 1000,
                gid: 1000,
            },
        }
    }
}

/// Builder for `InstallConfig`
#[derive(Debug, Clone, Default)]
pub struct InstallConfigBuilder {
    config: InstallConfig,
}

impl InstallConfigBuilder {
    /// Set the Kubernetes version
    pub fn kubernetes_version(mut self, version: KubeVersion) -> Self {
        self.config.kubernetes_version = version;
        self
    }

    /// Select a CNI; any plugin other than `None` makes this a control-plane node
    pub fn cni(mut self, cni: Cni) -> Self {
        self.config.cni = cni;
        if cni != Cni::None {
            self.config.role = NodeRole::ControlPlane;
        }
        self
    }

    /// Set the node role
    pub fn role(mut self, role: NodeRole) -> Self {
        self.config.role = role;
        self
    }

    /// Set the hostname
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = Some(hostname.into());
        self
    }

    /// Set the operator account
    pub fn operator(mut self, operator: Operator) -> Self {
        self.config.operator = operator;
        self
    }

    /// Build the configuration
    pub fn build(self) -> InstallConfig {
        self.config
    }
}
