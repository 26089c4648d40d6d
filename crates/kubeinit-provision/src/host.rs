//! Host probing and preflight checks

use std::fmt;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::LazyLock;

use nix::unistd::Uid;
use regex::Regex;
use tracing::debug;

use crate::config::InstallConfig;
use crate::error::{ConfigError, PreflightError, ProbeError};
use crate::pkg::{Apt, PackageManager, Rpm};

/// Minimum CPU cores kubeadm accepts for a control-plane node
pub const MIN_CONTROL_PLANE_CPUS: usize = 2;

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("valid hostname regex")
});

/// Supported distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    Ubuntu,
    CentOS,
    Fedora,
}

/// Distribution lineage, which decides the package tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    RedHat,
}

impl OsFamily {
    pub fn family(self) -> DistroFamily {
        match self {
            Self::Debian | Self::Ubuntu => DistroFamily::Debian,
            Self::CentOS | Self::Fedora => DistroFamily::RedHat,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debian => "Debian",
            Self::Ubuntu => "Ubuntu",
            Self::CentOS => "CentOS",
            Self::Fedora => "Fedora",
        })
    }
}

/// What the prober learned about the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    /// Detected distribution
    pub os: OsFamily,
    /// Current hostname (empty when unreadable)
    pub hostname: String,
}

impl HostProfile {
    /// Probe the system rooted at `root` (`/` for the running host)
    pub fn detect(root: &Path) -> Result<Self, ProbeError> {
        let os = detect_os(root)?;
        let hostname = current_hostname(root);
        debug!(%os, %hostname, "Probed host");
        Ok(Self { os, hostname })
    }

    pub fn family(&self) -> DistroFamily {
        self.os.family()
    }

    /// Package manager strategy for this distribution
    pub fn package_manager(&self) -> Box<dyn PackageManager> {
        match self.os {
            OsFamily::Debian | OsFamily::Ubuntu => Box::new(Apt),
            OsFamily::Fedora => Box::new(Rpm::dnf()),
            OsFamily::CentOS => Box::new(Rpm::yum()),
        }
    }

    /// Whether the current hostname must be rewritten to stay DNS-safe
    pub fn hostname_needs_sanitizing(&self) -> bool {
        self.hostname.contains('_')
    }
}

/// Classify the distribution from its release files
///
/// `/etc/redhat-release` wins over `/etc/issue`; `/etc/os-release` is the
/// last resort.
fn detect_os(root: &Path) -> Result<OsFamily, ProbeError> {
    if let Some(release) = read_optional(&root.join("etc/redhat-release"))? {
        return Ok(if release.contains("Fedora") {
            OsFamily::Fedora
        } else {
            OsFamily::CentOS
        });
    }

    if let Some(issue) = read_optional(&root.join("etc/issue"))? {
        if issue.contains("Debian") {
            return Ok(OsFamily::Debian);
        }
        if issue.contains("Ubuntu") {
            return Ok(OsFamily::Ubuntu);
        }
    }

    let os_release = read_optional(&root.join("etc/os-release"))?.unwrap_or_default();
    let id = os_release_field(&os_release, "ID");
    match id.as_deref() {
        Some("debian") => Ok(OsFamily::Debian),
        Some("ubuntu") => Ok(OsFamily::Ubuntu),
        Some("centos") => Ok(OsFamily::CentOS),
        Some("fedora") => Ok(OsFamily::Fedora),
        _ => Err(ProbeError::UnsupportedOs(
            os_release_field(&os_release, "PRETTY_NAME")
                .or(id)
                .unwrap_or_else(|| "unknown".into()),
        )),
    }
}

fn os_release_field(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"').to_string())
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, ProbeError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ProbeError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn current_hostname(root: &Path) -> String {
    ["proc/sys/kernel/hostname", "etc/hostname"]
        .iter()
        .find_map(|p| fs::read_to_string(root.join(p)).ok())
        .map(|h| h.trim().to_string())
        .unwrap_or_default()
}

/// Replace every underscore with a hyphen
pub fn sanitize_hostname(name: &str) -> String {
    name.trim().replace('_', "-")
}

/// Sanitize and validate a requested hostname
pub fn parse_hostname(raw: &str) -> Result<String, ConfigError> {
    let name = sanitize_hostname(raw);
    if name.len() > 253 || !HOSTNAME_RE.is_match(&name) {
        return Err(ConfigError::InvalidHostname(raw.to_string()));
    }
    Ok(name)
}

/// Facts the preflight checks run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFacts {
    pub is_root: bool,
    pub cpu_cores: usize,
}

impl HostFacts {
    /// Gather facts from the running host
    pub fn gather() -> Self {
        Self {
            is_root: Uid::effective().is_root(),
            cpu_cores: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

/// Fail before anything is mutated when the host cannot take this role
pub fn preflight(facts: &HostFacts, config: &InstallConfig) -> Result<(), PreflightError> {
    if !facts.is_root {
        return Err(PreflightError::NotRoot);
    }
    if config.is_control_plane() && facts.cpu_cores < MIN_CONTROL_PLANE_CPUS {
        return Err(PreflightError::InsufficientCpus {
            cores: facts.cpu_cores,
            required: MIN_CONTROL_PLANE_CPUS,
        });
    }
    Ok(())
}
