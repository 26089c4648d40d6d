//! Firewall (firewalld) management steps

use super::{CloudInitFragment, Step};

/// Stop and disable firewalld so cluster ports are reachable
///
/// Best-effort: hosts without firewalld simply have nothing to disable.
#[derive(Debug, Clone)]
pub struct DisableFirewall {
    /// Firewall service unit
    pub service: String,
    /// Description
    description: String,
}

impl DisableFirewall {
    /// Create a step disabling firewalld
    pub fn new() -> Self {
        Self {
            service: "firewalld".into(),
            description: "Disable firewall".into(),
        }
    }
}

impl Default for DisableFirewall {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for DisableFirewall {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_cloud_init(&self) -> CloudInitFragment {
        CloudInitFragment {
            runcmd: vec![format!("systemctl disable --now {} || true", self.service)],
            ..Default::default()
        }
    }

    fn to_bash(&self) -> Vec<String> {
        vec![format!("systemctl disable --now {}", self.service)]
    }

    fn check_command(&self) -> Option<String> {
        Some(format!(
            "! systemctl is-active --quiet {0} && ! systemctl is-enabled --quiet {0}",
            self.service
        ))
    }

    fn best_effort(&self) -> bool {
        true
    }
}
