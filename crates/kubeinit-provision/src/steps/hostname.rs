//! Hostname steps

use super::{CloudInitFragment, Step, shell_quote};

/// Set the system hostname
#[derive(Debug, Clone)]
pub struct SetHostname {
    /// DNS-safe hostname
    pub name: String,
    /// Description
    description: String,
}

impl SetHostname {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("Set hostname to {name}");
        Self { name, description }
    }
}

impl Step for SetHostname {
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
        let name = shell_quote(&self.name);
        vec![format!(
            "hostnamectl set-hostname {name} 2>/dev/null || {{ hostname {name} && echo {name} > /etc/hostname; }}"
        )]
    }

    fn check_command(&self) -> Option<String> {
        Some(format!("[ \"$(hostname)\" = {} ]", shell_quote(&self.name)))
    }
}
