//! Systemd service management steps

use super::{CloudInitFragment, Step};

/// Ensure a systemd service is enabled and/or started
#[derive(Debug, Clone)]
pub struct EnsureService {
    /// Service name
    pub name: String,
    /// Whether to enable the service
    pub enabled: bool,
    /// Whether to start the service
    pub started: bool,
    /// Reload unit files first (freshly installed units)
    pub daemon_reload: bool,
    /// Description
    description: String,
}

impl EnsureService {
    /// Create a new service step (enabled and started by default)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("Ensure service {name}");
        Self {
            name,
            enabled: true,
            started: true,
            daemon_reload: false,
            description,
        }
    }

    /// Set whether the service should be enabled
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set whether the service should be started
    pub fn started(mut self, started: bool) -> Self {
        self.started = started;
        self
    }

    /// Run `systemctl daemon-reload` before enabling
    pub fn with_daemon_reload(mut self) -> Self {
        self.daemon_reload = true;
        self
    }
}

impl Step for EnsureService {
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
        let mut cmds = vec![];

        if self.daemon_reload {
            cmds.push("systemctl daemon-reload".to_string());
        }

        match (self.enabled, self.started) {
            (true, true) => cmds.push(format!("systemctl enable --now {}", self.name)),
            (true, false) => cmds.push(format!("systemctl enable {}", self.name)),
            (false, true) => cmds.push(format!("systemctl start {}", self.name)),
            (false, false) => {}
        }

        cmds
    }

    fn check_command(&self) -> Option<String> {
        let enabled = format!("systemctl is-enabled {} >/dev/null 2>&1", self.name);
        let active = format!("systemctl is-active {} >/dev/null 2>&1", self.name);
        match (self.enabled, self.started) {
            (true, true) => Some(format!("{enabled} && {active}")),
            (true, false) => Some(enabled),
            (false, true) => Some(active),
            (false, false) => None,
        }
    }
}
