//! Generic command execution steps

use super::{CloudInitFragment, Step, guarded};

/// Run a command with optional idempotency guard
#[derive(Debug, Clone)]
pub struct RunCommand {
    /// Human-readable description
    pub description: String,
    /// Command to execute
    pub command: String,
    /// If this command succeeds (exit 0), skip running `command`
    pub unless: Option<String>,
    /// Continue the run when the command fails
    pub best_effort: bool,
}

impl RunCommand {
    /// Create a new command step
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
            unless: None,
            best_effort: false,
        }
    }

    /// Add an idempotency guard
    pub fn unless(mut self, check: impl Into<String>) -> Self {
        self.unless = Some(check.into());
        self
    }

    /// Tolerate failure of this command
    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }
}

impl Step for RunCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_cloud_init(&self) -> CloudInitFragment {
        let mut runcmd = self.to_bash();
        if self.best_effort {
            runcmd = runcmd.into_iter().map(|c| format!("{{ {c}; }} || true")).collect();
        }
        CloudInitFragment {
            runcmd,
            ..Default::default()
        }
    }

    fn to_bash(&self) -> Vec<String> {
        vec![guarded(self.unless.as_deref(), &self.command)]
    }

    fn check_command(&self) -> Option<String> {
        self.unless.clone()
    }

    fn best_effort(&self) -> bool {
        self.best_effort
    }
}
