//! Installation step definitions
//!
//! Each step implements the [`Step`] trait and can render to both
//! cloud-init YAML fragments and idempotent bash commands, or run
//! directly against a [`Shell`].

mod command;
mod directory;
mod file;
mod firewall;
mod hostname;
mod images;
mod line;
mod package;
mod service;
mod swap;

pub use command::RunCommand;
pub use directory::EnsureDirectory;
pub use file::WriteFile;
pub use firewall::DisableFirewall;
pub use hostname::SetHostname;
pub use images::{PullImages, parse_image_list};
pub use line::EnsureLine;
pub use package::{InstallPackage, PackageSpec, Repository};
pub use service::EnsureService;
pub use swap::DisableSwap;

use serde::Serialize;

use crate::error::ShellError;
use crate::shell::Shell;

/// Result of running a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Step executed successfully
    Applied,
    /// Step was already satisfied, skipped
    Skipped,
    /// Step failed
    Failed(String),
}

/// A single installation step
///
/// All steps must be:
/// - **Idempotent**: Safe to run multiple times
/// - **Describable**: Have a human-readable description
/// - **Renderable**: Can output both cloud-init YAML and bash
pub trait Step: Send + Sync {
    /// Human-readable description of what this step does
    fn description(&self) -> &str;

    /// Render as cloud-init YAML fragment
    fn to_cloud_init(&self) -> CloudInitFragment;

    /// Render as idempotent bash commands
    fn to_bash(&self) -> Vec<String>;

    /// Check command to determine if step is already satisfied.
    ///
    /// If `Some(cmd)` is returned and the command succeeds (exit 0),
    /// the step will be skipped. If `None`, the step always runs.
    fn check_command(&self) -> Option<String>;

    /// Failures are reported but do not stop the run
    fn best_effort(&self) -> bool {
        false
    }

    /// Apply the step, one shell invocation per bash command
    fn run(&self, shell: &mut dyn Shell) -> Result<(), ShellError> {
        for cmd in self.to_bash() {
            shell.run(&cmd)?;
        }
        Ok(())
    }
}

/// Fragment that can be merged into a cloud-init config
#[derive(Debug, Default, Clone, Serialize)]
pub struct CloudInitFragment {
    /// Files to write
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_files: Vec<CloudInitFile>,

    /// Commands to run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runcmd: Vec<String>,
}

/// A file to write in cloud-init format
#[derive(Debug, Clone, Serialize)]
pub struct CloudInitFile {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Quote a word for bash, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Wrap a command so it only runs when `check` fails
fn guarded(check: Option<&str>, command: &str) -> String {
    match check {
        Some(check) => format!("{check} || {{ {command}; }}"),
        None => command.to_string(),
    }
}
