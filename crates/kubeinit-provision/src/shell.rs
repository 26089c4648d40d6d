//! Local command execution

use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::ShellError;

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Something that can run bash snippets
///
/// Steps only talk to the host through this trait, so a run can be
/// recorded in tests instead of touching the machine.
pub trait Shell {
    /// Run a snippet, failing on non-zero exit
    fn run(&mut self, script: &str) -> Result<CommandOutput, ShellError>;

    /// Run a check snippet; non-zero exit is `Ok(false)`
    fn succeeds(&mut self, script: &str) -> Result<bool, ShellError>;
}

/// Runs snippets with `bash -c` under `set -eo pipefail`
#[derive(Debug, Clone)]
pub struct LocalShell {
    program: String,
}

impl LocalShell {
    pub fn new() -> Self {
        Self {
            program: "bash".into(),
        }
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg(format!("set -eo pipefail\n{script}"))
            .stdin(Stdio::null())
            .env("DEBIAN_FRONTEND", "noninteractive");
        cmd
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for LocalShell {
    fn run(&mut self, script: &str) -> Result<CommandOutput, ShellError> {
        debug!("$ {script}");
        let output = self
            .command(script)
            .output()
            .map_err(|source| ShellError::Launch {
                command: script.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines().chain(stderr.lines()) {
            debug!("  {line}");
        }

        if !output.status.success() {
            return Err(ShellError::Failed {
                command: script.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn succeeds(&mut self, script: &str) -> Result<bool, ShellError> {
        let status = self
            .command(script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| ShellError::Launch {
                command: script.to_string(),
                source,
            })?;
        debug!(success = status.success(), "check: {script}");
        Ok(status.success())
    }
}

/// In-memory shell that records every snippet
#[cfg(test)]
pub(crate) mod fake {
    use super::{CommandOutput, Shell};
    use crate::error::ShellError;

    #[derive(Debug, Default)]
    pub struct RecordingShell {
        /// Snippets passed to `run`, in order
        pub commands: Vec<String>,
        /// Snippets passed to `succeeds`, in order
        pub checks: Vec<String>,
        /// Checks containing one of these substrings report success
        pub satisfied: Vec<String>,
        /// Runs containing one of these substrings fail
        pub failing: Vec<String>,
        /// Stdout returned for runs containing the substring
        pub outputs: Vec<(String, String)>,
    }

    impl RecordingShell {
        pub fn satisfied(mut self, needle: &str) -> Self {
            self.satisfied.push(needle.into());
            self
        }

        pub fn failing(mut self, needle: &str) -> Self {
            self.failing.push(needle.into());
            self
        }

        pub fn output(mut self, needle: &str, stdout: &str) -> Self {
            self.outputs.push((needle.into(), stdout.into()));
            self
        }
    }

    impl Shell for RecordingShell {
        fn run(&mut self, script: &str) -> Result<CommandOutput, ShellError> {
            self.commands.push(script.to_string());
            if self.failing.iter().any(|n| script.contains(n.as_str())) {
                return Err(ShellError::Failed {
                    command: script.to_string(),
                    code: Some(1),
                    stderr: "boom".into(),
                });
            }
            let stdout = self
                .outputs
                .iter()
                .find(|(n, _)| script.contains(n.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default();
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            })
        }

        fn succeeds(&mut self, script: &str) -> Result<bool, ShellError> {
            self.checks.push(script.to_string());
            Ok(self.satisfied.iter().any(|n| script.contains(n.as_str())))
        }
    }
}
