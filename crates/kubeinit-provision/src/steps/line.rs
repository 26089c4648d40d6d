//! Append-once line management

use super::{CloudInitFragment, Step, shell_quote};

/// Ensure a file contains an exact line, appending it at most once
#[derive(Debug, Clone)]
pub struct EnsureLine {
    /// File path
    pub path: String,
    /// Full line content, without newline
    pub line: String,
    /// Owner applied after appending (e.g., "1000:1000")
    pub owner: Option<String>,
    /// Description
    description: String,
}

impl EnsureLine {
    pub fn new(path: impl Into<String>, line: impl Into<String>) -> Self {
        let path = path.into();
        let line = line.into();
        let description = format!("Add '{line}' to {path}");
        Self {
            path,
            line,
            owner: None,
            description,
        }
    }

    /// Set file owner
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Override the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Step for EnsureLine {
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
        let path = shell_quote(&self.path);
        let line = shell_quote(&self.line);

        // Terminate a dangling last line before appending
        let mut cmds = vec![format!(
            "grep -qxF -- {line} {path} 2>/dev/null || {{ \
                if [ -s {path} ] && [ -n \"$(tail -c1 {path})\" ]; then echo >> {path}; fi; \
                printf '%s\\n' {line} >> {path}; \
            }}"
        )];

        if let Some(owner) = &self.owner {
            cmds.push(format!("chown {owner} {path}"));
        }

        cmds
    }

    fn check_command(&self) -> Option<String> {
        Some(format!(
            "grep -qxF -- {} {}",
            shell_quote(&self.line),
            shell_quote(&self.path)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{LocalShell, Shell};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn appending_twice_leaves_one_line() {
        let dir = TempDir::new().unwrap();
        let bashrc = dir.path().join(".bashrc");
        fs::write(&bashrc, "alias ll='ls -l'").unwrap();

        let step = EnsureLine::new(bashrc.to_str().unwrap(), "source <(kubectl completion bash)");
        let mut shell = LocalShell::new();
        step.run(&mut shell).unwrap();
        step.run(&mut shell).unwrap();

        let content = fs::read_to_string(&bashrc).unwrap();
        assert_eq!(
            content,
            "alias ll='ls -l'\nsource <(kubectl completion bash)\n"
        );
        assert!(shell.succeeds(&step.check_command().unwrap()).unwrap());
    }

    #[test]
    fn creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let hosts = dir.path().join("hosts");
        let step = EnsureLine::new(hosts.to_str().unwrap(), "127.0.0.1 node-1");

        step.run(&mut LocalShell::new()).unwrap();
        assert_eq!(fs::read_to_string(&hosts).unwrap(), "127.0.0.1 node-1\n");
    }
}
