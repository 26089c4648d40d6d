//! File management steps

use super::{CloudInitFile, CloudInitFragment, Step, shell_quote};
use sha2::{Digest, Sha256};

/// Write a file with specified content
#[derive(Debug, Clone)]
pub struct WriteFile {
    /// File path
    pub path: String,
    /// File content, always newline-terminated
    pub content: String,
    /// File permissions (e.g., "0644")
    pub permissions: Option<String>,
    /// File owner (e.g., "0:0")
    pub owner: Option<String>,
    /// Description
    description: String,
}

impl WriteFile {
    /// Create a new file write step
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let mut content = content.into();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        let description = format!("Write {path}");
        Self {
            path,
            content,
            permissions: None,
            owner: None,
            description,
        }
    }

    /// Set file permissions
    pub fn with_permissions(mut self, perms: impl Into<String>) -> Self {
        self.permissions = Some(perms.into());
        self
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

    /// Compute SHA256 hash of content (hex-encoded)
    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a heredoc delimiter that won't appear in content
    fn heredoc_delimiter(&self) -> &'static str {
        if self.content.contains("KUBEINIT_EOF") {
            if self.content.contains("__KUBEINIT_FILE_END__") {
                "__FILE_CONTENT_END_MARKER__"
            } else {
                "__KUBEINIT_FILE_END__"
            }
        } else {
            "KUBEINIT_EOF"
        }
    }
}

impl Step for WriteFile {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_cloud_init(&self) -> CloudInitFragment {
        CloudInitFragment {
            write_files: vec![CloudInitFile {
                path: self.path.clone(),
                content: self.content.clone(),
                permissions: self.permissions.clone(),
                owner: self.owner.clone(),
            }],
            ..Default::default()
        }
    }

    fn to_bash(&self) -> Vec<String> {
        let path = shell_quote(&self.path);
        let mut cmds = vec![format!("mkdir -p \"$(dirname {path})\"")];

        let expected_hash = self.content_hash();
        let delimiter = self.heredoc_delimiter();

        // The heredoc supplies the final newline itself
        let body = self.content.strip_suffix('\n').unwrap_or(&self.content);
        cmds.push(format!(
            r#"CURRENT=$(sha256sum {path} 2>/dev/null | cut -d' ' -f1 || echo 'none')
if [ "$CURRENT" != "{expected_hash}" ]; then
    cat > {path} << '{delimiter}'
{body}
{delimiter}
fi"#
        ));

        if let Some(perms) = &self.permissions {
            cmds.push(format!("chmod {perms} {path}"));
        }

        if let Some(owner) = &self.owner {
            cmds.push(format!("chown {owner} {path}"));
        }

        cmds
    }

    fn check_command(&self) -> Option<String> {
        let path = shell_quote(&self.path);
        let expected_hash = self.content_hash();
        Some(format!(
            "[ -f {path} ] && [ \"$(sha256sum {path} | cut -d' ' -f1)\" = \"{expected_hash}\" ]"
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
    fn writes_exact_content_and_then_skips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sysctl.d/k8s.conf");
        let step = WriteFile::new(path.to_str().unwrap(), "a = 1\nb = 1");

        let mut shell = LocalShell::new();
        let check = step.check_command().unwrap();
        assert!(!shell.succeeds(&check).unwrap());

        step.run(&mut shell).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a = 1\nb = 1\n");
        assert!(shell.succeeds(&check).unwrap());
    }

    #[test]
    fn delimiter_avoids_content() {
        let step = WriteFile::new("/tmp/x", "KUBEINIT_EOF inside");
        assert_eq!(step.heredoc_delimiter(), "__KUBEINIT_FILE_END__");
    }
}
