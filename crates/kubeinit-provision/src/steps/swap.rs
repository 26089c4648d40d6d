//! Swap management steps

use super::{CloudInitFragment, Step, shell_quote};

/// Turn swap off now and comment out swap mounts so it stays off
///
/// kubelet refuses to start while swap is enabled.
#[derive(Debug, Clone)]
pub struct DisableSwap {
    /// Mount table to edit
    pub fstab: String,
    /// Description
    description: String,
}

impl DisableSwap {
    pub fn new() -> Self {
        Self {
            fstab: "/etc/fstab".into(),
            description: "Disable swap".into(),
        }
    }

    /// Edit a different mount table
    pub fn with_fstab(mut self, path: impl Into<String>) -> Self {
        self.fstab = path.into();
        self
    }

    fn comment_entries(&self) -> String {
        format!(
            r"sed -i -E 's/^([^#].*[[:space:]]swap[[:space:]].*)$/#\1/' {}",
            shell_quote(&self.fstab)
        )
    }
}

impl Default for DisableSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for DisableSwap {
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
        vec!["swapoff -a".into(), self.comment_entries()]
    }

    fn check_command(&self) -> Option<String> {
        Some(format!(
            "[ \"$(tail -n +2 /proc/swaps | wc -l)\" -eq 0 ] && ! grep -qE '^[^#].*[[:space:]]swap[[:space:]]' {}",
            shell_quote(&self.fstab)
        ))
    }
}
