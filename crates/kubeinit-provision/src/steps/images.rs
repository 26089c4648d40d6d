//! Container image prefetch

use tracing::debug;

use super::{CloudInitFragment, Step, shell_quote};
use crate::config::KubeVersion;
use crate::error::ShellError;
use crate::shell::Shell;

/// Pull every image kubeadm needs for a release through containerd
///
/// Pulls are sequential; containerd's content store makes repeat pulls
/// cheap, so there is no skip check.
#[derive(Debug, Clone)]
pub struct PullImages {
    /// Release whose images are pulled
    pub version: KubeVersion,
    /// containerd namespace used by kubelet
    pub namespace: String,
    /// Description
    description: String,
}

impl PullImages {
    pub fn new(version: KubeVersion) -> Self {
        Self {
            description: format!("Pull Kubernetes {version} images"),
            version,
            namespace: "k8s.io".into(),
        }
    }

    /// Command printing the required images, one per line
    pub fn list_command(&self) -> String {
        format!(
            "kubeadm config images list --kubernetes-version {}",
            self.version.tag()
        )
    }

    fn pull_command(&self, image: &str) -> String {
        format!(
            "ctr -n {} images pull {}",
            self.namespace,
            shell_quote(image)
        )
    }
}

/// Parse `kubeadm config images list` output into image references
pub fn parse_image_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(char::is_whitespace))
        .map(String::from)
        .collect()
}

impl Step for PullImages {
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
        // A bare assignment lets `set -e` catch a failed listing
        vec![
            format!("images=$({})", self.list_command()),
            format!(
                "for image in $images; do\n    ctr -n {} images pull \"$image\"\ndone",
                self.namespace
            ),
        ]
    }

    fn check_command(&self) -> Option<String> {
        None
    }

    fn run(&self, shell: &mut dyn Shell) -> Result<(), ShellError> {
        let listed = shell.run(&self.list_command())?;
        let images = parse_image_list(&listed.stdout);
        debug!(count = images.len(), version = %self.version, "Pulling images");

        for image in &images {
            shell.run(&self.pull_command(image))?;
        }
        Ok(())
    }
}
