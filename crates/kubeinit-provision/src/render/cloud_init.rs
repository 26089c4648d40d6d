//! Cloud-init YAML renderer

use serde::Serialize;

use crate::Manifest;

use super::Renderer;

/// Renders a manifest as `#cloud-config` user-data
///
/// Files go to `write_files`, everything else to `runcmd` in manifest
/// order. Check commands are already folded into each runcmd entry.
#[derive(Debug, Clone)]
pub struct CloudInitRenderer {
    final_message: String,
}

#[derive(Serialize)]
struct CloudInitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preserve_hostname: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    write_files: Vec<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    runcmd: Vec<String>,
    final_message: String,
}

impl CloudInitRenderer {
    /// Create a new cloud-init renderer
    pub fn new() -> Self {
        Self {
            final_message: "kubeinit finished after $UPTIME seconds".into(),
        }
    }

    /// Replace the message cloud-init logs when done
    pub fn with_final_message(mut self, message: impl Into<String>) -> Self {
        self.final_message = message.into();
        self
    }
}

impl Default for CloudInitRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for CloudInitRenderer {
    type Output = String;
    type Error = serde_yaml::Error;

    fn render(&self, manifest: &Manifest) -> Result<String, Self::Error> {
        let mut write_files = vec![];
        let mut runcmd = vec![];

        for step in &manifest.steps {
            let fragment = step.to_cloud_init();
            for file in fragment.write_files {
                write_files.push(serde_yaml::to_value(&file)?);
            }
            runcmd.extend(fragment.runcmd);
        }

        let config = CloudInitConfig {
            hostname: manifest.hostname.clone(),
            preserve_hostname: manifest.hostname.as_ref().map(|_| false),
            write_files,
            runcmd,
            final_message: self.final_message.clone(),
        };

        let yaml = serde_yaml::to_string(&config)?;
        Ok(format!("#cloud-config\n{yaml}"))
    }
}
