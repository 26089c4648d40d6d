//! Bash script renderer
//!
//! The script is idempotent: every step with a check runs it first and
//! skips the step when it succeeds. In verbose mode each step emits
//! machine-readable markers on stdout:
//!
//! ```text
//! KUBEINIT_STEP:START:3:Disable swap
//! KUBEINIT_STEP:DONE:3:Disable swap
//! KUBEINIT_STEP:SKIP:4:Ensure service containerd
//! KUBEINIT_STEP:FAIL:5:Install kubelet, kubeadm, kubectl 1.33.2
//! KUBEINIT_STEP:COMPLETE:27
//! ```

use std::fmt::Write;

use crate::Manifest;
use crate::steps::shell_quote;

use super::Renderer;

/// Renders a manifest as a standalone bash script
#[derive(Debug, Clone)]
pub struct BashRenderer {
    verbose: bool,
    color: bool,
    require_root: bool,
}

impl BashRenderer {
    /// Create a new bash renderer
    pub fn new() -> Self {
        Self {
            verbose: false,
            color: true,
            require_root: true,
        }
    }

    /// Emit progress markers
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Use ANSI colors in status lines
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Refuse to run unless uid is 0
    pub fn require_root(mut self, require_root: bool) -> Self {
        self.require_root = require_root;
        self
    }

    fn marker(&self, action: &str, index: usize) -> Option<String> {
        self.verbose
            .then(|| format!("echo \"KUBEINIT_STEP:{action}:{index}:$STEP_DESC\""))
    }

    fn status(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("printf '%b%s%b\\n' \"${color}\" {text} \"$NC\"")
        } else {
            format!("printf '%s\\n' {text}")
        }
    }
}

impl Default for BashRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BashRenderer {
    type Output = String;
    type Error = std::fmt::Error;

    fn render(&self, manifest: &Manifest) -> Result<String, Self::Error> {
        let total = manifest.steps.len();
        let mut out = String::new();

        writeln!(out, "#!/usr/bin/env bash")?;
        writeln!(
            out,
            "# Generated by kubeinit {}",
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(out, "set -Eeo pipefail")?;
        writeln!(out, "export DEBIAN_FRONTEND=noninteractive")?;
        writeln!(out)?;

        if self.color {
            writeln!(out, "RED='\\033[0;31m'")?;
            writeln!(out, "GREEN='\\033[0;32m'")?;
            writeln!(out, "YELLOW='\\033[0;33m'")?;
            writeln!(out, "NC='\\033[0m'")?;
            writeln!(out)?;
        }

        if self.require_root {
            writeln!(out, "if [ \"$(id -u)\" -ne 0 ]; then")?;
            writeln!(
                out,
                "    {} >&2",
                self.status("RED", "'This script must be run as root'")
            )?;
            writeln!(out, "    exit 1")?;
            writeln!(out, "fi")?;
            writeln!(out)?;
        }

        writeln!(out, "STEP=0")?;
        writeln!(out, "STEP_DESC=")?;
        if self.verbose {
            writeln!(
                out,
                "trap 'echo \"KUBEINIT_STEP:FAIL:$STEP:$STEP_DESC\"' ERR"
            )?;
        }
        writeln!(out)?;

        for (i, step) in manifest.steps.iter().enumerate() {
            let index = i + 1;
            let progress = format!("\"[{index}/{total}] $STEP_DESC\"");

            writeln!(out, "# --- Step {index}: {}", step.description())?;
            writeln!(out, "STEP={index}")?;
            writeln!(out, "STEP_DESC={}", shell_quote(step.description()))?;
            if let Some(start) = self.marker("START", index) {
                writeln!(out, "{start}")?;
            }

            let mut body: Vec<String> = step
                .to_bash()
                .into_iter()
                .map(|cmd| {
                    if step.best_effort() {
                        format!(
                            "{{\n{cmd}\n}} || {} >&2",
                            self.status("YELLOW", "\"Warning: $STEP_DESC failed, continuing\"")
                        )
                    } else {
                        cmd
                    }
                })
                .collect();
            body.extend(self.marker("DONE", index));
            body.push(self.status("GREEN", &progress));
            let body = body.join("\n");

            match step.check_command() {
                Some(check) => {
                    writeln!(out, "if ( {check} ) >/dev/null 2>&1; then")?;
                    if let Some(skip) = self.marker("SKIP", index) {
                        writeln!(out, "    {skip}")?;
                    }
                    let skipped = format!("\"[{index}/{total}] $STEP_DESC (skipped)\"");
                    writeln!(out, "    {}", self.status("YELLOW", &skipped))?;
                    writeln!(out, "else")?;
                    // Unindented so heredoc delimiters stay in column 0
                    writeln!(out, "{body}")?;
                    writeln!(out, "fi")?;
                }
                None => writeln!(out, "{body}")?,
            }
            writeln!(out)?;
        }

        if self.verbose {
            writeln!(out, "echo \"KUBEINIT_STEP:COMPLETE:{total}\"")?;
        }
        writeln!(out, "{}", self.status("GREEN", "'kubeinit: all steps complete'"))?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{PullImages, RunCommand, WriteFile};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_script(script: &str) -> (bool, String) {
        let output = Command::new("bash").arg("-c").arg(script).output().unwrap();
        (
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        )
    }

    #[test]
    fn file_content_is_exact() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("k8s.conf");
        let manifest = Manifest::new().with_step(WriteFile::new(
            target.to_str().unwrap(),
            "net.bridge.bridge-nf-call-iptables = 1\n",
        ));
        let script = BashRenderer::new()
            .color(false)
            .require_root(false)
            .render(&manifest)
            .unwrap();

        let (ok, _) = run_script(&script);
        assert!(ok);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "net.bridge.bridge-nf-call-iptables = 1\n"
        );
    }

    #[test]
    fn second_run_skips_and_best_effort_continues() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let marker = marker.to_str().unwrap();
        let manifest = Manifest::new()
            .with_step(
                RunCommand::new("Touch marker", format!("touch {marker}"))
                    .unless(format!("[ -f {marker} ]")),
            )
            .with_step(RunCommand::new("Flaky", "false").best_effort());
        let script = BashRenderer::new()
            .verbose(true)
            .color(false)
            .require_root(false)
            .render(&manifest)
            .unwrap();

        let (ok, first) = run_script(&script);
        assert!(ok, "{first}");
        assert!(first.contains("KUBEINIT_STEP:DONE:1:Touch marker"));
        assert!(first.contains("KUBEINIT_STEP:DONE:2:Flaky"));
        assert!(first.contains("KUBEINIT_STEP:COMPLETE:2"));

        let (ok, second) = run_script(&script);
        assert!(ok);
        assert!(second.contains("KUBEINIT_STEP:SKIP:1:Touch marker"));
    }

    #[test]
    fn fatal_failure_emits_fail_marker() {
        let manifest = Manifest::new()
            .with_step(RunCommand::new("Broken", "false"))
            .with_step(RunCommand::new("Never", "echo never"));
        let script = BashRenderer::new()
            .verbose(true)
            .color(false)
            .require_root(false)
            .render(&manifest)
            .unwrap();

        let (ok, out) = run_script(&script);
        assert!(!ok);
        assert!(out.contains("KUBEINIT_STEP:FAIL:1:Broken"));
        assert!(!out.contains("never"));
    }

    #[test]
    fn failed_image_listing_aborts() {
        let dir = TempDir::new().unwrap();
        let kubeadm = dir.path().join("kubeadm");
        fs::write(&kubeadm, "#!/bin/sh\nexit 3\n").unwrap();
        fs::set_permissions(&kubeadm, fs::Permissions::from_mode(0o755)).unwrap();

        let manifest = Manifest::new().with_step(PullImages::new("1.33.2".parse().unwrap()));
        let script = BashRenderer::new()
            .verbose(true)
            .color(false)
            .require_root(false)
            .render(&manifest)
            .unwrap();
        let script = format!("export PATH={}:$PATH\n{script}", dir.path().display());

        let (ok, out) = run_script(&script);
        assert!(!ok, "{out}");
        assert!(out.contains("KUBEINIT_STEP:FAIL:1"));
        assert!(!out.contains("KUBEINIT_STEP:DONE:1"));
        assert!(!out.contains("KUBEINIT_STEP:COMPLETE"));
    }
}
