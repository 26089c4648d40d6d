//! Error types for probing, preflight and step execution

use std::io;

/// Invalid installation settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid Kubernetes version '{0}', expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("Unknown CNI '{0}', expected one of: none, flannel, calico")]
    InvalidCni(String),

    #[error("Invalid hostname '{0}'")]
    InvalidHostname(String),

    #[error("No account named '{0}'")]
    UnknownUser(String),

    #[error("Failed to look up the invoking account: {0}")]
    AccountLookup(#[from] nix::Error),
}

/// Failure to classify the host
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A precondition that must hold before the host is touched
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("kubeinit must be run as root")]
    NotRoot,

    #[error("A control-plane node needs at least {required} CPU cores, this host has {cores}")]
    InsufficientCpus { cores: usize, required: usize },
}

/// Failure of a single shell invocation
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Failed to execute '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command failed ({}): {command}{}", describe_code(.code), stderr_suffix(.stderr))]
    Failed {
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        stderr: String,
    },
}

impl ShellError {
    /// Non-zero exit code of the failed command, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => code.filter(|c| *c != 0),
            Self::Launch { .. } => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".into(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
    last.map(|l| format!("\n  {}", l.trim())).unwrap_or_default()
}

/// The step at which a run stopped
#[derive(Debug, thiserror::Error)]
#[error("Step {index} '{step}' failed: {source}")]
pub struct RunError {
    /// 1-based position in the manifest
    pub index: usize,
    /// Step description
    pub step: String,
    #[source]
    pub source: ShellError,
}

impl RunError {
    /// Process exit status for this failure: the failing command's own
    /// code when it has one, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code().unwrap_or(1)
    }
}

/// Failure to assemble a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to render template: {0}")]
    Template(#[from] tera::Error),
}
