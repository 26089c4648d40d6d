//! kubeinit - Kubernetes Node Bootstrap
//!
//! Turns a fresh Debian, Ubuntu, CentOS or Fedora host into a Kubernetes
//! node with a single command.
//! - Worker: prepares the host and installs containerd, kubelet, kubeadm, kubectl
//! - Control plane (`--flannel` / `--calico`): additionally runs `kubeadm init`
//!   and applies the network plugin

mod logging;
mod progress;

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::{env, fs, process};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use console::{Emoji, Term, style};
use kubeinit_provision::{
    BashRenderer, CloudInitRenderer, Cni, HostFacts, HostProfile, InstallConfig, KubeVersion,
    LocalShell, Manifest, Operator, RunError, RunReport, Renderer, Runner,
    parse_hostname, preflight,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use progress::SpinnerProgress;

static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

const DEFAULT_CONFIG: &str = "/etc/kubeinit/config.toml";
const DEFAULT_LOG_FILE: &str = "/var/log/kubeinit.log";

/// Configuration file structure
/// Path: /etc/kubeinit/config.toml
#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    kubernetes: KubernetesConfig,
    #[serde(default)]
    node: NodeConfig,
}

#[derive(Debug, Default, Deserialize)]
struct KubernetesConfig {
    version: Option<String>,
    cni: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    hostname: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "kubeinit",
    about = "Bootstrap a Kubernetes control-plane or worker node with kubeadm",
    disable_version_flag = true
)]
struct Args {
    /// Hostname to set (underscores become hyphens)
    #[arg(long, value_parser = parse_hostname)]
    hostname: Option<String>,

    /// Kubernetes version to install (e.g., 1.33.2 or v1.33.2)
    #[arg(short = 'v', long = "version", value_name = "VERSION")]
    kubernetes_version: Option<KubeVersion>,

    /// Initialize a control plane with the Flannel CNI
    #[arg(long, conflicts_with = "calico")]
    flannel: bool,

    /// Initialize a control plane with the Calico CNI
    #[arg(long)]
    calico: bool,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log file receiving every command and its output
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Print the plan and the equivalent bash script, change nothing
    #[arg(long)]
    dry_run: bool,

    /// Print the plan as cloud-init user-data, change nothing
    #[arg(long, conflicts_with = "dry_run")]
    cloud_init: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Root of the system to probe
    #[arg(long, hide = true, default_value = "/")]
    sysroot: PathBuf,
}

impl Args {
    /// Whether this invocation only prints
    fn preview(&self) -> bool {
        self.dry_run || self.cloud_init
    }
}

/// Split argv into what clap understands and what gets ignored
///
/// Known flags keep their values; unknown flags and stray words are
/// returned separately so they can be reported instead of aborting.
fn filter_known_args(raw: Vec<OsString>) -> (Vec<OsString>, Vec<String>) {
    let mut command = Args::command();
    command.build();

    let mut longs: HashMap<String, bool> = HashMap::new();
    let mut shorts: HashMap<char, bool> = HashMap::new();
    for arg in command.get_arguments() {
        let takes_value = arg.get_action().takes_values();
        if let Some(long) = arg.get_long() {
            longs.insert(long.to_string(), takes_value);
        }
        if let Some(short) = arg.get_short() {
            shorts.insert(short, takes_value);
        }
    }

    let mut raw = raw.into_iter();
    let mut kept: Vec<OsString> = raw.next().into_iter().collect();
    let mut ignored = vec![];

    while let Some(arg) = raw.next() {
        let text = arg.to_string_lossy().into_owned();

        let takes_value = if text == "--" {
            ignored.extend(raw.by_ref().map(|a| a.to_string_lossy().into_owned()));
            break;
        } else if let Some(long) = text.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            match longs.get(name) {
                Some(&takes) => takes && !inline,
                None => {
                    ignored.push(text);
                    continue;
                }
            }
        } else if let Some(cluster) = text.strip_prefix('-').filter(|s| !s.is_empty()) {
            match cluster_takes_value(cluster, &shorts) {
                Some(takes) => takes,
                None => {
                    ignored.push(text);
                    continue;
                }
            }
        } else {
            ignored.push(text);
            continue;
        };

        kept.push(arg);
        if takes_value && let Some(value) = raw.next() {
            kept.push(value);
        }
    }

    (kept, ignored)
}

/// Whether a short flag cluster like `-yv` consumes the next argument
///
/// The first value-taking flag ends the cluster; any characters after it
/// are its attached value. `None` when the cluster holds an unknown flag.
fn cluster_takes_value(cluster: &str, shorts: &HashMap<char, bool>) -> Option<bool> {
    for (i, c) in cluster.char_indices() {
        if *shorts.get(&c)? {
            return Some(cluster[i + c.len_utf8()..].is_empty());
        }
    }
    Some(false)
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// Resolve the install configuration
///
/// Priority: CLI args > env vars > config file > defaults
fn resolve_config(args: &Args, config: &Config) -> Result<InstallConfig> {
    let kubernetes_version = match args.kubernetes_version {
        Some(version) => version,
        None => env::var("KUBEINIT_VERSION")
            .ok()
            .or_else(|| config.kubernetes.version.clone())
            .map(|v| v.parse::<KubeVersion>())
            .transpose()?
            .unwrap_or_default(),
    };

    let cni = if args.flannel {
        Cni::Flannel
    } else if args.calico {
        Cni::Calico
    } else {
        env::var("KUBEINIT_CNI")
            .ok()
            .or_else(|| config.kubernetes.cni.clone())
            .map(|c| c.parse::<Cni>())
            .transpose()?
            .unwrap_or_default()
    };

    let hostname = args
        .hostname
        .clone()
        .or_else(|| env::var("KUBEINIT_HOSTNAME").ok())
        .or_else(|| config.node.hostname.clone())
        .map(|h| parse_hostname(&h))
        .transpose()?;

    let sudo_user = env::var("SUDO_USER").ok();
    let operator =
        Operator::resolve(sudo_user.as_deref()).context("Failed to resolve invoking user")?;

    let mut builder = InstallConfig::builder()
        .kubernetes_version(kubernetes_version)
        .cni(cni)
        .operator(operator);
    if let Some(hostname) = hostname {
        builder = builder.hostname(hostname);
    }
    Ok(builder.build())
}

fn main() {
    let (argv, ignored) = filter_known_args(env::args_os().collect());
    let args = Args::parse_from(argv);

    let log_file = (!args.preview()).then_some(args.log_file.as_path());
    if let Err(err) = logging::init(log_file) {
        eprintln!("{CROSS}{err:#}");
        process::exit(1);
    }

    for arg in &ignored {
        warn!("Ignoring unrecognized argument '{arg}'");
    }

    if let Err(err) = run(&args) {
        error!("{err:#}");
        process::exit(exit_code(&err));
    }
}

fn run(args: &Args) -> Result<()> {
    let file_config = load_config(&args.config)?;
    let config = resolve_config(args, &file_config)?;

    // Nothing is touched in preview mode, so privileges do not matter
    if !args.preview() {
        preflight(&HostFacts::gather(), &config)?;
    }

    let host = HostProfile::detect(&args.sysroot).context("Failed to probe host")?;
    info!(
        os = %host.os,
        role = %config.role,
        version = %config.kubernetes_version,
        "Probed host"
    );

    let manifest = Manifest::node(&config, &host)?;

    if args.cloud_init {
        let yaml = CloudInitRenderer::new().render(&manifest)?;
        print!("{yaml}");
        return Ok(());
    }

    print_banner();
    print_plan_table(&config, &host, &manifest);

    if args.dry_run {
        println!("\n{LOOKING_GLASS} Dry run - nothing will be changed\n");
        let script = BashRenderer::new()
            .verbose(false)
            .color(false)
            .render(&manifest)
            .context("Failed to render bash script")?;
        print!("{script}");
        return Ok(());
    }

    if !confirm(args.yes, manifest.len())? {
        println!("Aborted.");
        return Ok(());
    }

    println!("\n{ROCKET} Bootstrapping node...\n");
    println!("{}", style("-".repeat(50)).dim());
    let mut progress = SpinnerProgress::new();
    let report = Runner::new(LocalShell::new()).run(&manifest, &mut progress)?;
    drop(progress);
    println!("{}", style("-".repeat(50)).dim());

    print_success(&config, &report, &args.log_file);
    Ok(())
}

/// A failed step exits with its command's status, anything else with 1
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<RunError>())
        .map_or(1, RunError::exit_code)
}

/// Ask before mutating the host, unless told not to or not on a terminal
fn confirm(yes: bool, steps: usize) -> Result<bool> {
    if yes || !Term::stdout().is_term() {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(format!("Apply {steps} steps to this host?"))
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════╗")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("║       KUBERNETES NODE BOOTSTRAP       ║")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════╝")
            .cyan()
            .bold()
    );
}

fn print_plan_table(config: &InstallConfig, host: &HostProfile, manifest: &Manifest) {
    println!("\n{} Plan\n", style("▸").blue().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Setting").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Cyan),
    ]);

    table.add_row(vec![
        "OS",
        &format!("{} ({})", host.os, host.package_manager().name()),
    ]);
    table.add_row(vec!["Role", &config.role.to_string()]);
    table.add_row(vec!["Kubernetes", &config.kubernetes_version.to_string()]);
    let cni = match config.pod_network_cidr() {
        Some(cidr) => format!("{} ({cidr})", config.cni),
        None => config.cni.to_string(),
    };
    table.add_row(vec!["CNI", &cni]);
    let hostname = match &manifest.hostname {
        Some(name) => format!("{} -> {name}", host.hostname),
        None => format!("{} (unchanged)", host.hostname),
    };
    table.add_row(vec!["Hostname", &hostname]);
    table.add_row(vec!["Operator", &config.operator.name]);
    table.add_row(vec!["Steps", &manifest.len().to_string()]);

    println!("{table}");
}

fn print_success(config: &InstallConfig, report: &RunReport, log_file: &Path) {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════╗")
            .green()
            .bold()
    );
    println!(
        "{}",
        style("║              NODE READY!              ║")
            .green()
            .bold()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════╝")
            .green()
            .bold()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    table.add_row(vec![
        Cell::new("Applied").fg(Color::Cyan),
        Cell::new(report.applied()),
    ]);
    table.add_row(vec![
        Cell::new("Skipped").fg(Color::Cyan),
        Cell::new(report.skipped()),
    ]);
    if config.is_control_plane() {
        table.add_row(vec![
            Cell::new("Kubeconfig").fg(Color::Cyan),
            Cell::new(config.operator.kubeconfig_path().display()),
        ]);
    }
    table.add_row(vec![
        Cell::new("Log").fg(Color::Cyan),
        Cell::new(log_file.display()),
    ]);

    println!("{table}");

    for warning in report.warnings() {
        println!(
            "{} Step {} '{}' did not complete",
            style("!").yellow(),
            warning.index,
            warning.description
        );
    }
    println!();

    if config.is_control_plane() {
        println!("{SPARKLE} Control plane initialized!");
        println!();
        println!("  Check the cluster:");
        println!("    {}", style("kubectl get nodes").cyan());
        println!("  Print the command that joins a worker:");
        println!(
            "    {}",
            style("kubeadm token create --print-join-command").cyan()
        );
    } else {
        println!("{SPARKLE} Worker prepared!");
        println!();
        println!("  On the control plane, run:");
        println!(
            "    {}",
            style("kubeadm token create --print-join-command").cyan()
        );
        println!("  Then run the printed 'kubeadm join ...' command here as root.");
    }
    println!();
    println!("{FOLDER} Full log: {}", log_file.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeinit_provision::ShellError;

    fn argv(args: &[&str]) -> Vec<OsString> {
        std::iter::once("kubeinit")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn unknown_flags_are_dropped_with_values_kept() {
        let (kept, ignored) = filter_known_args(argv(&[
            "--bogus",
            "-v",
            "v1.34.0",
            "stray",
            "--hostname=my_node",
            "-x",
            "--calico",
        ]));

        assert_eq!(
            kept,
            argv(&["-v", "v1.34.0", "--hostname=my_node", "--calico"])
        );
        assert_eq!(ignored, vec!["--bogus", "stray", "-x"]);
    }

    #[test]
    fn attached_short_value_is_kept() {
        let (kept, ignored) = filter_known_args(argv(&["-v1.34.0", "-y"]));
        assert_eq!(kept, argv(&["-v1.34.0", "-y"]));
        assert!(ignored.is_empty());
    }

    #[test]
    fn short_cluster_ending_in_value_flag() {
        let (kept, ignored) = filter_known_args(argv(&["-yv", "1.34.0", "stray"]));
        assert_eq!(kept, argv(&["-yv", "1.34.0"]));
        assert_eq!(ignored, vec!["stray"]);

        let args = Args::parse_from(kept);
        assert!(args.yes);
        assert_eq!(args.kubernetes_version, Some("1.34.0".parse().unwrap()));
    }

    #[test]
    fn cluster_with_unknown_flag_is_dropped() {
        let (kept, ignored) = filter_known_args(argv(&["-yq", "--calico"]));
        assert_eq!(kept, argv(&["--calico"]));
        assert_eq!(ignored, vec!["-yq"]);
    }

    #[test]
    fn failed_step_exit_code_propagates() {
        let failed = |code| RunError {
            index: 4,
            step: "Install containerd".into(),
            source: ShellError::Failed {
                command: "apt-get install -y containerd".into(),
                code,
                stderr: String::new(),
            },
        };

        let err = anyhow::Error::new(failed(Some(100)));
        assert_eq!(exit_code(&err), 100);
        assert_eq!(exit_code(&err.context("Bootstrap failed")), 100);
        assert_eq!(exit_code(&anyhow::Error::new(failed(None))), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("Failed to probe host")), 1);
    }

    #[test]
    fn cli_overrides_config_file() {
        let args = Args::parse_from(argv(&["--hostname", "cp_1", "-v", "v1.34.0", "--calico"]));
        let file = Config {
            kubernetes: KubernetesConfig {
                version: Some("1.30.0".into()),
                cni: Some("flannel".into()),
            },
            node: NodeConfig {
                hostname: Some("other".into()),
            },
        };

        let config = resolve_config(&args, &file).unwrap();
        assert_eq!(config.kubernetes_version.to_string(), "1.34.0");
        assert_eq!(config.cni, Cni::Calico);
        assert!(config.is_control_plane());
        assert_eq!(config.hostname.as_deref(), Some("cp-1"));
    }

    #[test]
    fn parses_config_file() {
        let config: Config = toml::from_str(
            r#"
            [kubernetes]
            version = "v1.32.4"
            cni = "flannel"

            [node]
            hostname = "edge_7"
            "#,
        )
        .unwrap();

        assert_eq!(config.kubernetes.version.as_deref(), Some("v1.32.4"));
        assert_eq!(config.kubernetes.cni.as_deref(), Some("flannel"));
        assert_eq!(config.node.hostname.as_deref(), Some("edge_7"));
    }

    #[test]
    fn cni_flags_conflict() {
        let err = Args::try_parse_from(argv(&["--flannel", "--calico"])).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
