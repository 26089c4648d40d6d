//! Package manager strategies
//!
//! Debian-family hosts use [`Apt`]; Red Hat family hosts use [`Rpm`] driving
//! either `yum` or `dnf`. Each strategy renders commands and steps; nothing
//! here touches the host directly.

use crate::steps::{
    EnsureDirectory, PackageSpec, Repository, RunCommand, Step, WriteFile, shell_quote,
};
use crate::templates;

/// Capabilities the manifest needs from a package manager
pub trait PackageManager: Send + Sync {
    /// Tool name (`apt`, `yum`, `dnf`)
    fn name(&self) -> &'static str;

    /// Command succeeding when the package is installed at the wanted version
    fn is_installed(&self, package: &PackageSpec) -> String;

    /// Non-interactive install command
    fn install(&self, packages: &[PackageSpec], repository: Option<&str>) -> String;

    /// Refresh package indexes
    fn refresh_index(&self) -> String;

    /// Steps registering an upstream repository and its signing key
    fn add_repository(&self, repo: &Repository) -> Result<Vec<Box<dyn Step>>, tera::Error>;

    /// Step preventing unintended upgrades of `packages`, if the tool needs one
    fn hold(&self, packages: &[String]) -> Option<RunCommand>;

    /// Prerequisites installed before anything else
    fn base_packages(&self) -> &'static [&'static str];

    /// The Kubernetes repository for `version`
    fn kubernetes_repository(&self, version: &crate::KubeVersion) -> Repository;
}

/// Debian and Ubuntu
#[derive(Debug, Clone, Copy, Default)]
pub struct Apt;

impl Apt {
    pub const KEYRING_DIR: &'static str = "/etc/apt/keyrings";

    fn keyring_path(repo: &Repository) -> String {
        format!("{}/{}-apt-keyring.gpg", Self::KEYRING_DIR, repo.name)
    }
}

impl PackageManager for Apt {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn is_installed(&self, package: &PackageSpec) -> String {
        match &package.version {
            Some(version) => format!(
                "dpkg-query -W -f='${{Status}} ${{Version}}' {} 2>/dev/null | grep -q '^install ok installed {}-'",
                package.name,
                version.to_string().replace('.', "\\.")
            ),
            None => format!("dpkg -s {} >/dev/null 2>&1", package.name),
        }
    }

    fn install(&self, packages: &[PackageSpec], _repository: Option<&str>) -> String {
        let args: Vec<String> = packages
            .iter()
            .map(|p| match &p.version {
                Some(version) => shell_quote(&format!("{}={}", p.name, version.apt_pin())),
                None => shell_quote(&p.name),
            })
            .collect();
        format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-change-held-packages {}",
            args.join(" ")
        )
    }

    fn refresh_index(&self) -> String {
        "apt-get update".into()
    }

    fn add_repository(&self, repo: &Repository) -> Result<Vec<Box<dyn Step>>, tera::Error> {
        let keyring = Self::keyring_path(repo);
        let source = templates::apt_source(&repo.base_url, &keyring)?;

        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(EnsureDirectory::new(Self::KEYRING_DIR).with_permissions("0755")),
            Box::new(
                RunCommand::new(
                    format!("Import {} signing key", repo.name),
                    format!(
                        "curl -fsSL {} | gpg --dearmor --yes -o {keyring}",
                        shell_quote(&repo.key_url)
                    ),
                )
                .unless(format!("[ -s {keyring} ]")),
            ),
            Box::new(
                WriteFile::new(format!("/etc/apt/sources.list.d/{}.list", repo.name), source)
                    .with_permissions("0644")
                    .describe(format!("Add {} apt repository", repo.name)),
            ),
            Box::new(RunCommand::new(
                "Refresh apt package index",
                self.refresh_index(),
            )),
        ];
        Ok(steps)
    }

    fn hold(&self, packages: &[String]) -> Option<RunCommand> {
        let pattern = packages.join("|");
        Some(
            RunCommand::new(
                format!("Hold {}", packages.join(", ")),
                format!("apt-mark hold {}", packages.join(" ")),
            )
            .unless(format!(
                "apt-mark showhold | grep -cxE '({pattern})' | grep -qx {}",
                packages.len()
            )),
        )
    }

    fn base_packages(&self) -> &'static [&'static str] {
        &[
            "curl",
            "containerd",
            "apt-transport-https",
            "ca-certificates",
            "gnupg",
        ]
    }

    fn kubernetes_repository(&self, version: &crate::KubeVersion) -> Repository {
        Repository::kubernetes_apt(version)
    }
}

/// CentOS (`yum`) and Fedora (`dnf`)
#[derive(Debug, Clone, Copy)]
pub struct Rpm {
    tool: &'static str,
}

impl Rpm {
    pub fn yum() -> Self {
        Self { tool: "yum" }
    }

    pub fn dnf() -> Self {
        Self { tool: "dnf" }
    }
}

impl PackageManager for Rpm {
    fn name(&self) -> &'static str {
        self.tool
    }

    fn is_installed(&self, package: &PackageSpec) -> String {
        match &package.version {
            Some(version) => format!(
                "rpm -q {}-{} >/dev/null 2>&1",
                package.name,
                version.rpm_pin()
            ),
            None => format!("rpm -q {} >/dev/null 2>&1", package.name),
        }
    }

    fn install(&self, packages: &[PackageSpec], repository: Option<&str>) -> String {
        let args: Vec<String> = packages
            .iter()
            .map(|p| match &p.version {
                Some(version) => format!("{}-{}", p.name, version.rpm_pin()),
                None => p.name.clone(),
            })
            .collect();
        let mut cmd = format!("{} install -y {}", self.tool, args.join(" "));
        if let Some(repo) = repository {
            cmd.push_str(&format!(" --disableexcludes={repo}"));
        }
        cmd
    }

    fn refresh_index(&self) -> String {
        format!("{} makecache -y", self.tool)
    }

    fn add_repository(&self, repo: &Repository) -> Result<Vec<Box<dyn Step>>, tera::Error> {
        let pinned: Vec<&str> = repo.pinned.iter().map(String::as_str).collect();
        let content = templates::rpm_repo(&repo.name, &repo.base_url, &repo.key_url, &pinned)?;

        let step = WriteFile::new(format!("/etc/yum.repos.d/{}.repo", repo.name), content)
            .with_permissions("0644")
            .describe(format!("Add {} {} repository", repo.name, self.tool));
        let steps: Vec<Box<dyn Step>> = vec![Box::new(step)];
        Ok(steps)
    }

    fn hold(&self, _packages: &[String]) -> Option<RunCommand> {
        // The repository's exclude= line already keeps them pinned
        None
    }

    fn base_packages(&self) -> &'static [&'static str] {
        &["curl", "containerd", "bash-completion"]
    }

    fn kubernetes_repository(&self, _version: &crate::KubeVersion) -> Repository {
        Repository::kubernetes_rpm()
    }
}
