//! Configuration file templates

use tera::{Context, Tera};

const APT_SOURCE: &str = include_str!("../templates/kubernetes.list.tera");
const RPM_REPO: &str = include_str!("../templates/kubernetes.repo.tera");
const SYSCTL_CONF: &str = include_str!("../templates/k8s-sysctl.conf.tera");

fn render(name: &str, template: &str, context: &Context) -> Result<String, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(name, template)?;
    tera.render(name, context)
}

/// APT source list entry signed by `keyring`
pub fn apt_source(base_url: &str, keyring: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("base_url", base_url);
    context.insert("keyring", keyring);
    render("kubernetes.list", APT_SOURCE, &context)
}

/// YUM/DNF repository definition excluding `excluded` from normal upgrades
pub fn rpm_repo(
    name: &str,
    base_url: &str,
    key_url: &str,
    excluded: &[&str],
) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("name", name);
    context.insert("base_url", base_url);
    context.insert("key_url", key_url);
    context.insert("excluded", excluded);
    render("kubernetes.repo", RPM_REPO, &context)
}

/// sysctl drop-in setting every key to 1
pub fn sysctl_conf(keys: &[&str]) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("keys", keys);
    render("k8s-sysctl.conf", SYSCTL_CONF, &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_apt_source() {
        let line = apt_source(
            "https://pkgs.k8s.io/core:/stable:/v1.33/deb/",
            "/etc/apt/keyrings/kubernetes-apt-keyring.gpg",
        )
        .unwrap();
        assert_eq!(
            line.trim_end(),
            "deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v1.33/deb/ /"
        );
    }

    #[test]
    fn renders_rpm_repo_with_excludes() {
        let repo = rpm_repo(
            "kubernetes",
            "https://example.com/el7-$basearch",
            "https://example.com/key.gpg",
            &["kubelet", "kubeadm", "kubectl"],
        )
        .unwrap();
        assert!(repo.starts_with("[kubernetes]\n"));
        assert!(repo.contains("baseurl=https://example.com/el7-$basearch\n"));
        assert!(repo.contains("exclude=kubelet kubeadm kubectl"));
    }

    #[test]
    fn renders_sysctl_lines() {
        let conf = sysctl_conf(&["net.bridge.bridge-nf-call-iptables", "net.ipv4.ip_forward"])
            .unwrap();
        assert!(conf.contains("net.bridge.bridge-nf-call-iptables = 1\n"));
        assert!(conf.contains("net.ipv4.ip_forward = 1\n"));
    }
}
