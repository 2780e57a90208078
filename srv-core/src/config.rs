//! Process configuration.
//!
//! A [`Config`] is built once at startup and handed to every component that
//! needs it. Nothing here is cached globally; call [`Config::reload`] to pick
//! up environment changes.
//!
//! # Root resolution
//!
//! `SRV_ROOT` (must be absolute) → `$XDG_CONFIG_HOME/srv` → `~/.config/srv`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::constants::{
    ACME_FILE, APP_NAME, CERTS_SUBDIR, COMPOSE_FILE, CONF_SUBDIR, DEFAULT_CONFIG_DIR,
    DEFAULT_HOSTNAME, DNSMASQ_CONF_FILE, DYNAMIC_CONFIG_FILE, ENV_SRV_ROOT, ENV_XDG_CONFIG_HOME,
    LOCAL_DOMAINS_FILE, LOGS_SUBDIR, NETWORK_HASH_LEN, NETWORK_SUFFIX, PROXIES_SUBDIR,
    PROXY_ENV_FILE, PROXY_ROUTE_PREFIX, PROXY_SUBDIR, SITES_SUBDIR, STATIC_CONFIG_FILE, YAML_EXT,
};
use crate::error::ConfigError;

/// Snapshot of the environment inputs that determine a [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    pub srv_root: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub hostname: Option<String>,
}

impl ConfigSource {
    /// Read the current process environment.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            srv_root: non_empty(ENV_SRV_ROOT),
            xdg_config_home: non_empty(ENV_XDG_CONFIG_HOME),
            home: dirs::home_dir(),
            hostname: read_hostname(),
        }
    }
}

/// Resolved srv paths and the shared network name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base directory for all srv state.
    pub root: PathBuf,
    /// Proxy stack directory (compose file, dnsmasq config, domain registry).
    pub proxy_dir: PathBuf,
    /// One subdirectory per registered site.
    pub sites_dir: PathBuf,
    /// Shared container network every site container is attached to.
    pub network_name: String,
    source: ConfigSource,
}

impl Config {
    /// Resolve configuration from the process environment, creating the root.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(ConfigSource::from_env())
    }

    /// Resolve configuration from an explicit environment snapshot.
    pub fn from_source(source: ConfigSource) -> Result<Self, ConfigError> {
        let root = resolve_root(&source)?;
        std::fs::create_dir_all(&root).map_err(|e| ConfigError::CreateDir {
            path: root.clone(),
            source: e,
        })?;
        let network_name = network_name_for(source.hostname.as_deref());
        Ok(Self::build(root, network_name, source))
    }

    /// Configuration rooted at `root` with a fixed network name. No I/O.
    pub fn at(root: impl Into<PathBuf>, network_name: impl Into<String>) -> Self {
        let root = root.into();
        let source = ConfigSource {
            srv_root: Some(root.clone()),
            ..ConfigSource::default()
        };
        Self::build(root, network_name.into(), source)
    }

    /// Re-resolve from the environment snapshot this config was built from
    /// merged with the current process environment.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let fresh = ConfigSource::from_env();
        let source = ConfigSource {
            srv_root: fresh.srv_root.or_else(|| self.source.srv_root.clone()),
            ..fresh
        };
        *self = Self::from_source(source)?;
        Ok(())
    }

    fn build(root: PathBuf, network_name: String, source: ConfigSource) -> Self {
        Self {
            proxy_dir: root.join(PROXY_SUBDIR),
            sites_dir: root.join(SITES_SUBDIR),
            root,
            network_name,
            source,
        }
    }

    pub fn proxy_conf_dir(&self) -> PathBuf {
        self.proxy_dir.join(CONF_SUBDIR)
    }

    pub fn static_config_path(&self) -> PathBuf {
        self.proxy_conf_dir().join(STATIC_CONFIG_FILE)
    }

    pub fn dynamic_config_path(&self) -> PathBuf {
        self.proxy_conf_dir().join(DYNAMIC_CONFIG_FILE)
    }

    pub fn proxy_compose_path(&self) -> PathBuf {
        self.proxy_dir.join(COMPOSE_FILE)
    }

    pub fn dnsmasq_conf_path(&self) -> PathBuf {
        self.proxy_dir.join(DNSMASQ_CONF_FILE)
    }

    pub fn local_domains_path(&self) -> PathBuf {
        self.proxy_dir.join(LOCAL_DOMAINS_FILE)
    }

    pub fn proxy_certs_dir(&self) -> PathBuf {
        self.proxy_dir.join(CERTS_SUBDIR)
    }

    pub fn acme_path(&self) -> PathBuf {
        self.proxy_certs_dir().join(ACME_FILE)
    }

    pub fn proxy_logs_dir(&self) -> PathBuf {
        self.proxy_dir.join(LOGS_SUBDIR)
    }

    /// `KEY=value` file holding the ACME contact email.
    pub fn proxy_env_path(&self) -> PathBuf {
        self.root.join(PROXY_ENV_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_SUBDIR)
    }

    pub fn site_dir(&self, name: &str) -> PathBuf {
        self.sites_dir.join(name)
    }

    /// One `<name>.yml` record per proxy route.
    pub fn proxies_dir(&self) -> PathBuf {
        self.root.join(PROXIES_SUBDIR)
    }

    /// Route file the proxy's file provider loads for proxy `name`.
    pub fn proxy_route_path(&self, name: &str) -> PathBuf {
        self.proxy_conf_dir()
            .join(format!("{PROXY_ROUTE_PREFIX}{name}{YAML_EXT}"))
    }
}

fn resolve_root(source: &ConfigSource) -> Result<PathBuf, ConfigError> {
    if let Some(root) = &source.srv_root {
        if !root.is_absolute() {
            return Err(ConfigError::RelativeRoot(root.clone()));
        }
        return Ok(root.clone());
    }

    let config_dir = match (&source.xdg_config_home, &source.home) {
        (Some(xdg), _) => xdg.clone(),
        (None, Some(home)) => home.join(DEFAULT_CONFIG_DIR),
        (None, None) => return Err(ConfigError::HomeNotFound),
    };
    Ok(config_dir.join(APP_NAME))
}

/// `sha256(hostname)[..12] + "_traefik"`; stable per machine.
pub fn network_name_for(hostname: Option<&str>) -> String {
    let hostname = hostname
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_HOSTNAME);
    let digest = hex::encode(Sha256::digest(hostname.as_bytes()));
    format!("{}{NETWORK_SUFFIX}", &digest[..NETWORK_HASH_LEN])
}

fn read_hostname() -> Option<String> {
    if let Some(name) = std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()) {
        return Some(name);
    }
    std::fs::read_to_string(Path::new("/etc/hostname"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn srv_root_takes_priority() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("custom");
        let cfg = Config::from_source(ConfigSource {
            srv_root: Some(root.clone()),
            xdg_config_home: Some(dir.path().join("xdg")),
            home: Some(dir.path().to_path_buf()),
            hostname: Some("box".into()),
        })
        .expect("config");
        assert_eq!(cfg.root, root);
        assert!(root.is_dir(), "root is created on load");
        assert_eq!(cfg.proxy_dir, root.join("traefik"));
        assert_eq!(cfg.sites_dir, root.join("sites"));
    }

    #[test]
    fn relative_srv_root_is_rejected() {
        let err = Config::from_source(ConfigSource {
            srv_root: Some(PathBuf::from("relative/root")),
            ..ConfigSource::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::RelativeRoot(_)));
    }

    #[test]
    fn xdg_then_home_fallback() {
        let dir = TempDir::new().expect("tempdir");
        let xdg = Config::from_source(ConfigSource {
            xdg_config_home: Some(dir.path().join("xdg")),
            home: Some(dir.path().join("home")),
            ..ConfigSource::default()
        })
        .expect("xdg config");
        assert_eq!(xdg.root, dir.path().join("xdg").join("srv"));

        let home = Config::from_source(ConfigSource {
            home: Some(dir.path().join("home")),
            ..ConfigSource::default()
        })
        .expect("home config");
        assert_eq!(home.root, dir.path().join("home").join(".config").join("srv"));
    }

    #[test]
    fn missing_home_is_an_error() {
        let err = Config::from_source(ConfigSource::default()).unwrap_err();
        assert!(matches!(err, ConfigError::HomeNotFound));
    }

    #[test]
    fn network_name_is_stable_and_suffixed() {
        let a = network_name_for(Some("workstation"));
        let b = network_name_for(Some("workstation"));
        assert_eq!(a, b);
        assert!(a.ends_with("_traefik"));
        assert_eq!(a.len(), NETWORK_HASH_LEN + NETWORK_SUFFIX.len());
        assert_ne!(a, network_name_for(Some("laptop")));
        assert_eq!(network_name_for(None), network_name_for(Some("  ")));
    }

    #[test]
    fn derived_paths_live_under_proxy_dir() {
        let cfg = Config::at("/srv-root", "net_traefik");
        assert_eq!(cfg.static_config_path(), PathBuf::from("/srv-root/traefik/conf/traefik.yml"));
        assert_eq!(cfg.dnsmasq_conf_path(), PathBuf::from("/srv-root/traefik/dnsmasq.conf"));
        assert_eq!(cfg.local_domains_path(), PathBuf::from("/srv-root/traefik/local-domains.txt"));
        assert_eq!(cfg.acme_path(), PathBuf::from("/srv-root/traefik/certs/acme.json"));
        assert_eq!(cfg.site_dir("blog"), PathBuf::from("/srv-root/sites/blog"));
    }
}
