//! Per-site and per-proxy YAML registries.
//!
//! # Storage layout
//!
//! ```text
//! <root>/sites/
//!   <site_name>/
//!     metadata.yml     (one file per site, written atomically)
//! <root>/proxies/
//!   <proxy_name>.yml   (one file per proxy route)
//! ```
//!
//! Consumers that only need a snapshot depend on the [`SiteSource`] trait so
//! tests can substitute an in-memory list.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::constants::{METADATA_FILE, YAML_EXT};
use crate::error::{io_err, RegistryError};
use crate::fsutil;
use crate::types::{ProxyMetadata, ProxyRecord, Site, SiteMetadata, SiteName};

/// Read-only snapshot provider for registered sites.
pub trait SiteSource: Send + Sync {
    /// All registered sites, sorted by name.
    fn list_sites(&self) -> Result<Vec<Site>, RegistryError>;
}

/// Filesystem-backed site registry rooted at a `sites` directory.
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    sites_dir: PathBuf,
}

impl SiteRegistry {
    pub fn new(sites_dir: impl Into<PathBuf>) -> Self {
        Self {
            sites_dir: sites_dir.into(),
        }
    }

    pub fn sites_dir(&self) -> &Path {
        &self.sites_dir
    }

    /// `<sites_dir>/<name>/metadata.yml`. Pure, no I/O.
    pub fn metadata_path(&self, name: &SiteName) -> PathBuf {
        self.sites_dir.join(&name.0).join(METADATA_FILE)
    }

    pub fn exists(&self, name: &SiteName) -> bool {
        self.metadata_path(name).is_file()
    }

    /// Load one site. Returns `SiteNotFound` if absent, `Parse` if malformed.
    pub fn get(&self, name: &SiteName) -> Result<Site, RegistryError> {
        let path = self.metadata_path(name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RegistryError::SiteNotFound(name.0.clone()))
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let meta: SiteMetadata = serde_yaml::from_str(&contents)
            .map_err(|source| RegistryError::Parse { path, source })?;
        Ok(Site::from_metadata(name.clone(), meta))
    }

    /// Walk `<sites_dir>/*/metadata.yml`. Directories without metadata and
    /// unparseable records are skipped with a warning so one broken site
    /// never hides the others.
    pub fn list(&self) -> Result<Vec<Site>, RegistryError> {
        let entries = match std::fs::read_dir(&self.sites_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.sites_dir, err)),
        };

        let mut names: Vec<SiteName> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| SiteName::parse(&e.file_name().to_string_lossy()).ok())
            .collect();
        names.sort();

        let mut sites = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name) {
                Ok(site) => sites.push(site),
                Err(RegistryError::SiteNotFound(_)) => {}
                Err(err) => tracing::warn!(site = %name, error = %err, "skipping unreadable site"),
            }
        }
        Ok(sites)
    }

    /// Atomically write `metadata.yml`, creating the site directory.
    pub fn write(&self, name: &SiteName, meta: &SiteMetadata) -> Result<(), RegistryError> {
        let path = self.metadata_path(name);
        let yaml = serde_yaml::to_string(meta)?;
        fsutil::atomic_write(&path, yaml).map_err(|e| io_err(&path, e))
    }

    /// Remove the whole site directory. Missing sites are a no-op.
    pub fn remove(&self, name: &SiteName) -> Result<bool, RegistryError> {
        let dir = self.sites_dir.join(&name.0);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&dir, err)),
        }
    }
}

impl SiteSource for SiteRegistry {
    fn list_sites(&self) -> Result<Vec<Site>, RegistryError> {
        self.list()
    }
}

impl SiteSource for Vec<Site> {
    fn list_sites(&self) -> Result<Vec<Site>, RegistryError> {
        Ok(self.clone())
    }
}

/// Filesystem-backed proxy route registry rooted at a `proxies` directory.
#[derive(Debug, Clone)]
pub struct ProxyRegistry {
    proxies_dir: PathBuf,
}

impl ProxyRegistry {
    pub fn new(proxies_dir: impl Into<PathBuf>) -> Self {
        Self {
            proxies_dir: proxies_dir.into(),
        }
    }

    pub fn record_path(&self, name: &SiteName) -> PathBuf {
        self.proxies_dir.join(format!("{}{YAML_EXT}", name.0))
    }

    pub fn exists(&self, name: &SiteName) -> bool {
        self.record_path(name).is_file()
    }

    pub fn get(&self, name: &SiteName) -> Result<ProxyRecord, RegistryError> {
        let path = self.record_path(name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RegistryError::ProxyNotFound(name.0.clone()))
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let meta: ProxyMetadata = serde_yaml::from_str(&contents)
            .map_err(|source| RegistryError::Parse { path, source })?;
        Ok(ProxyRecord::from_metadata(name.clone(), meta))
    }

    /// Every readable record, sorted by name. Broken files are skipped with a
    /// warning.
    pub fn list(&self) -> Result<Vec<ProxyRecord>, RegistryError> {
        let entries = match std::fs::read_dir(&self.proxies_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.proxies_dir, err)),
        };

        let mut names: Vec<SiteName> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let file = e.file_name().to_string_lossy().into_owned();
                let stem = file.strip_suffix(YAML_EXT)?.to_owned();
                SiteName::parse(&stem).ok()
            })
            .collect();
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(proxy = %name, error = %err, "skipping unreadable proxy"),
            }
        }
        Ok(records)
    }

    pub fn write(&self, record: &ProxyRecord) -> Result<(), RegistryError> {
        let path = self.record_path(&record.name);
        let yaml = serde_yaml::to_string(&record.metadata())?;
        fsutil::atomic_write(&path, yaml).map_err(|e| io_err(&path, e))
    }

    /// Missing records are a no-op.
    pub fn remove(&self, name: &SiteName) -> Result<bool, RegistryError> {
        let path = self.record_path(name);
        fsutil::remove_if_exists(&path).map_err(|e| io_err(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProxyTarget, SiteKind};
    use tempfile::TempDir;

    fn meta(domain: &str, container: &str) -> SiteMetadata {
        SiteMetadata {
            kind: SiteKind::Compose,
            domain: domain.into(),
            project_path: PathBuf::from("/code/app"),
            service_name: container.into(),
            compose_service_name: "web".into(),
            profile: String::new(),
            port: 8080,
            is_local: true,
            network_name: "net_traefik".into(),
        }
    }

    #[test]
    fn write_and_get_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let registry = SiteRegistry::new(dir.path());
        let name = SiteName::parse("myapp").unwrap();
        registry.write(&name, &meta("myapp.test", "myapp-web-1")).expect("write");

        let site = registry.get(&name).expect("get");
        assert_eq!(site.domain, "myapp.test");
        assert_eq!(site.container_name, "myapp-web-1");
        assert_eq!(site.compose_service, "web");
        assert_eq!(site.port, 8080);
    }

    #[test]
    fn get_missing_site_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let registry = SiteRegistry::new(dir.path());
        let err = registry.get(&SiteName::parse("nope").unwrap()).unwrap_err();
        assert!(matches!(err, RegistryError::SiteNotFound(_)));
    }

    #[test]
    fn list_is_sorted_and_skips_broken_entries() {
        let dir = TempDir::new().expect("tempdir");
        let registry = SiteRegistry::new(dir.path());
        for name in ["zeta", "alpha"] {
            let n = SiteName::parse(name).unwrap();
            registry.write(&n, &meta(&format!("{name}.test"), "")).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken").join(METADATA_FILE), "domain: [unclosed").unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let names: Vec<String> = registry
            .list()
            .expect("list")
            .into_iter()
            .map(|s| s.name.0)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let registry = SiteRegistry::new(dir.path().join("absent"));
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let registry = SiteRegistry::new(dir.path());
        let name = SiteName::parse("gone").unwrap();
        registry.write(&name, &meta("gone.test", "")).unwrap();
        assert!(registry.remove(&name).unwrap());
        assert!(!registry.remove(&name).unwrap());
        assert!(!registry.exists(&name));
    }

    fn proxy(name: &str, target: ProxyTarget) -> ProxyRecord {
        ProxyRecord {
            name: SiteName::parse(name).unwrap(),
            domain: format!("{name}.test"),
            target,
        }
    }

    #[test]
    fn proxy_records_write_list_and_remove() {
        let dir = TempDir::new().expect("tempdir");
        let registry = ProxyRegistry::new(dir.path().join("proxies"));
        registry
            .write(&proxy("web", ProxyTarget::Localhost { port: 3000 }))
            .unwrap();
        registry
            .write(&proxy(
                "db",
                ProxyTarget::Container {
                    container: "postgres".into(),
                    port: 5432,
                },
            ))
            .unwrap();
        std::fs::write(dir.path().join("proxies/notes.txt"), "ignored").unwrap();

        let records = registry.list().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["db", "web"]);
        assert_eq!(records[0].target.container(), Some("postgres"));

        let web = SiteName::parse("web").unwrap();
        assert!(registry.remove(&web).unwrap());
        assert!(!registry.remove(&web).unwrap());
        assert!(matches!(
            registry.get(&web).unwrap_err(),
            RegistryError::ProxyNotFound(_)
        ));
    }
}
