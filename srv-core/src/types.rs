//! Site and proxy records.
//!
//! [`SiteMetadata`] is the on-disk `metadata.yml` shape; [`Site`] is the
//! read-only snapshot the rest of the workspace consumes. [`ProxyRecord`]
//! routes a domain to something that is not a site: a host port or an
//! arbitrary container.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DOCKER_HOST_INTERNAL, LOCAL_TLDS, MAX_SITE_NAME_LEN};
use crate::error::RegistryError;

/// A validated site name (`[a-z0-9_-]{1,63}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteName(pub String);

impl SiteName {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SITE_NAME_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(RegistryError::InvalidName(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a site is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    /// A docker compose project owned by the user.
    #[default]
    Compose,
    /// Static files served by a generated nginx container.
    Static,
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteKind::Compose => write!(f, "compose"),
            SiteKind::Static => write!(f, "static"),
        }
    }
}

/// Contents of `<sites_dir>/<name>/metadata.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMetadata {
    #[serde(rename = "type", default)]
    pub kind: SiteKind,
    pub domain: String,
    pub project_path: PathBuf,
    /// Container name used for proxy routing and network attachment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    /// Compose service name used for compose commands.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compose_service_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub network_name: String,
}

/// Point-in-time snapshot of one registered site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: SiteName,
    pub kind: SiteKind,
    pub domain: String,
    /// Expected container name; empty when the site has none.
    pub container_name: String,
    pub compose_service: String,
    pub profile: String,
    pub project_path: PathBuf,
    pub port: u16,
    pub is_local: bool,
}

impl Site {
    pub fn from_metadata(name: SiteName, meta: SiteMetadata) -> Self {
        // Older records only carry `service_name`.
        let compose_service = if meta.compose_service_name.is_empty() {
            meta.service_name.clone()
        } else {
            meta.compose_service_name
        };
        Self {
            name,
            kind: meta.kind,
            domain: meta.domain.to_ascii_lowercase(),
            container_name: meta.service_name,
            compose_service,
            profile: meta.profile,
            project_path: meta.project_path,
            port: meta.port,
            is_local: meta.is_local,
        }
    }

    pub fn is_compose(&self) -> bool {
        self.kind == SiteKind::Compose
    }
}

/// Where a proxy route forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxyTarget {
    /// A port published on the host.
    Localhost { port: u16 },
    /// A container attached to the shared network.
    Container { container: String, port: u16 },
}

impl ProxyTarget {
    /// Parse `<container>:<port>`.
    pub fn parse_container(raw: &str) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidTarget(raw.to_owned());
        let (container, port) = raw.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if container.is_empty() || port == 0 {
            return Err(invalid());
        }
        Ok(Self::Container {
            container: container.to_owned(),
            port,
        })
    }

    /// Backend URL as seen from the proxy container.
    pub fn url(&self) -> String {
        match self {
            ProxyTarget::Localhost { port } => format!("http://{DOCKER_HOST_INTERNAL}:{port}"),
            ProxyTarget::Container { container, port } => format!("http://{container}:{port}"),
        }
    }

    pub fn container(&self) -> Option<&str> {
        match self {
            ProxyTarget::Container { container, .. } => Some(container),
            ProxyTarget::Localhost { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProxyTarget::Localhost { .. } => "localhost",
            ProxyTarget::Container { .. } => "container",
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyTarget::Localhost { port } => write!(f, "localhost:{port}"),
            ProxyTarget::Container { container, port } => write!(f, "{container}:{port}"),
        }
    }
}

/// Contents of `<root>/proxies/<name>.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMetadata {
    pub domain: String,
    pub target: ProxyTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub name: SiteName,
    pub domain: String,
    pub target: ProxyTarget,
}

impl ProxyRecord {
    pub fn from_metadata(name: SiteName, meta: ProxyMetadata) -> Self {
        Self {
            name,
            domain: meta.domain.to_ascii_lowercase(),
            target: meta.target,
        }
    }

    pub fn metadata(&self) -> ProxyMetadata {
        ProxyMetadata {
            domain: self.domain.clone(),
            target: self.target.clone(),
        }
    }
}

/// True when `domain` ends in one of the non-routable development TLDs.
pub fn is_local_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    LOCAL_TLDS
        .iter()
        .any(|tld| domain == *tld || domain.ends_with(&format!(".{tld}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("blog", true)]
    #[case("my-app_2", true)]
    #[case("", false)]
    #[case("Upper", false)]
    #[case("has space", false)]
    #[case("dots.not.allowed", false)]
    fn site_name_validation(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(SiteName::parse(raw).is_ok(), ok, "{raw:?}");
    }

    #[test]
    fn site_name_length_limit() {
        assert!(SiteName::parse(&"a".repeat(63)).is_ok());
        assert!(SiteName::parse(&"a".repeat(64)).is_err());
    }

    #[rstest]
    #[case("api.test", true)]
    #[case("shop.local", true)]
    #[case("app.localhost", true)]
    #[case("API.TEST.", true)]
    #[case("example.com", false)]
    #[case("testing.com", false)]
    fn local_domain_detection(#[case] domain: &str, #[case] local: bool) {
        assert_eq!(is_local_domain(domain), local, "{domain}");
    }

    #[test]
    fn compose_service_falls_back_to_service_name() {
        let meta: SiteMetadata = serde_yaml::from_str(
            "type: compose\ndomain: Api.Test\nproject_path: /code/api\nservice_name: api-web-1\n",
        )
        .expect("parse");
        let site = Site::from_metadata(SiteName::parse("api").unwrap(), meta);
        assert_eq!(site.compose_service, "api-web-1");
        assert_eq!(site.container_name, "api-web-1");
        assert_eq!(site.domain, "api.test");
        assert!(site.is_compose());
    }

    #[rstest]
    #[case("myapp:3000", Some(("myapp", 3000)))]
    #[case("postgres:5432", Some(("postgres", 5432)))]
    #[case("myapp", None)]
    #[case(":3000", None)]
    #[case("myapp:0", None)]
    #[case("myapp:http", None)]
    #[case("myapp:70000", None)]
    fn container_targets(#[case] raw: &str, #[case] expected: Option<(&str, u16)>) {
        let parsed = ProxyTarget::parse_container(raw).ok();
        let expected = expected.map(|(container, port)| ProxyTarget::Container {
            container: container.into(),
            port,
        });
        assert_eq!(parsed, expected, "{raw}");
    }

    #[test]
    fn target_urls_as_seen_from_the_proxy() {
        assert_eq!(
            ProxyTarget::Localhost { port: 3000 }.url(),
            "http://host.docker.internal:3000"
        );
        let container = ProxyTarget::parse_container("myapp:8080").unwrap();
        assert_eq!(container.url(), "http://myapp:8080");
        assert_eq!(container.container(), Some("myapp"));
    }

    #[test]
    fn proxy_metadata_is_tagged_by_target_type() {
        let meta: ProxyMetadata = serde_yaml::from_str(
            "domain: Api.Test\ntarget:\n  type: container\n  container: api\n  port: 3000\n",
        )
        .expect("parse");
        let record = ProxyRecord::from_metadata(SiteName::parse("api-test").unwrap(), meta);
        assert_eq!(record.domain, "api.test");
        assert_eq!(record.target.to_string(), "api:3000");
        assert_eq!(record.target.kind(), "container");
    }
}
