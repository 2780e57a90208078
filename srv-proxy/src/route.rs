//! File-provider routes for proxy records.
//!
//! Each record becomes `conf/proxy-<name>.yml`, which the proxy's file
//! provider picks up without a restart. Documents are built from typed
//! structs so a domain or container name can never inject YAML.

use std::collections::BTreeMap;

use serde::Serialize;

use srv_core::constants::{PROXY_ENTRY_POINT, PROXY_ROUTE_PREFIX};
use srv_core::types::is_local_domain;
use srv_core::{fsutil, Config, ProxyRecord, SiteName};

use crate::error::{io_err, ProxyError};

const CERT_RESOLVER: &str = "letsencrypt";

#[derive(Serialize)]
struct RouteFile {
    http: Http,
}

#[derive(Serialize)]
struct Http {
    routers: BTreeMap<String, Router>,
    services: BTreeMap<String, Service>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Router {
    rule: String,
    entry_points: Vec<&'static str>,
    service: String,
    tls: Tls,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tls {
    #[serde(skip_serializing_if = "Option::is_none")]
    cert_resolver: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Service {
    load_balancer: LoadBalancer,
}

#[derive(Serialize)]
struct LoadBalancer {
    servers: Vec<Server>,
}

#[derive(Serialize)]
struct Server {
    url: String,
}

/// Route document for `record`. Public domains get an ACME certificate;
/// local ones use the proxy's default certificate store.
pub fn render_route(record: &ProxyRecord) -> Result<String, ProxyError> {
    let key = format!("{PROXY_ROUTE_PREFIX}{}", record.name);
    let cert_resolver = (!is_local_domain(&record.domain)).then_some(CERT_RESOLVER);

    let doc = RouteFile {
        http: Http {
            routers: BTreeMap::from([(
                key.clone(),
                Router {
                    rule: format!("Host(`{}`)", record.domain),
                    entry_points: vec![PROXY_ENTRY_POINT],
                    service: key.clone(),
                    tls: Tls { cert_resolver },
                },
            )]),
            services: BTreeMap::from([(
                key,
                Service {
                    load_balancer: LoadBalancer {
                        servers: vec![Server {
                            url: record.target.url(),
                        }],
                    },
                },
            )]),
        },
    };

    let mut header = format!(
        "# Proxy route for {}, generated by srv\n# Domain: {}\n",
        record.name, record.domain
    );
    if let Some(container) = record.target.container() {
        header.push_str(&format!("# Container: {container}\n"));
    }
    Ok(header + &serde_yaml::to_string(&doc)?)
}

pub fn write_route(config: &Config, record: &ProxyRecord) -> Result<(), ProxyError> {
    let path = config.proxy_route_path(record.name.as_str());
    fsutil::atomic_write(&path, render_route(record)?).map_err(|e| io_err(&path, e))?;
    tracing::info!(proxy = %record.name, path = %path.display(), "wrote proxy route");
    Ok(())
}

/// Returns whether a route file was removed.
pub fn remove_route(config: &Config, name: &SiteName) -> Result<bool, ProxyError> {
    let path = config.proxy_route_path(name.as_str());
    fsutil::remove_if_exists(&path).map_err(|e| io_err(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use srv_core::ProxyTarget;
    use tempfile::TempDir;

    fn record(name: &str, domain: &str, target: ProxyTarget) -> ProxyRecord {
        ProxyRecord {
            name: SiteName::parse(name).unwrap(),
            domain: domain.into(),
            target,
        }
    }

    #[test]
    fn localhost_route_points_at_the_host_gateway() {
        let yaml = render_route(&record(
            "api-test",
            "api.test",
            ProxyTarget::Localhost { port: 3000 },
        ))
        .unwrap();
        assert!(yaml.starts_with("# Proxy route for api-test, generated by srv\n# Domain: api.test\n"));

        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let router = &doc["http"]["routers"]["proxy-api-test"];
        assert_eq!(router["rule"].as_str(), Some("Host(`api.test`)"));
        assert_eq!(router["entryPoints"][0].as_str(), Some("websecure"));
        assert_eq!(router["service"].as_str(), Some("proxy-api-test"));
        assert!(router["tls"].get("certResolver").is_none());
        assert_eq!(
            doc["http"]["services"]["proxy-api-test"]["loadBalancer"]["servers"][0]["url"].as_str(),
            Some("http://host.docker.internal:3000")
        );
    }

    #[test]
    fn public_container_route_requests_acme() {
        let yaml = render_route(&record(
            "db",
            "db.example.com",
            ProxyTarget::Container {
                container: "postgres".into(),
                port: 5432,
            },
        ))
        .unwrap();
        assert!(yaml.contains("# Container: postgres\n"));
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            doc["http"]["routers"]["proxy-db"]["tls"]["certResolver"].as_str(),
            Some("letsencrypt")
        );
        assert_eq!(
            doc["http"]["services"]["proxy-db"]["loadBalancer"]["servers"][0]["url"].as_str(),
            Some("http://postgres:5432")
        );
    }

    #[test]
    fn routes_live_in_the_watched_conf_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config::at(dir.path(), "abc_traefik");
        let rec = record("web", "web.test", ProxyTarget::Localhost { port: 8080 });

        write_route(&config, &rec).unwrap();
        let path = dir.path().join("traefik/conf/proxy-web.yml");
        assert!(path.is_file());

        assert!(remove_route(&config, &rec.name).unwrap());
        assert!(!path.exists());
        assert!(!remove_route(&config, &rec.name).unwrap());
    }
}
