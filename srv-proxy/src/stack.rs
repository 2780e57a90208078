//! Writes the proxy stack files under the proxy directory.

use std::io::ErrorKind;
use std::path::Path;

use similar::TextDiff;

use srv_core::constants::ACME_FILE_MODE;
use srv_core::{fsutil, Config};
use srv_dns::{dnsmasq, DomainRegistry};

use crate::error::{io_err, ProxyError};
use crate::merge::{merge_documents, MergeKind};
use crate::template::{DnsCredentials, Templates};

/// What [`ensure_config`] did to the static config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureReport {
    pub static_config: MergeKind,
    pub acme_created: bool,
}

/// Create the proxy directory layout and write every stack file.
///
/// The static config is merged with any existing copy. The dnsmasq config is
/// rendered from the current domain registry. `acme.json` is only created
/// when absent.
pub fn ensure_config(config: &Config, email: &str) -> Result<EnsureReport, ProxyError> {
    for dir in [
        config.proxy_dir.clone(),
        config.proxy_conf_dir(),
        config.proxy_certs_dir(),
        config.proxy_logs_dir(),
        config.sites_dir.clone(),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let templates = Templates::new()?;

    let static_path = config.static_config_path();
    let rendered = templates.static_config(&config.network_name, email)?;
    let existing = read_optional(&static_path)?;
    let outcome = merge_documents(existing.as_deref(), &rendered)?;
    write(&static_path, &outcome.content)?;
    tracing::info!(path = %static_path.display(), kind = ?outcome.kind, "wrote static proxy config");

    write(&config.dynamic_config_path(), &templates.dynamic_config()?)?;

    let compose = templates.compose(
        &config.network_name,
        &config.sites_dir,
        &DnsCredentials::generate(),
    )?;
    write(&config.proxy_compose_path(), &compose)?;

    let domains = DomainRegistry::new(config.local_domains_path()).load()?;
    dnsmasq::write_config(&config.dnsmasq_conf_path(), &domains)?;

    let acme = config.acme_path();
    let acme_created = !acme.exists();
    if acme_created {
        fsutil::atomic_write_with_mode(&acme, "{}", Some(ACME_FILE_MODE))
            .map_err(|e| io_err(&acme, e))?;
    }

    Ok(EnsureReport {
        static_config: outcome.kind,
        acme_created,
    })
}

/// Unified diff between the on-disk static config and what [`ensure_config`]
/// would write. `None` when they are identical. Nothing is written.
pub fn diff_static_config(config: &Config, email: &str) -> Result<Option<String>, ProxyError> {
    let path = config.static_config_path();
    let rendered = Templates::new()?.static_config(&config.network_name, email)?;
    let existing = read_optional(&path)?;
    let merged = merge_documents(existing.as_deref(), &rendered)?.content;
    let existing = existing.unwrap_or_default();
    if existing == merged || same_document(&existing, &merged) {
        return Ok(None);
    }
    Ok(Some(unified_diff(&path, &existing, &merged)))
}

/// Formatting-only differences do not count.
fn same_document(a: &str, b: &str) -> bool {
    match (
        serde_yaml::from_str::<serde_yaml::Value>(a),
        serde_yaml::from_str::<serde_yaml::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .context_radius(3)
        .to_string()
}

fn read_optional(path: &Path) -> Result<Option<String>, ProxyError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn write(path: &Path, contents: &str) -> Result<(), ProxyError> {
    fsutil::atomic_write(path, contents).map_err(|e| io_err(path, e))
}
