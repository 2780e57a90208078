//! Persisted set of domains that resolve to loopback.
//!
//! On disk: one lower-case domain per line, sorted and de-duplicated. Blank
//! lines and `#` comments are ignored on read. Every mutation rewrites the
//! whole file atomically so a reloading dnsmasq never sees a truncated list.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use srv_core::fsutil;

use crate::error::{io_err, DnsError};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct DomainRegistry {
    path: PathBuf,
}

impl DomainRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current set. A missing file is an empty set.
    pub fn load(&self) -> Result<BTreeSet<String>, DnsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(parse_domains(&text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(err) => Err(io_err(&self.path, err)),
        }
    }

    /// Replace the stored set with `domains` (lower-cased, sorted, de-duplicated).
    pub fn save<I, S>(&self, domains: I) -> Result<(), DnsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        fsutil::atomic_write(&self.path, render_domains(&set)).map_err(|e| io_err(&self.path, e))
    }
}

pub fn parse_domains(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_ascii_lowercase)
        .collect()
}

fn render_domains(domains: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for domain in domains {
        out.push_str(domain);
        out.push('\n');
    }
    out
}

/// Lower-case, strip a trailing dot and validate RFC 1035 length/charset rules.
pub fn normalize_domain(raw: &str) -> Result<String, DnsError> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let valid = !domain.is_empty()
        && domain.len() <= MAX_DOMAIN_LEN
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(domain)
    } else {
        Err(DnsError::InvalidDomain(raw.to_string()))
    }
}
