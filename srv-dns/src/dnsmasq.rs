//! dnsmasq configuration synthesis.
//!
//! [`generate_config`] is a pure function of the domain set: the same set in
//! any order yields byte-identical output. An empty set still yields a valid,
//! comment-only domain section followed by the upstream servers.

use std::collections::BTreeSet;
use std::path::Path;

use srv_core::constants::{LOCALHOST_IP, UPSTREAM_DNS};
use srv_core::fsutil;

use crate::error::{io_err, DnsError};

pub const NO_DOMAINS_COMMENT: &str = "# No local domains registered";

pub fn generate_config<I, S>(domains: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let domains: BTreeSet<String> = domains
        .into_iter()
        .map(|d| d.as_ref().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    let mut out = String::new();
    out.push_str("# Local domains managed by srv\n");
    out.push_str("# Do not edit manually - changes will be overwritten\n\n");

    if domains.is_empty() {
        out.push_str(NO_DOMAINS_COMMENT);
        out.push('\n');
    } else {
        for domain in &domains {
            out.push_str(&format!("address=/{domain}/{LOCALHOST_IP}\n"));
        }
    }

    out.push_str("\n# Forward all other queries to upstream DNS\n");
    for server in UPSTREAM_DNS {
        out.push_str(&format!("server={server}\n"));
    }
    out.push_str("\n# Don't read /etc/resolv.conf\n");
    out.push_str("no-resolv\n");
    out
}

/// Render and atomically write the config for `domains` to `path`.
pub fn write_config<I, S>(path: &Path, domains: I) -> Result<(), DnsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fsutil::atomic_write(path, generate_config(domains)).map_err(|e| io_err(path, e))
}
