//! Tera rendering of the proxy stack files.
//!
//! Templates are embedded at compile time. Substitutions are plain strings,
//! so autoescaping is disabled.

use std::path::Path;

use rand::Rng;
use tera::{Context, Tera};

use srv_core::constants::{
    DNS_CONTAINER, DNS_IMAGE, DNS_PASS_LEN, DNS_USER_LEN, PROXY_CONTAINER, PROXY_IMAGE,
};

use crate::error::ProxyError;

const STATIC_TPL: &str = "traefik.yml.tera";
const DYNAMIC_TPL: &str = "traefik-dynamic.yml.tera";
const COMPOSE_TPL: &str = "docker-compose.yml.tera";

const TPLS: &[(&str, &str)] = &[
    (STATIC_TPL, include_str!("templates/traefik.yml.tera")),
    (DYNAMIC_TPL, include_str!("templates/traefik-dynamic.yml.tera")),
    (COMPOSE_TPL, include_str!("templates/docker-compose.yml.tera")),
];

/// Admin credentials for the dnsmasq web interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsCredentials {
    pub user: String,
    pub pass: String,
}

impl DnsCredentials {
    pub fn generate() -> Self {
        Self {
            user: random_hex(DNS_USER_LEN),
            pass: random_hex(DNS_PASS_LEN),
        }
    }
}

/// `len` lowercase hex characters from the thread RNG.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; len / 2 + 1];
    rng.fill(&mut bytes[..]);
    let mut out = hex::encode(bytes);
    out.truncate(len);
    out
}

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, ProxyError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TPLS.iter().copied())?;
        tera.autoescape_on(vec![]);
        Ok(Self { tera })
    }

    /// Static proxy config for `network`, with `email` as the ACME contact.
    pub fn static_config(&self, network: &str, email: &str) -> Result<String, ProxyError> {
        let mut ctx = Context::new();
        ctx.insert("network", network);
        ctx.insert("email", email);
        Ok(self.tera.render(STATIC_TPL, &ctx)?)
    }

    pub fn dynamic_config(&self) -> Result<String, ProxyError> {
        Ok(self.tera.render(DYNAMIC_TPL, &Context::new())?)
    }

    pub fn compose(
        &self,
        network: &str,
        sites_dir: &Path,
        credentials: &DnsCredentials,
    ) -> Result<String, ProxyError> {
        let mut ctx = Context::new();
        ctx.insert("network", network);
        ctx.insert("sites_dir", &sites_dir.display().to_string());
        ctx.insert("proxy_image", PROXY_IMAGE);
        ctx.insert("proxy_container", PROXY_CONTAINER);
        ctx.insert("dns_image", DNS_IMAGE);
        ctx.insert("dns_container", DNS_CONTAINER);
        ctx.insert("dns_user", &credentials.user);
        ctx.insert("dns_pass", &credentials.pass);
        Ok(self.tera.render(COMPOSE_TPL, &ctx)?)
    }
}
