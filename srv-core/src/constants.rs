//! Names, addresses and file layout shared across the workspace.

use std::time::Duration;

pub const APP_NAME: &str = "srv";

pub const LOCALHOST_IP: &str = "127.0.0.1";

/// Upstream resolvers dnsmasq forwards every non-local query to.
pub const UPSTREAM_DNS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

/// Top-level labels that never route publicly and resolve to loopback.
pub const LOCAL_TLDS: [&str; 3] = ["test", "local", "localhost"];

/// Name queried by the DNS diagnostics.
pub const DNS_TEST_DOMAIN: &str = "test.test";

// ---------------------------------------------------------------------------
// Containers and images
// ---------------------------------------------------------------------------

pub const RUNTIME_BINARY: &str = "docker";
/// How containers on the proxy network reach ports on the host.
pub const DOCKER_HOST_INTERNAL: &str = "host.docker.internal";
pub const PROXY_CONTAINER: &str = "srv_proxy";
pub const DNS_CONTAINER: &str = "srv_dns";
pub const DNS_COMPOSE_SERVICE: &str = "dns";
pub const PROXY_IMAGE: &str = "traefik:latest";
pub const DNS_IMAGE: &str = "jpillora/dnsmasq:latest";

pub const NETWORK_SUFFIX: &str = "_traefik";
pub const NETWORK_HASH_LEN: usize = 12;
pub const DEFAULT_HOSTNAME: &str = "default";

/// Substrings in runtime output meaning "already in the desired state".
pub const IDEMPOTENCY_MARKERS: [&str; 2] = ["already exists", "endpoint with name"];

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

pub const INFO_TIMEOUT: Duration = Duration::from_secs(10);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
pub const COMPOSE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Worker cap for multi-site batch operations.
pub const MAX_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// Files and directories
// ---------------------------------------------------------------------------

pub const ENV_SRV_ROOT: &str = "SRV_ROOT";
pub const ENV_XDG_CONFIG_HOME: &str = "XDG_CONFIG_HOME";
pub const DEFAULT_CONFIG_DIR: &str = ".config";

pub const PROXY_SUBDIR: &str = "traefik";
pub const SITES_SUBDIR: &str = "sites";
pub const PROXIES_SUBDIR: &str = "proxies";
pub const CONF_SUBDIR: &str = "conf";
pub const CERTS_SUBDIR: &str = "certs";
pub const LOGS_SUBDIR: &str = "logs";

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const METADATA_FILE: &str = "metadata.yml";
pub const YAML_EXT: &str = ".yml";
/// File-provider routes written for proxy records are `proxy-<name>.yml`.
pub const PROXY_ROUTE_PREFIX: &str = "proxy-";
pub const PROXY_ENTRY_POINT: &str = "websecure";
pub const STATIC_CONFIG_FILE: &str = "traefik.yml";
pub const DYNAMIC_CONFIG_FILE: &str = "traefik-dynamic.yml";
pub const DNSMASQ_CONF_FILE: &str = "dnsmasq.conf";
pub const LOCAL_DOMAINS_FILE: &str = "local-domains.txt";
pub const ACME_FILE: &str = "acme.json";
pub const TMP_SUFFIX: &str = ".tmp";

pub const MAX_SITE_NAME_LEN: usize = 63;
pub const PROXY_ENV_FILE: &str = "env.traefik";
pub const ENV_ACME_EMAIL: &str = "ACME_EMAIL";

/// Length of the generated dnsmasq admin credentials, in hex characters.
pub const DNS_USER_LEN: usize = 16;
pub const DNS_PASS_LEN: usize = 32;
pub const ACME_FILE_MODE: u32 = 0o600;
