//! Resolution lookups behind `srv dns status` and the checks behind
//! `srv doctor`.

use std::collections::BTreeSet;
use std::fmt;

use srv_core::constants::{
    DNS_CONTAINER, DNS_TEST_DOMAIN, INFO_TIMEOUT, LOCALHOST_IP, PROXY_CONTAINER, RUNTIME_BINARY,
    STATUS_TIMEOUT,
};
use srv_core::{Invocation, ProcessRunner};

use crate::resolver::{Resolver, ResolverKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Answered with loopback.
    Resolves,
    WrongAnswer(String),
    NoAnswer,
    Unavailable(String),
}

impl Lookup {
    pub fn is_ok(&self) -> bool {
        matches!(self, Lookup::Resolves)
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Resolves => write!(f, "ok ({LOCALHOST_IP})"),
            Lookup::WrongAnswer(answer) => write!(f, "wrong answer ({answer})"),
            Lookup::NoAnswer => f.write_str("no answer"),
            Lookup::Unavailable(reason) => write!(f, "unavailable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsStatus {
    pub resolver: ResolverKind,
    pub local_server: Lookup,
    pub system_resolver: Lookup,
}

/// `dig +short <domain>`, optionally against a specific server.
pub async fn lookup(runner: &dyn ProcessRunner, server: Option<&str>, domain: &str) -> Lookup {
    if !runner.exists("dig") {
        return Lookup::Unavailable("dig is not installed".into());
    }
    let mut args = vec!["+short".to_string(), "+time=2".to_string()];
    if let Some(server) = server {
        args.push(format!("@{server}"));
    }
    args.push(domain.to_string());

    let inv = Invocation::new("dig", args).timeout(STATUS_TIMEOUT);
    match runner.run_quiet(&inv).await {
        Ok(out) if out.success() => classify(&out.stdout),
        Ok(out) => Lookup::Unavailable(out.combined()),
        Err(err) => Lookup::Unavailable(err.to_string()),
    }
}

fn classify(stdout: &str) -> Lookup {
    let answers: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
        .collect();
    if answers.is_empty() {
        Lookup::NoAnswer
    } else if answers.contains(&LOCALHOST_IP) {
        Lookup::Resolves
    } else {
        Lookup::WrongAnswer(answers.join(", "))
    }
}

pub async fn status(runner: &dyn ProcessRunner, resolver: &dyn Resolver) -> DnsStatus {
    DnsStatus {
        resolver: resolver.detect(),
        local_server: lookup(runner, Some(LOCALHOST_IP), DNS_TEST_DOMAIN).await,
        system_resolver: lookup(runner, None, DNS_TEST_DOMAIN).await,
    }
}

/// True when `docker inspect` reports `container` running.
pub async fn container_running(runner: &dyn ProcessRunner, container: &str) -> bool {
    let inv = Invocation::new(
        RUNTIME_BINARY,
        ["inspect", "-f", "{{.State.Running}}", container],
    )
    .timeout(STATUS_TIMEOUT);
    match runner.run_quiet(&inv).await {
        Ok(out) => out.success() && out.stdout.trim() == "true",
        Err(err) => {
            tracing::debug!(container = %container, error = %err, "container inspect failed");
            false
        }
    }
}

/// One result line of `srv doctor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Runtime, network, proxy and DNS health. Container checks are skipped when
/// the runtime itself is unreachable.
pub async fn doctor(
    runner: &dyn ProcessRunner,
    resolver: ResolverKind,
    network: &str,
    domains: &BTreeSet<String>,
) -> Vec<Check> {
    let mut checks = Vec::new();

    if !runner.exists(RUNTIME_BINARY) {
        checks.push(Check::fail("docker", format!("{RUNTIME_BINARY} is not installed")));
        return checks;
    }
    let info = Invocation::new(RUNTIME_BINARY, ["info"]).timeout(INFO_TIMEOUT);
    match runner.run_quiet(&info).await {
        Ok(out) if out.success() => checks.push(Check::pass("docker", "running")),
        _ => {
            checks.push(Check::fail("docker", "daemon is not reachable"));
            return checks;
        }
    }

    let inspect = Invocation::new(RUNTIME_BINARY, ["network", "inspect", network]).timeout(STATUS_TIMEOUT);
    checks.push(match runner.run_quiet(&inspect).await {
        Ok(out) if out.success() => Check::pass("network", network),
        _ => Check::fail("network", format!("{network} is missing; run `srv init`")),
    });

    for (name, container) in [("proxy", PROXY_CONTAINER), ("dns server", DNS_CONTAINER)] {
        checks.push(if container_running(runner, container).await {
            Check::pass(name, format!("{container} running"))
        } else {
            Check::fail(name, format!("{container} is not running"))
        });
    }

    checks.push(match resolver {
        ResolverKind::Unsupported => Check::fail("resolver", "no supported system resolver found"),
        kind => Check::pass("resolver", kind.to_string()),
    });

    if domains.is_empty() {
        checks.push(Check::pass("local dns", "no local domains registered"));
        return checks;
    }
    let local = lookup(runner, Some(LOCALHOST_IP), DNS_TEST_DOMAIN).await;
    let system = lookup(runner, None, DNS_TEST_DOMAIN).await;
    checks.push(if local.is_ok() && system.is_ok() {
        Check::pass("local dns", format!("{} domain(s) resolve", domains.len()))
    } else {
        Check::fail("local dns", format!("server: {local}; system: {system}"))
    });
    checks
}
