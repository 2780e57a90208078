use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use srv_dns::dnsmasq::NO_DOMAINS_COMMENT;
use srv_dns::{
    DnsError, DnsManager, DnsServer, DomainChange, DomainRegistry, Resolver, ResolverChange,
    ResolverKind,
};

#[derive(Default)]
struct CountingResolver {
    engaged: AtomicUsize,
    disengaged: AtomicUsize,
    fail_engage: bool,
}

#[async_trait]
impl Resolver for CountingResolver {
    fn detect(&self) -> ResolverKind {
        ResolverKind::SystemdResolved
    }

    async fn apply(&self, _kind: ResolverKind) -> Result<ResolverChange, DnsError> {
        self.engaged.fetch_add(1, Ordering::SeqCst);
        if self.fail_engage {
            return Err(DnsError::UnsupportedResolver);
        }
        Ok(ResolverChange::Applied)
    }

    async fn remove(&self, _kind: ResolverKind) -> Result<ResolverChange, DnsError> {
        self.disengaged.fetch_add(1, Ordering::SeqCst);
        Ok(ResolverChange::Removed)
    }
}

#[derive(Default)]
struct CountingServer {
    reloads: AtomicUsize,
}

#[async_trait]
impl DnsServer for CountingServer {
    async fn reload(&self) -> Result<bool, DnsError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct Fixture {
    _dir: TempDir,
    domains_path: std::path::PathBuf,
    dnsmasq_path: std::path::PathBuf,
    resolver: Arc<CountingResolver>,
    server: Arc<CountingServer>,
    manager: DnsManager,
}

fn fixture(resolver: CountingResolver) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let domains_path = dir.path().join("local-domains.txt");
    let dnsmasq_path = dir.path().join("dnsmasq.conf");
    let resolver = Arc::new(resolver);
    let server = Arc::new(CountingServer::default());
    let manager = DnsManager::new(
        DomainRegistry::new(&domains_path),
        &dnsmasq_path,
        resolver.clone(),
        server.clone(),
    );
    Fixture {
        _dir: dir,
        domains_path,
        dnsmasq_path,
        resolver,
        server,
        manager,
    }
}

#[tokio::test]
async fn register_twice_engages_once() {
    let f = fixture(CountingResolver::default());

    assert_eq!(f.manager.register("api.test").await.unwrap(), DomainChange::Added);
    assert_eq!(f.manager.register("API.test").await.unwrap(), DomainChange::Unchanged);

    let contents = std::fs::read_to_string(&f.domains_path).unwrap();
    assert_eq!(contents.matches("api.test").count(), 1);
    assert_eq!(f.resolver.engaged.load(Ordering::SeqCst), 1);
    assert_eq!(f.server.reloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_domain_does_not_reengage() {
    let f = fixture(CountingResolver::default());
    f.manager.register("api.test").await.unwrap();
    f.manager.register("shop.local").await.unwrap();

    assert_eq!(f.resolver.engaged.load(Ordering::SeqCst), 1);
    let config = std::fs::read_to_string(&f.dnsmasq_path).unwrap();
    assert!(config.contains("address=/api.test/127.0.0.1"));
    assert!(config.contains("address=/shop.local/127.0.0.1"));
}

#[tokio::test]
async fn unregister_last_domain_disengages_once() {
    let f = fixture(CountingResolver::default());
    std::fs::write(&f.domains_path, "api.test\n").unwrap();

    assert_eq!(f.manager.unregister("api.test").await.unwrap(), DomainChange::Removed);

    assert_eq!(std::fs::read_to_string(&f.domains_path).unwrap().trim(), "");
    let config = std::fs::read_to_string(&f.dnsmasq_path).unwrap();
    assert!(config.contains(NO_DOMAINS_COMMENT));
    assert!(!config.contains("address="));
    assert!(config.contains("server=8.8.8.8"));
    assert_eq!(f.resolver.disengaged.load(Ordering::SeqCst), 1);
    assert_eq!(f.resolver.engaged.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unregister_absent_domain_is_a_noop() {
    let f = fixture(CountingResolver::default());
    std::fs::write(&f.domains_path, "api.test\n").unwrap();

    assert_eq!(
        f.manager.unregister("other.test").await.unwrap(),
        DomainChange::Unchanged
    );
    assert_eq!(f.resolver.disengaged.load(Ordering::SeqCst), 0);
    assert_eq!(f.server.reloads.load(Ordering::SeqCst), 0);
    assert!(!f.dnsmasq_path.exists());
}

#[tokio::test]
async fn resolver_failure_keeps_registration() {
    let f = fixture(CountingResolver {
        fail_engage: true,
        ..Default::default()
    });

    let err = f.manager.register("api.test").await.unwrap_err();
    assert!(err.is_partial(), "{err}");
    assert!(f.manager.domains().unwrap().contains("api.test"));

    // Not the first domain any more, so no second engagement attempt.
    assert_eq!(f.manager.register("api.test").await.unwrap(), DomainChange::Unchanged);
    assert_eq!(f.resolver.engaged.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_domain_is_rejected_before_any_write() {
    let f = fixture(CountingResolver::default());
    let err = f.manager.register("not a domain").await.unwrap_err();
    assert!(matches!(err, DnsError::InvalidDomain(_)));
    assert!(!f.domains_path.exists());
}
