//! Container-name to site-name index derived from the site registry.
//!
//! Rebuilt wholesale and swapped in atomically; never patched in place.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use srv_core::{Site, SiteSource};

use crate::error::DaemonError;

pub type ContainerMap = HashMap<String, String>;

pub struct MappingCache {
    source: Arc<dyn SiteSource>,
    map: RwLock<Arc<ContainerMap>>,
}

impl MappingCache {
    pub fn new(source: Arc<dyn SiteSource>) -> Self {
        Self {
            source,
            map: RwLock::new(Arc::new(ContainerMap::new())),
        }
    }

    /// Reload the registry and replace the index. Returns the entry count.
    pub async fn rebuild(&self) -> Result<usize, DaemonError> {
        let source = self.source.clone();
        let sites = tokio::task::spawn_blocking(move || source.list_sites())
            .await
            .map_err(|err| DaemonError::Join {
                task: "mapping_rebuild",
                reason: err.to_string(),
            })??;

        let map = build_mapping(sites);
        let count = map.len();
        *self.map.write().await = Arc::new(map);
        tracing::info!(mappings = count, "container mapping rebuilt");
        Ok(count)
    }

    pub async fn lookup(&self, container: &str) -> Option<String> {
        self.map.read().await.get(container).cloned()
    }

    /// Look up `container`, rebuilding once on a miss.
    pub async fn resolve(&self, container: &str) -> Option<String> {
        if let Some(site) = self.lookup(container).await {
            return Some(site);
        }
        if let Err(err) = self.rebuild().await {
            tracing::warn!(error = %err, "container mapping rebuild failed");
            return None;
        }
        self.lookup(container).await
    }

    pub async fn snapshot(&self) -> Arc<ContainerMap> {
        self.map.read().await.clone()
    }
}

/// Compose sites with a known container name. When two sites claim the same
/// container the first by site name wins.
pub fn build_mapping(mut sites: Vec<Site>) -> ContainerMap {
    sites.sort_by(|a, b| a.name.cmp(&b.name));
    let mut map = ContainerMap::new();
    for site in sites {
        if !site.is_compose() || site.container_name.is_empty() {
            continue;
        }
        if let Some(owner) = map.get(&site.container_name) {
            tracing::warn!(
                container = %site.container_name,
                kept = %owner,
                ignored = %site.name,
                "container claimed by more than one site",
            );
            continue;
        }
        map.insert(site.container_name, site.name.0);
    }
    map
}
