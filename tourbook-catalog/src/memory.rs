use crate::package::{CatalogError, Package, PackageCatalog};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory catalog for tests and local runs without Postgres
#[derive(Default)]
pub struct InMemoryCatalog {
    packages: RwLock<HashMap<Uuid, Package>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        Self {
            packages: RwLock::new(packages.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn insert(&self, package: Package) {
        self.packages.write().await.insert(package.id, package);
    }
}

#[async_trait]
impl PackageCatalog for InMemoryCatalog {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>, CatalogError> {
        Ok(self.packages.read().await.get(&id).cloned())
    }
}
