use async_trait::async_trait;
use sqlx::PgPool;
use tourbook_catalog::{CatalogError, Package, PackageCatalog};
use uuid::Uuid;

/// Read side of the packages table
pub struct PgPackageCatalog {
    pool: PgPool,
}

impl PgPackageCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    title: String,
    image: String,
    price: i64,
}

#[async_trait]
impl PackageCatalog for PgPackageCatalog {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>, CatalogError> {
        let row = sqlx::query_as::<_, PackageRow>("SELECT id, title, image, price FROM packages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        Ok(row.map(|r| Package {
            id: r.id,
            title: r.title,
            image: r.image,
            price: r.price,
        }))
    }
}
