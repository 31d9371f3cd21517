use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;

/// The slice of a tour package the booking flow needs.
///
/// Bookings copy `title` and `image` at creation time, so later edits to a
/// package never rewrite existing bookings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: Uuid,
    pub title: String,
    pub image: String,
    /// Price per traveler, in major currency units.
    pub price: i64,
}

impl Package {
    pub fn new(title: impl Into<String>, image: impl Into<String>, price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            image: image.into(),
            price,
        }
    }

    /// Total for a party of `travelers`, or `None` on overflow.
    pub fn quote(&self, travelers: u32) -> Option<i64> {
        self.price.checked_mul(i64::from(travelers))
    }
}

/// Read-only package lookup
#[async_trait]
pub trait PackageCatalog: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog storage error: {0}")]
    Storage(String),
}
