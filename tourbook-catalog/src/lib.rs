pub mod package;
pub mod memory;

pub use package::{CatalogError, Package, PackageCatalog};
pub use memory::InMemoryCatalog;
