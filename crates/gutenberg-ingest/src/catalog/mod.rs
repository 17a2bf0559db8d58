// Catalog store
//
// The reconciliation engine talks to the catalog only through these
// traits. A Catalog is the single session of an ingestion run; each record
// is reconciled inside one CatalogTx, which either commits as a whole or
// leaves nothing behind.
//
// Implementations:
// - PgCatalog: PostgreSQL over one pooled connection held for the run
// - MemoryCatalog: in-process store with failure injection (tests, --dry-run)

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use memory::MemoryCatalog;
pub use models::{Author, CatalogCounts, Category, Item, ItemUpdate, NewAuthor};
pub use postgres::PgCatalog;

/// A catalog session
#[async_trait]
pub trait Catalog: Send {
    /// Open a unit of work
    ///
    /// Only one unit can be open per session at a time.
    async fn begin<'a>(&'a mut self) -> StoreResult<Box<dyn CatalogTx + 'a>>;
}

/// A unit of work against the catalog
///
/// Dropping a unit without calling [`CatalogTx::commit`] rolls it back.
/// After commit or rollback every further call fails with
/// `StoreError::TransactionClosed`.
#[async_trait]
pub trait CatalogTx: Send {
    async fn author_by_name(&mut self, name: &str) -> StoreResult<Option<Author>>;

    async fn author_exists(&mut self, id: i64) -> StoreResult<bool>;

    async fn insert_author(&mut self, author: &NewAuthor) -> StoreResult<Author>;

    async fn category_by_name(&mut self, name: &str) -> StoreResult<Option<Category>>;

    async fn insert_category(&mut self, name: &str) -> StoreResult<Category>;

    /// Item with its links, in link order
    async fn item_by_id(&mut self, id: i64) -> StoreResult<Option<Item>>;

    /// Insert the item row and its links
    async fn insert_item(&mut self, item: &Item) -> StoreResult<()>;

    /// Write the scalar fields of an existing item (links untouched)
    async fn update_item(&mut self, item: &Item) -> StoreResult<()>;

    /// Replace the author links of an item
    async fn set_item_authors(&mut self, item_id: i64, author_ids: &[i64]) -> StoreResult<()>;

    /// Replace the category links of an item
    async fn set_item_categories(&mut self, item_id: i64, category_ids: &[i64])
        -> StoreResult<()>;

    /// Delete an item and its links; false if it did not exist
    async fn delete_item(&mut self, id: i64) -> StoreResult<bool>;

    /// Delete an author and its links; false if it did not exist
    async fn delete_author(&mut self, id: i64) -> StoreResult<bool>;

    async fn counts(&mut self) -> StoreResult<CatalogCounts>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}
