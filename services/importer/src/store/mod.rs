//! Storage seam for the importer.
//!
//! The pipeline only talks to `SalesStore`. `PgStore` is the production
//! backend; `MemoryStore` backs dry runs and tests.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::model::{Dimension, DimensionValue, NewSale};

mod memory;
mod postgres;

pub use memory::{DimensionRow, MemoryStore};
pub use postgres::PgStore;

/// Operations the import pipeline needs from its storage backend.
///
/// Writes accumulate in an open unit of work until `commit` is called. A
/// failed write must leave the unit of work usable for the next statement.
#[allow(async_fn_in_trait)]
pub trait SalesStore {
    /// Insert `value` unless a row with the same natural key exists.
    /// Returns `true` if a row was inserted.
    async fn insert_if_absent(
        &mut self,
        dimension: Dimension,
        value: &DimensionValue,
    ) -> Result<bool, StoreError>;

    /// Point lookup of a surrogate id by natural key.
    async fn find_id(&mut self, dimension: Dimension, key: &str)
        -> Result<Option<i32>, StoreError>;

    /// Every natural key of a dimension with its surrogate id.
    async fn load_keys(&mut self, dimension: Dimension)
        -> Result<HashMap<String, i32>, StoreError>;

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Release the underlying connection. Uncommitted writes are discarded.
    async fn close(&mut self) -> Result<(), StoreError>;
}
