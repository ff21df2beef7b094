use std::collections::HashMap;

use tracing::debug;

use super::SalesStore;
use crate::error::StoreError;
use crate::model::{Dimension, DimensionValue, NewSale};

/// A stored dimension row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRow {
    pub id: i32,
    pub key: String,
    pub description: Option<String>,
}

/// Append-only table; rows past `committed` belong to the open unit of work.
#[derive(Debug, Default)]
struct Table {
    rows: Vec<DimensionRow>,
    by_key: HashMap<String, i32>,
    committed: usize,
    next_id: i32,
}

impl Table {
    fn insert(&mut self, value: &DimensionValue) -> bool {
        if self.by_key.contains_key(&value.key) {
            return false;
        }
        self.next_id += 1;
        self.by_key.insert(value.key.clone(), self.next_id);
        self.rows.push(DimensionRow {
            id: self.next_id,
            key: value.key.clone(),
            description: value.description.clone(),
        });
        true
    }

    fn contains_id(&self, id: i32) -> bool {
        // ids are handed out in push order, so rows stay sorted by id
        self.rows.binary_search_by_key(&id, |row| row.id).is_ok()
    }

    fn rollback(&mut self) {
        for row in self.rows.drain(self.committed..) {
            self.by_key.remove(&row.key);
        }
    }
}

/// In-memory `SalesStore` used for dry runs and tests.
///
/// Surrogate ids come from a per-table counter that never goes backwards, like
/// a database sequence. Sales referencing unknown ids are rejected the way a
/// foreign key constraint would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    regions: Table,
    products: Table,
    customers: Table,
    sales: Vec<NewSale>,
    committed_sales: usize,
    commit_log: Vec<usize>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, dimension: Dimension) -> &[DimensionRow] {
        &self.table(dimension).rows
    }

    /// Natural keys of a dimension in insertion order.
    pub fn keys(&self, dimension: Dimension) -> Vec<&str> {
        self.rows(dimension).iter().map(|r| r.key.as_str()).collect()
    }

    pub fn id_of(&self, dimension: Dimension, key: &str) -> Option<i32> {
        self.table(dimension).by_key.get(key).copied()
    }

    /// All sales, committed or not.
    pub fn sales(&self) -> &[NewSale] {
        &self.sales
    }

    pub fn committed_sales(&self) -> usize {
        self.committed_sales
    }

    /// Number of sales that were committed at each commit, in order.
    pub fn commit_log(&self) -> &[usize] {
        &self.commit_log
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn table(&self, dimension: Dimension) -> &Table {
        match dimension {
            Dimension::Region => &self.regions,
            Dimension::Product => &self.products,
            Dimension::Customer => &self.customers,
        }
    }

    fn table_mut(&mut self, dimension: Dimension) -> &mut Table {
        match dimension {
            Dimension::Region => &mut self.regions,
            Dimension::Product => &mut self.products,
            Dimension::Customer => &mut self.customers,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Connection(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

impl SalesStore for MemoryStore {
    async fn insert_if_absent(
        &mut self,
        dimension: Dimension,
        value: &DimensionValue,
    ) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.table_mut(dimension).insert(value))
    }

    async fn find_id(
        &mut self,
        dimension: Dimension,
        key: &str,
    ) -> Result<Option<i32>, StoreError> {
        self.ensure_open()?;
        Ok(self.id_of(dimension, key))
    }

    async fn load_keys(
        &mut self,
        dimension: Dimension,
    ) -> Result<HashMap<String, i32>, StoreError> {
        self.ensure_open()?;
        Ok(self.table(dimension).by_key.clone())
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<(), StoreError> {
        self.ensure_open()?;
        let references = [
            (Dimension::Product, sale.product_id),
            (Dimension::Customer, sale.customer_id),
            (Dimension::Region, sale.region_id),
        ];
        for (dimension, id) in references {
            if !self.table(dimension).contains_id(id) {
                return Err(StoreError::Row(format!(
                    "foreign key violation: {} {} does not exist",
                    dimension.id_column(),
                    id
                )));
            }
        }
        self.sales.push(sale.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        for dimension in Dimension::ALL {
            let table = self.table_mut(dimension);
            table.committed = table.rows.len();
        }
        self.committed_sales = self.sales.len();
        self.commit_log.push(self.committed_sales);
        debug!(sales = self.committed_sales, "memory store commit");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        for dimension in Dimension::ALL {
            self.table_mut(dimension).rollback();
        }
        self.sales.truncate(self.committed_sales);
        self.closed = true;
        Ok(())
    }
}
