//! Key Resolver - natural key to surrogate id.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::error::StoreError;
use crate::model::{Dimension, ForeignKeys, Record};
use crate::store::SalesStore;

/// How natural keys are turned into surrogate ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// One point query per key per row
    Lookup,
    /// Load every key once after the dimension upserts
    #[default]
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(i32),
    NotFound,
}

/// Outcome of resolving all three keys of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKeys {
    Resolved(ForeignKeys),
    /// First dimension whose key had no row
    Unresolved(Dimension),
}

#[derive(Debug, Default)]
pub struct KeyResolver {
    cache: Option<HashMap<Dimension, HashMap<String, i32>>>,
}

impl KeyResolver {
    /// Resolver that queries the store for every key.
    pub fn lookup() -> Self {
        Self { cache: None }
    }

    /// Resolver backed by a snapshot of every dimension's keys.
    pub async fn cached<S: SalesStore>(store: &mut S) -> Result<Self, StoreError> {
        let mut cache = HashMap::new();
        for dimension in Dimension::ALL {
            let keys = store.load_keys(dimension).await?;
            info!(%dimension, keys = keys.len(), "cached natural keys");
            cache.insert(dimension, keys);
        }
        Ok(Self { cache: Some(cache) })
    }

    pub async fn build<S: SalesStore>(
        strategy: ResolveStrategy,
        store: &mut S,
    ) -> Result<Self, StoreError> {
        match strategy {
            ResolveStrategy::Lookup => Ok(Self::lookup()),
            ResolveStrategy::Cached => Self::cached(store).await,
        }
    }

    pub fn strategy(&self) -> ResolveStrategy {
        if self.cache.is_some() {
            ResolveStrategy::Cached
        } else {
            ResolveStrategy::Lookup
        }
    }

    /// Resolve one natural key. A missing row is `NotFound`, not an error;
    /// `Err` only reports a storage failure during the lookup.
    pub async fn resolve<S: SalesStore>(
        &self,
        store: &mut S,
        dimension: Dimension,
        natural_key: &str,
    ) -> Result<Resolution, StoreError> {
        let key = natural_key.trim();
        if key.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let id = match &self.cache {
            Some(cache) => cache.get(&dimension).and_then(|keys| keys.get(key)).copied(),
            None => store.find_id(dimension, key).await?,
        };

        Ok(id.map_or(Resolution::NotFound, Resolution::Found))
    }

    /// Resolve product, customer and region for `record`, stopping at the
    /// first key that does not resolve.
    pub async fn resolve_record<S: SalesStore>(
        &self,
        store: &mut S,
        record: &Record,
    ) -> Result<RecordKeys, StoreError> {
        let mut ids = [0i32; 3];
        let order = [Dimension::Product, Dimension::Customer, Dimension::Region];

        for (slot, dimension) in ids.iter_mut().zip(order) {
            match self.resolve(store, dimension, record.natural_key(dimension)).await? {
                Resolution::Found(id) => *slot = id,
                Resolution::NotFound => return Ok(RecordKeys::Unresolved(dimension)),
            }
        }

        let [product_id, customer_id, region_id] = ids;
        Ok(RecordKeys::Resolved(ForeignKeys {
            product_id,
            customer_id,
            region_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DimensionValue;
    use crate::store::MemoryStore;

    async fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (dimension, key) in [
            (Dimension::Region, "UK"),
            (Dimension::Region, "FR"),
            (Dimension::Product, "A1"),
            (Dimension::Customer, "C1"),
        ] {
            store
                .insert_if_absent(dimension, &DimensionValue::new(key))
                .await
                .unwrap();
        }
        store
    }

    fn rec(country: &str, stock: &str, customer: &str) -> Record {
        Record {
            country: country.into(),
            stock_code: stock.into(),
            customer_id: customer.into(),
            ..Record::default()
        }
    }

    #[tokio::test]
    async fn test_lookup_found_and_not_found() {
        let mut store = seeded().await;
        let resolver = KeyResolver::lookup();

        assert_eq!(
            resolver.resolve(&mut store, Dimension::Region, "FR").await.unwrap(),
            Resolution::Found(2)
        );
        assert_eq!(
            resolver.resolve(&mut store, Dimension::Region, "DE").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_empty_key_is_not_found() {
        let mut store = seeded().await;
        let resolver = KeyResolver::lookup();
        assert_eq!(
            resolver.resolve(&mut store, Dimension::Customer, "  ").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_cached_matches_lookup() {
        let mut store = seeded().await;
        let cached = KeyResolver::cached(&mut store).await.unwrap();
        let lookup = KeyResolver::lookup();

        for (dimension, key) in [
            (Dimension::Region, "UK"),
            (Dimension::Product, "A1"),
            (Dimension::Customer, "C1"),
            (Dimension::Customer, "C9"),
        ] {
            assert_eq!(
                cached.resolve(&mut store, dimension, key).await.unwrap(),
                lookup.resolve(&mut store, dimension, key).await.unwrap()
            );
        }
        assert_eq!(cached.strategy(), ResolveStrategy::Cached);
    }

    #[tokio::test]
    async fn test_cached_snapshot_does_not_see_later_rows() {
        let mut store = seeded().await;
        let cached = KeyResolver::cached(&mut store).await.unwrap();
        store
            .insert_if_absent(Dimension::Region, &DimensionValue::new("DE"))
            .await
            .unwrap();

        assert_eq!(
            cached.resolve(&mut store, Dimension::Region, "DE").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_resolve_record_maps_all_keys() {
        let mut store = seeded().await;
        let resolver = KeyResolver::build(ResolveStrategy::Lookup, &mut store)
            .await
            .unwrap();

        let keys = resolver
            .resolve_record(&mut store, &rec("FR", "A1", "C1"))
            .await
            .unwrap();

        assert_eq!(
            keys,
            RecordKeys::Resolved(ForeignKeys {
                product_id: 1,
                customer_id: 1,
                region_id: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_record_reports_missing_dimension() {
        let mut store = seeded().await;
        let resolver = KeyResolver::lookup();

        let keys = resolver
            .resolve_record(&mut store, &rec("UK", "A1", "C2"))
            .await
            .unwrap();

        assert_eq!(keys, RecordKeys::Unresolved(Dimension::Customer));
    }
}
