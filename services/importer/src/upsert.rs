//! Dimension Upserter - makes every distinct natural key exist exactly once.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::{Dimension, DimensionValue, Record};
use crate::store::SalesStore;

/// Counts for one dimension pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Distinct values offered to the store
    pub distinct: usize,
    pub inserted: usize,
    /// Values that already had a row
    pub existing: usize,
    /// Values whose statement was rejected
    pub failed: usize,
}

/// Deduplicate the natural keys of `dimension` found in `records`.
///
/// Empty keys are dropped. For products the first non-empty description in
/// source order is kept. BTreeMap keeps iteration deterministic.
pub fn distinct_values(
    records: &[Record],
    dimension: Dimension,
) -> BTreeMap<String, DimensionValue> {
    let mut values: BTreeMap<String, DimensionValue> = BTreeMap::new();

    for record in records {
        let key = record.natural_key(dimension);
        if key.is_empty() {
            continue;
        }

        let entry = values
            .entry(key.to_string())
            .or_insert_with(|| DimensionValue::new(key));

        if dimension == Dimension::Product && entry.description.is_none() {
            let description = record.description.trim();
            if !description.is_empty() {
                entry.description = Some(description.to_string());
            }
        }
    }

    values
}

/// Insert each value unless it already exists, then commit once.
///
/// A rejected value is logged and counted; the remaining values are still
/// processed. A lost connection aborts the pass.
pub async fn upsert_all<S, I>(
    store: &mut S,
    dimension: Dimension,
    values: I,
) -> Result<UpsertOutcome, StoreError>
where
    S: SalesStore,
    I: IntoIterator<Item = DimensionValue>,
{
    let mut outcome = UpsertOutcome::default();

    for value in values {
        outcome.distinct += 1;
        match store.insert_if_absent(dimension, &value).await {
            Ok(true) => outcome.inserted += 1,
            Ok(false) => outcome.existing += 1,
            Err(err) if err.is_connection() => return Err(err),
            Err(err) => {
                outcome.failed += 1;
                warn!(%dimension, key = %value.key, error = %err, "dimension insert failed");
            }
        }
    }

    store.commit().await?;

    info!(
        %dimension,
        distinct = outcome.distinct,
        inserted = outcome.inserted,
        existing = outcome.existing,
        failed = outcome.failed,
        "dimension upsert complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;

    fn rec(country: &str, stock: &str, description: &str, customer: &str) -> Record {
        Record {
            country: country.into(),
            stock_code: stock.into(),
            description: description.into(),
            customer_id: customer.into(),
            ..Record::default()
        }
    }

    fn sample() -> Vec<Record> {
        vec![
            rec("UK", "A1", "MUG", "C1"),
            rec("UK", "A2", "JUG", "C2"),
            rec("FR", "A1", "MUG (RED)", "C1"),
        ]
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_distinct_values_deduplicates() {
        let regions = distinct_values(&sample(), Dimension::Region);
        let keys: Vec<_> = regions.keys().map(String::as_str).collect();
        assert_eq!(keys, ["FR", "UK"]);
    }

    #[test]
    fn test_distinct_products_keep_first_description() {
        let products = distinct_values(&sample(), Dimension::Product);
        assert_eq!(products["A1"].description.as_deref(), Some("MUG"));
        assert_eq!(products["A2"].description.as_deref(), Some("JUG"));
    }

    #[test]
    fn test_distinct_products_skip_blank_description() {
        let records = vec![rec("UK", "A1", "  ", "C1"), rec("UK", "A1", "MUG", "C1")];
        let products = distinct_values(&records, Dimension::Product);
        assert_eq!(products["A1"].description.as_deref(), Some("MUG"));
    }

    #[test]
    fn test_distinct_values_ignore_empty_keys() {
        let records = vec![rec("UK", "A1", "MUG", ""), rec("UK", "A1", "MUG", "   ")];
        assert!(distinct_values(&records, Dimension::Customer).is_empty());
    }

    #[test]
    fn test_distinct_customers_carry_no_description() {
        let customers = distinct_values(&sample(), Dimension::Customer);
        assert!(customers.values().all(|v| v.description.is_none()));
    }

    // -------------------------------------------------------------------------
    // UPSERT
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_upsert_inserts_each_value_once() {
        let mut store = MemoryStore::new();
        let values = distinct_values(&sample(), Dimension::Product);

        let outcome = upsert_all(&mut store, Dimension::Product, values.into_values())
            .await
            .unwrap();

        assert_eq!(outcome.distinct, 2);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.keys(Dimension::Product), ["A1", "A2"]);
        assert_eq!(store.commit_log().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let mut store = MemoryStore::new();
        let records = sample();

        let first = upsert_all(
            &mut store,
            Dimension::Region,
            distinct_values(&records, Dimension::Region).into_values(),
        )
        .await
        .unwrap();
        let second = upsert_all(
            &mut store,
            Dimension::Region,
            distinct_values(&records, Dimension::Region).into_values(),
        )
        .await
        .unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, 2);
        assert_eq!(store.rows(Dimension::Region).len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_isolates_rejected_value() {
        let mut store = FaultyStore::default().reject_value(Dimension::Customer, "C1");
        let values = distinct_values(&sample(), Dimension::Customer);

        let outcome = upsert_all(&mut store, Dimension::Customer, values.into_values())
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.inner.keys(Dimension::Customer), ["C2"]);
    }

    #[tokio::test]
    async fn test_upsert_connection_loss_is_fatal() {
        let mut store = FaultyStore::default().disconnect_on(Dimension::Region, "FR");
        let values = distinct_values(&sample(), Dimension::Region);

        let err = upsert_all(&mut store, Dimension::Region, values.into_values())
            .await
            .unwrap_err();

        assert!(err.is_connection());
        // FR sorts first, so nothing was inserted or committed
        assert!(store.inner.rows(Dimension::Region).is_empty());
        assert!(store.inner.commit_log().is_empty());
    }
}
