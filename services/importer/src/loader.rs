//! Fact Loader - resolves foreign keys and inserts sales in batches.
//!
//! Row-level problems (unresolved keys, bad values, rejected inserts) are
//! counted as skipped and never abort the run. Only a failed commit does,
//! since it means a whole batch was lost.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{CoerceError, StoreError};
use crate::model::{Dimension, NewSale, Record};
use crate::resolver::{KeyResolver, RecordKeys};
use crate::store::SalesStore;

pub const DEFAULT_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Successful inserts between commits
    pub batch_size: usize,
    /// How many row errors are kept for the summary
    pub max_reported_errors: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
        }
    }
}

/// A skipped row kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub inserted: usize,
    /// unresolved + failed
    pub skipped: usize,
    pub unresolved: usize,
    pub failed: usize,
    /// First `max_reported_errors` failures
    pub errors: Vec<RowError>,
}

#[derive(Debug, Error)]
enum RowFailure {
    #[error("key lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error(transparent)]
    Coerce(#[from] CoerceError),

    #[error("insert failed: {0}")]
    Insert(#[source] StoreError),
}

enum RowResult {
    Inserted,
    Unresolved(Dimension),
}

/// Load `records` in source order.
///
/// Always leaves `inserted + skipped == records.len()` on success.
pub async fn load<S: SalesStore>(
    store: &mut S,
    resolver: &KeyResolver,
    records: &[Record],
    options: LoadOptions,
) -> Result<LoadOutcome, StoreError> {
    let total = records.len();
    let batch_size = options.batch_size.max(1);
    let mut outcome = LoadOutcome::default();

    info!(
        total,
        batch_size,
        strategy = ?resolver.strategy(),
        "loading sales"
    );

    for record in records {
        match load_row(store, resolver, record).await {
            Ok(RowResult::Inserted) => {
                outcome.inserted += 1;
                if outcome.inserted % batch_size == 0 {
                    store.commit().await?;
                    report_progress(outcome.inserted, total);
                }
            }
            Ok(RowResult::Unresolved(dimension)) => {
                outcome.skipped += 1;
                outcome.unresolved += 1;
                debug!(line = record.line, %dimension, "natural key not found, row skipped");
            }
            Err(failure) => {
                outcome.skipped += 1;
                outcome.failed += 1;
                if outcome.errors.len() < options.max_reported_errors {
                    warn!(line = record.line, error = %failure, "row skipped");
                    outcome.errors.push(RowError {
                        line: record.line,
                        reason: failure.to_string(),
                    });
                }
            }
        }
    }

    store.commit().await?;

    info!(
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        unresolved = outcome.unresolved,
        failed = outcome.failed,
        "sales load complete"
    );
    Ok(outcome)
}

async fn load_row<S: SalesStore>(
    store: &mut S,
    resolver: &KeyResolver,
    record: &Record,
) -> Result<RowResult, RowFailure> {
    let keys = match resolver
        .resolve_record(store, record)
        .await
        .map_err(RowFailure::Lookup)?
    {
        RecordKeys::Resolved(keys) => keys,
        RecordKeys::Unresolved(dimension) => return Ok(RowResult::Unresolved(dimension)),
    };

    let sale = NewSale::coerce(record, keys)?;
    store.insert_sale(&sale).await.map_err(RowFailure::Insert)?;
    Ok(RowResult::Inserted)
}

fn report_progress(inserted: usize, total: usize) {
    let percentage = if total == 0 {
        100.0
    } else {
        inserted as f64 / total as f64 * 100.0
    };
    info!("Progress: {}/{} ({:.1}%)", inserted, total, percentage);
}
