//! The import job as a linear sequence of stages.
//!
//! Init -> LoadSource -> UpsertRegions -> UpsertProducts -> UpsertCustomers
//!      -> LoadFacts -> Finalize -> Done
//!
//! No stage is revisited. Any error outside the fact loader's row loop ends the
//! run; the store is closed either way.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{ImportError, PipelineError};
use crate::loader::{self, LoadOptions};
use crate::model::Dimension;
use crate::report::{self, LoadReport};
use crate::resolver::{KeyResolver, ResolveStrategy};
use crate::source;
use crate::store::SalesStore;
use crate::upsert;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    LoadSource,
    UpsertRegions,
    UpsertProducts,
    UpsertCustomers,
    LoadFacts,
    Finalize,
    Done,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::LoadSource),
            Stage::LoadSource => Some(Stage::UpsertRegions),
            Stage::UpsertRegions => Some(Stage::UpsertProducts),
            Stage::UpsertProducts => Some(Stage::UpsertCustomers),
            Stage::UpsertCustomers => Some(Stage::LoadFacts),
            Stage::LoadFacts => Some(Stage::Finalize),
            Stage::Finalize => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::LoadSource => "load-source",
            Stage::UpsertRegions => "upsert-regions",
            Stage::UpsertProducts => "upsert-products",
            Stage::UpsertCustomers => "upsert-customers",
            Stage::LoadFacts => "load-facts",
            Stage::Finalize => "finalize",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source_path: PathBuf,
    pub delimiter: u8,
    pub resolve: ResolveStrategy,
    pub load: LoadOptions,
}

impl PipelineOptions {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            delimiter: b',',
            resolve: ResolveStrategy::default(),
            load: LoadOptions::default(),
        }
    }
}

/// One import run over an exclusively owned store.
pub struct Pipeline<S> {
    store: S,
    options: PipelineOptions,
    stage: Stage,
}

impl<S: SalesStore> Pipeline<S> {
    pub fn new(store: S, options: PipelineOptions) -> Self {
        Self {
            store,
            options,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage and release the store. Returns the store alongside the
    /// result so callers can inspect it.
    pub async fn run(mut self) -> (S, Result<LoadReport, PipelineError>) {
        let result = match self.execute().await {
            Ok(report) => self.finalize(report).await,
            Err(err) => {
                warn!(stage = %err.stage, error = %err.source, "import aborted");
                if let Err(close_err) = self.store.close().await {
                    warn!(error = %close_err, "failed to close store after abort");
                }
                Err(err)
            }
        };
        (self.store, result)
    }

    async fn execute(&mut self) -> Result<LoadReport, PipelineError> {
        self.enter(Stage::LoadSource);
        let records = source::read(&self.options.source_path, self.options.delimiter)
            .await
            .map_err(|e| self.fail(e))?;

        let mut upserts = BTreeMap::new();
        for (stage, dimension) in [
            (Stage::UpsertRegions, Dimension::Region),
            (Stage::UpsertProducts, Dimension::Product),
            (Stage::UpsertCustomers, Dimension::Customer),
        ] {
            self.enter(stage);
            let values = upsert::distinct_values(&records, dimension);
            let outcome = upsert::upsert_all(&mut self.store, dimension, values.into_values())
                .await
                .map_err(|e| self.fail(e))?;
            upserts.insert(dimension, outcome);
        }

        self.enter(Stage::LoadFacts);
        let resolver = KeyResolver::build(self.options.resolve, &mut self.store)
            .await
            .map_err(|e| self.fail(e))?;
        let outcome = loader::load(&mut self.store, &resolver, &records, self.options.load)
            .await
            .map_err(|e| self.fail(e))?;

        Ok(report::summarize(outcome.inserted, outcome.skipped, records.len())
            .with_upserts(upserts)
            .with_load(&outcome))
    }

    async fn finalize(&mut self, report: LoadReport) -> Result<LoadReport, PipelineError> {
        self.enter(Stage::Finalize);
        self.store.close().await.map_err(|e| self.fail(e))?;
        self.enter(Stage::Done);
        Ok(report)
    }

    fn enter(&mut self, next: Stage) {
        debug_assert_eq!(self.stage.next(), Some(next), "stages run strictly in order");
        info!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self, err: impl Into<ImportError>) -> PipelineError {
        PipelineError {
            stage: self.stage,
            source: err.into(),
        }
    }
}
