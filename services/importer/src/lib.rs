//! Sales importer - loads the denormalized sales CSV into the normalized
//! regions/products/customers/sales schema.
//!
//! Flow:
//! - Read the source file into memory (`source`)
//! - Upsert distinct regions, products and customers (`upsert`)
//! - Resolve each row's natural keys to surrogate ids (`resolver`)
//! - Insert the sales in committed batches (`loader`)
//! - Summarise inserted vs. skipped rows (`report`)
//!
//! `pipeline` runs these stages in order against any `store::SalesStore`.

pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod source;
pub mod store;
pub mod upsert;

pub use config::{Args, AuthMode, ImportConfig};
pub use error::{ImportError, PipelineError, SourceError, StoreError};
pub use pipeline::{Pipeline, PipelineOptions, Stage};
pub use report::LoadReport;
pub use store::{MemoryStore, PgStore, SalesStore};
