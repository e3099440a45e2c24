pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod processor;

pub use cache::ReconcileCache;
pub use config::PipelineConfig;
pub use error::ReconcileError;
pub use pipeline::{RawSources, Reconciled, reconcile, reconcile_sources};
