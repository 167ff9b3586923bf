//! `calsync-recon`: Calendar event reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded provider records, returns one
//! canonical event per reconciliation key plus a run summary.
//! No CLI or IO dependencies.

pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod filter;
pub mod fiscal;
pub mod merge;
pub mod model;
pub mod same_instant;
pub mod temporal;
pub mod transform;
pub mod validate;
pub mod variants;

pub use config::RuleSet;
pub use engine::{load_raw_events, run};
pub use error::ReconError;
pub use model::{CanonicalEvent, RawEvent, ReconInput, ReconResult, OUTPUT_COLUMNS};
pub use variants::{expand_variants, VariantMap};
