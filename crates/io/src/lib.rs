//! `calsync-io`: file, store and provider plumbing around the engine.
//!
//! Raw and processed CSV files, the institutions TOML file, the SQLite
//! destination store, and the chunked fetch driver.

pub mod error;
pub mod fetch;
pub mod institutions;
pub mod processed;
pub mod raw;
pub mod store;

pub use error::{FetchError, IoError, StoreError};
pub use fetch::{fetch_events, query_window, EventSource, QueryWindow, RetryPolicy, SnapshotSource};
pub use institutions::{canonical_tickers, load_institutions};
pub use processed::{read_processed, write_processed};
pub use raw::{read_raw, write_raw};
pub use store::{upload, DestinationStore, SqliteStore, UploadReport};
