//! CLI Exit Code Registry
//!
//! Single source of truth for `calsync` exit codes. Scheduled jobs branch on
//! them, so a code never changes meaning once released.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error (unspecified)                   |
//! | 2       | Universal | CLI usage error (bad args, unreadable config) |
//! | 3-9     | process   | Inputs, rules and reconciliation              |
//! | 10-19   | store     | Destination database                          |
//! | 20-29   | fetch     | Event provider                                |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map it in the matching `*_exit_code` function below

use calsync_io::{FetchError, IoError, StoreError};
use calsync_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable pipeline file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Process (3-9)
// =============================================================================

/// An upstream stage's output does not exist. The run stops before the
/// engine is invoked.
pub const EXIT_PROCESS_INPUT_MISSING: u8 = 3;

/// Rule set failed to parse or validate.
pub const EXIT_PROCESS_INVALID_RULES: u8 = 4;

/// Input file could not be parsed (bad CSV, missing required column, bad TOML).
pub const EXIT_PROCESS_PARSE: u8 = 5;

/// Output file could not be written.
pub const EXIT_PROCESS_WRITE: u8 = 6;

// =============================================================================
// Store (10-19)
// =============================================================================

/// Database could not be opened.
pub const EXIT_STORE_CONNECT: u8 = 10;

/// Destination table does not exist (and `--create-table` was not given).
pub const EXIT_STORE_MISSING_TABLE: u8 = 11;

/// Destination table lacks required columns, or the table name is invalid.
pub const EXIT_STORE_SCHEMA: u8 = 12;

/// Statement failed while replacing rows. The transaction was rolled back.
pub const EXIT_STORE_WRITE: u8 = 13;

// =============================================================================
// Fetch (20-29)
// =============================================================================

/// Source misconfigured: bad URL, missing credentials, bad window.
pub const EXIT_FETCH_CONFIG: u8 = 20;

/// Every chunk of the window failed.
pub const EXIT_FETCH_UPSTREAM: u8 = 21;

// =============================================================================
// Error mapping
// =============================================================================

pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) | ReconError::UnknownZone(_) => {
            EXIT_PROCESS_INVALID_RULES
        }
        ReconError::MissingColumn { .. } | ReconError::Csv(_) => EXIT_PROCESS_PARSE,
    }
}

pub fn io_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::NotFound(_) => EXIT_PROCESS_INPUT_MISSING,
        IoError::Read { .. } => EXIT_ERROR,
        IoError::Write { .. } => EXIT_PROCESS_WRITE,
        IoError::Csv { .. } | IoError::Toml { .. } => EXIT_PROCESS_PARSE,
        IoError::Recon(inner) => recon_exit_code(inner),
    }
}

pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::Connect(_) => EXIT_STORE_CONNECT,
        StoreError::MissingTable(_) => EXIT_STORE_MISSING_TABLE,
        StoreError::MissingColumns { .. } | StoreError::InvalidTable(_) => EXIT_STORE_SCHEMA,
        StoreError::Sql(_) => EXIT_STORE_WRITE,
    }
}

pub fn fetch_exit_code(err: &FetchError) -> u8 {
    match err {
        FetchError::Retryable(_) => EXIT_FETCH_UPSTREAM,
        FetchError::Fatal(_) => EXIT_FETCH_CONFIG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn codes_stay_in_their_ranges() {
        for code in [
            EXIT_PROCESS_INPUT_MISSING,
            EXIT_PROCESS_INVALID_RULES,
            EXIT_PROCESS_PARSE,
            EXIT_PROCESS_WRITE,
        ] {
            assert!((3..=9).contains(&code));
        }
        for code in [EXIT_STORE_CONNECT, EXIT_STORE_MISSING_TABLE, EXIT_STORE_SCHEMA, EXIT_STORE_WRITE] {
            assert!((10..=19).contains(&code));
        }
        for code in [EXIT_FETCH_CONFIG, EXIT_FETCH_UPSTREAM] {
            assert!((20..=29).contains(&code));
        }
    }

    #[test]
    fn missing_input_has_its_own_code() {
        let err = IoError::NotFound(PathBuf::from("output/raw.csv"));
        assert_eq!(io_exit_code(&err), EXIT_PROCESS_INPUT_MISSING);
        let err = IoError::Recon(ReconError::MissingColumn { column: "ticker".into() });
        assert_eq!(io_exit_code(&err), EXIT_PROCESS_PARSE);
    }
}
