//! `calsync variants | process | upload | validate` and the stage functions
//! `calsync run` chains together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use calsync_io::store::SqliteStore;
use calsync_io::{
    canonical_tickers, load_institutions, read_processed, read_raw, upload, write_processed,
    UploadReport,
};
use calsync_recon::variants::Expansion;
use calsync_recon::{expand_variants, ReconInput, ReconResult, RuleSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::exit_codes::{EXIT_ERROR, EXIT_PROCESS_INVALID_RULES};
use crate::CliError;

/// Built-in rules when `path` is `None`.
pub fn load_rules(path: Option<&Path>) -> Result<RuleSet, CliError> {
    let Some(path) = path else {
        return Ok(RuleSet::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::args(format!("cannot read rules {}: {e}", path.display())))?;
    RuleSet::from_toml(&text).map_err(|e| {
        CliError::new(EXIT_PROCESS_INVALID_RULES, format!("{}: {e}", path.display()))
    })
}

fn parse_fetched_at(value: Option<&str>) -> Result<DateTime<Utc>, CliError> {
    match value {
        None => Ok(Utc::now()),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                CliError::args(format!("invalid --fetched-at '{text}': {e}"))
                    .with_hint("use RFC 3339, e.g. 2024-02-01T09:30:00Z")
            }),
    }
}

// ============================================================================
// variants
// ============================================================================

#[derive(Serialize)]
struct VariantsOutput<'a> {
    query: &'a [String],
    map: BTreeMap<&'a str, &'a str>,
}

pub fn cmd_variants(institutions: PathBuf, rules: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let rules = load_rules(rules.as_deref())?;
    let table = load_institutions(&institutions)?;
    let Expansion { query, map } = expand_variants(&canonical_tickers(&table), &rules.variants);

    if json {
        let output = VariantsOutput {
            query: &query,
            map: map.iter().collect(),
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("query tickers ({}): {}", query.len(), query.join(", "));
    for (from, to) in map.iter().filter(|(from, to)| from != to) {
        println!("  {from} -> {to}");
    }
    Ok(())
}

// ============================================================================
// process
// ============================================================================

/// Read raw events, reconcile, write the processed file.
pub fn process_stage(
    raw: &Path,
    institutions: &Path,
    rules: &RuleSet,
    use_variants: bool,
    fetched_at: DateTime<Utc>,
    out: &Path,
) -> Result<ReconResult, CliError> {
    let raw_events = read_raw(raw, &rules.fields)?;
    let table = load_institutions(institutions)?;
    let variants = use_variants
        .then(|| expand_variants(&canonical_tickers(&table), &rules.variants).map);

    let input = ReconInput {
        raw: raw_events,
        institutions: table,
        variants,
        fetched_at,
    };
    let result = calsync_recon::run(rules, &input)?;
    write_processed(out, &result.events)?;
    Ok(result)
}

pub fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "processed: {} raw -> {} events ({} merged, {} excluded, {} unknown category, {} same-instant, {} fiscal, {} consolidated)",
        s.raw_events,
        s.output_events,
        s.merge.dropped,
        s.filter.excluded.values().sum::<usize>(),
        s.filter.unknown.values().sum::<usize>(),
        s.same_instant.dropped,
        s.fiscal.dropped,
        s.consolidate.dropped,
    );
    if s.temporal_issues > 0 {
        eprintln!("  temporal issues: {}", s.temporal_issues);
    }
    for (category, count) in &s.event_types {
        eprintln!("  {category}: {count}");
    }
    if let (Some(first), Some(last)) = (&s.first_date, &s.last_date) {
        eprintln!("  dates: {first} to {last} ({})", result.meta.local_zone);
    }
}

pub fn cmd_process(
    raw: PathBuf,
    institutions: PathBuf,
    rules: Option<PathBuf>,
    out: PathBuf,
    json: bool,
    no_variants: bool,
    fetched_at: Option<String>,
) -> Result<(), CliError> {
    let rules = load_rules(rules.as_deref())?;
    let fetched_at = parse_fetched_at(fetched_at.as_deref())?;
    let result = process_stage(&raw, &institutions, &rules, !no_variants, fetched_at, &out)?;

    if json {
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }
    print_summary(&result);
    eprintln!("wrote {}", out.display());
    Ok(())
}

// ============================================================================
// upload
// ============================================================================

pub fn upload_stage(
    processed: &Path,
    db: &Path,
    table: &str,
    dry_run: bool,
    create_table: bool,
) -> Result<UploadReport, CliError> {
    let events = read_processed(processed)?;
    let mut store = SqliteStore::open(db, table)?;
    if create_table && !dry_run {
        store.create_table()?;
    }
    let report = upload(&mut store, &events, dry_run)?;
    info!(table = store.table(), inserted = report.inserted, "upload stage done");
    Ok(report)
}

pub fn print_upload(report: &UploadReport, table: &str) {
    if report.dry_run {
        eprintln!(
            "dry run: table '{table}' reachable, schema ok, {} existing rows",
            report.previous_rows
        );
    } else {
        eprintln!(
            "uploaded: replaced {} rows with {} in '{table}'",
            report.previous_rows, report.inserted
        );
    }
    if !report.extra_columns.is_empty() {
        eprintln!("  extra columns left empty: {}", report.extra_columns.join(", "));
    }
}

pub fn cmd_upload(
    processed: PathBuf,
    db: PathBuf,
    table: String,
    dry_run: bool,
    create_table: bool,
) -> Result<(), CliError> {
    let report = upload_stage(&processed, &db, &table, dry_run, create_table)?;
    print_upload(&report, &table);
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(path: PathBuf) -> Result<(), CliError> {
    let rules = load_rules(Some(&path))?;
    let cats = &rules.categories;
    eprintln!(
        "valid: {} included, {} excluded, {} dedup target(s), {} rename(s), zone {}",
        cats.included.len(),
        cats.excluded.len(),
        cats.dedup.len(),
        cats.rename.len(),
        rules.time.zone,
    );
    Ok(())
}
