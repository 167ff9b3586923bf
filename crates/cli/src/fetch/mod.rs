//! `calsync fetch`: pull raw events for the expanded ticker set.

pub mod http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_io::fetch::FetchReport;
use calsync_io::{
    canonical_tickers, fetch_events, load_institutions, query_window, write_raw, EventSource,
    QueryWindow, RetryPolicy, SnapshotSource,
};
use calsync_recon::{expand_variants, RuleSet};
use chrono::{Local, NaiveDate};
use clap::Args;

use crate::exit_codes::{EXIT_FETCH_UPSTREAM, EXIT_USAGE};
use crate::stages::load_rules;
use crate::CliError;

pub const DEFAULT_PAST_MONTHS: u32 = 6;
pub const DEFAULT_FUTURE_MONTHS: u32 = 6;

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Provider CSV dump to serve events from
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Calendar-events endpoint (credentials from CALSYNC_API_USERNAME / CALSYNC_API_PASSWORD)
    #[arg(long, env = "CALSYNC_SOURCE_URL")]
    pub url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start (YYYY-MM-DD). Requires --to.
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Window end inclusive (YYYY-MM-DD). Requires --from.
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Whole months before today (ignored with --from/--to)
    #[arg(long, default_value_t = DEFAULT_PAST_MONTHS)]
    pub past_months: u32,

    /// Whole months after today (ignored with --from/--to)
    #[arg(long, default_value_t = DEFAULT_FUTURE_MONTHS)]
    pub future_months: u32,

    /// Pause between monthly chunks, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub chunk_delay_ms: u64,
}

/// Where events come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Snapshot(PathBuf),
    Http(String),
}

impl SourceArgs {
    fn spec(&self) -> Result<SourceSpec, CliError> {
        match (&self.snapshot, &self.url) {
            (Some(path), None) => Ok(SourceSpec::Snapshot(path.clone())),
            (None, Some(url)) => Ok(SourceSpec::Http(url.clone())),
            _ => Err(CliError::args("pass exactly one of --snapshot or --url")),
        }
    }
}

pub fn open_source(spec: &SourceSpec, rules: &RuleSet) -> Result<Box<dyn EventSource>, CliError> {
    match spec {
        SourceSpec::Snapshot(path) => Ok(Box::new(SnapshotSource::load(path, &rules.fields)?)),
        SourceSpec::Http(url) => {
            let credentials = http::credentials_from_env()?;
            Ok(Box::new(http::HttpSource::new(url, credentials, rules.fields.clone())?))
        }
    }
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        CliError::args(format!("invalid --{flag} date '{value}'")).with_hint("use YYYY-MM-DD")
    })
}

/// Explicit `--from`/`--to`, else whole months around `today`.
pub fn resolve_window(args: &WindowArgs, today: NaiveDate) -> Result<QueryWindow, CliError> {
    match (&args.from, &args.to) {
        (Some(from), Some(to)) => {
            let window = QueryWindow {
                start: parse_date("from", from)?,
                end: parse_date("to", to)?,
            };
            if window.start > window.end {
                return Err(CliError::new(EXIT_USAGE, format!("--from {from} is after --to {to}")));
            }
            Ok(window)
        }
        _ => Ok(query_window(today, args.past_months, args.future_months)?),
    }
}

/// Fetch every chunk of `window` and write the raw file. Fails only when
/// every chunk failed.
pub fn fetch_stage(
    source: &dyn EventSource,
    institutions: &Path,
    rules: &RuleSet,
    window: &QueryWindow,
    policy: &RetryPolicy,
    out: &Path,
) -> Result<FetchReport, CliError> {
    let table = load_institutions(institutions)?;
    let expansion = expand_variants(&canonical_tickers(&table), &rules.variants);

    let (events, report) = fetch_events(source, &expansion.query, window, policy);
    if report.chunks > 0 && report.failed_chunks == report.chunks {
        return Err(CliError::new(
            EXIT_FETCH_UPSTREAM,
            format!("all {} chunk(s) failed from {}", report.chunks, source.name()),
        ));
    }
    write_raw(out, &events, &rules.fields)?;
    eprintln!(
        "fetched: {} events for {} tickers, {} to {} ({} of {} chunks ok)",
        events.len(),
        expansion.query.len(),
        window.start,
        window.end,
        report.chunks - report.failed_chunks,
        report.chunks,
    );
    Ok(report)
}

pub fn cmd_fetch(
    source: SourceArgs,
    institutions: PathBuf,
    rules: Option<PathBuf>,
    out: PathBuf,
    window: WindowArgs,
) -> Result<(), CliError> {
    let rules = load_rules(rules.as_deref())?;
    let spec = source.spec()?;
    let query = resolve_window(&window, Local::now().date_naive())?;
    let policy = RetryPolicy {
        chunk_delay: Duration::from_millis(window.chunk_delay_ms),
        ..RetryPolicy::default()
    };

    let source = open_source(&spec, &rules)?;
    fetch_stage(source.as_ref(), &institutions, &rules, &query, &policy, &out)?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn explicit_window_wins() {
        let args = WindowArgs {
            from: Some("2024-01-01".into()),
            to: Some("2024-03-31".into()),
            ..WindowArgs::default()
        };
        let window = resolve_window(&args, date(2030, 1, 1)).unwrap();
        assert_eq!(window.start, date(2024, 1, 1));
        assert_eq!(window.end, date(2024, 3, 31));
    }

    #[test]
    fn month_window_around_today() {
        let args = WindowArgs {
            past_months: 1,
            future_months: 2,
            ..WindowArgs::default()
        };
        let window = resolve_window(&args, date(2024, 2, 15)).unwrap();
        assert_eq!(window.start, date(2024, 1, 1));
        assert_eq!(window.end, date(2024, 4, 30));
    }

    #[test]
    fn reversed_window_is_usage_error() {
        let args = WindowArgs {
            from: Some("2024-03-01".into()),
            to: Some("2024-01-01".into()),
            ..WindowArgs::default()
        };
        assert_eq!(resolve_window(&args, date(2024, 1, 1)).unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn bad_date_has_hint() {
        let err = parse_date("from", "01/02/2024").unwrap_err();
        assert_eq!(err.hint.as_deref(), Some("use YYYY-MM-DD"));
    }
}
