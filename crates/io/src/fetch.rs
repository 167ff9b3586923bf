//! Fetch driver: splits the query window into monthly chunks, asks an
//! [`EventSource`] for each, retries transient failures with exponential
//! backoff, and keeps only events for tickers that were asked for.
//!
//! A chunk that still fails after the last attempt is logged and skipped,
//! so one bad month never loses the rest of the window.

use std::collections::HashSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use calsync_recon::config::FieldMapping;
use calsync_recon::temporal::parse_instant;
use calsync_recon::RawEvent;
use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FetchError, IoError};
use crate::raw::read_raw;

// ── Window ──────────────────────────────────────────────────────────

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl QueryWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

fn last_of_month(date: NaiveDate) -> Option<NaiveDate> {
    first_of_month(date)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// First day of the month `past_months` before `today` through the last day
/// of the month `future_months` after it.
pub fn query_window(
    today: NaiveDate,
    past_months: u32,
    future_months: u32,
) -> Result<QueryWindow, FetchError> {
    let out_of_range = || FetchError::Fatal(format!("query window out of range around {today}"));
    let start = today
        .checked_sub_months(Months::new(past_months))
        .and_then(first_of_month)
        .ok_or_else(out_of_range)?;
    let end = today
        .checked_add_months(Months::new(future_months))
        .and_then(last_of_month)
        .ok_or_else(out_of_range)?;
    Ok(QueryWindow { start, end })
}

/// One chunk per calendar month, clipped to the window.
pub fn monthly_chunks(window: &QueryWindow) -> Vec<QueryWindow> {
    let mut chunks = Vec::new();
    let mut cursor = window.start;
    while cursor <= window.end {
        let Some(month_end) = last_of_month(cursor) else {
            break;
        };
        let end = month_end.min(window.end);
        chunks.push(QueryWindow { start: cursor, end });
        match end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    chunks
}

// ── Sources ─────────────────────────────────────────────────────────

/// Provider of raw calendar events.
pub trait EventSource {
    fn name(&self) -> &str;

    /// Events for `tickers` dated inside `window`.
    fn fetch(&self, tickers: &[String], window: &QueryWindow) -> Result<Vec<RawEvent>, FetchError>;
}

/// A provider CSV dump served as if it were the live provider.
pub struct SnapshotSource {
    events: Vec<RawEvent>,
}

impl SnapshotSource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }

    pub fn load(path: &Path, fields: &FieldMapping) -> Result<Self, IoError> {
        Ok(Self::new(read_raw(path, fields)?))
    }
}

impl EventSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn fetch(&self, tickers: &[String], window: &QueryWindow) -> Result<Vec<RawEvent>, FetchError> {
        let wanted: HashSet<&str> = tickers.iter().map(String::as_str).collect();
        Ok(self
            .events
            .iter()
            .filter(|e| wanted.contains(e.ticker.as_str()))
            .filter(|e| {
                e.event_date_time
                    .as_deref()
                    .and_then(parse_instant)
                    .is_some_and(|dt| window.contains(dt.date_naive()))
            })
            .cloned()
            .collect())
    }
}

// ── Driver ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Pause between chunks.
    pub chunk_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            chunk_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// No sleeping at all. Used by snapshot runs and tests.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Call `source` until it succeeds, a fatal error occurs, or attempts run out.
pub fn fetch_with_retry(
    source: &dyn EventSource,
    tickers: &[String],
    chunk: &QueryWindow,
    policy: &RetryPolicy,
) -> Result<Vec<RawEvent>, FetchError> {
    let mut backoff = policy.initial_backoff;
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match source.fetch(tickers, chunk) {
            Ok(events) => return Ok(events),
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(
                    source = source.name(),
                    attempt,
                    wait_ms = backoff.as_millis() as u64,
                    error = %err,
                    "fetch failed, retrying"
                );
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }
    Err(FetchError::Fatal(format!("{} gave up after {attempts} attempts", source.name())))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub chunks: usize,
    pub failed_chunks: usize,
    /// Events returned for tickers outside the query set.
    pub foreign_dropped: usize,
}

/// Fetch the whole window chunk by chunk. Never fails: chunk errors are
/// logged and counted.
pub fn fetch_events(
    source: &dyn EventSource,
    tickers: &[String],
    window: &QueryWindow,
    policy: &RetryPolicy,
) -> (Vec<RawEvent>, FetchReport) {
    let wanted: HashSet<&str> = tickers.iter().map(String::as_str).collect();
    let chunks = monthly_chunks(window);
    let mut report = FetchReport {
        chunks: chunks.len(),
        ..FetchReport::default()
    };
    let mut events = Vec::new();

    info!(
        source = source.name(),
        tickers = tickers.len(),
        start = %window.start,
        end = %window.end,
        chunks = chunks.len(),
        "fetching calendar events"
    );

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !policy.chunk_delay.is_zero() {
            thread::sleep(policy.chunk_delay);
        }
        match fetch_with_retry(source, tickers, chunk, policy) {
            Ok(batch) => {
                debug!(start = %chunk.start, end = %chunk.end, events = batch.len(), "chunk fetched");
                for event in batch {
                    if wanted.contains(event.ticker.as_str()) {
                        events.push(event);
                    } else {
                        report.foreign_dropped += 1;
                    }
                }
            }
            Err(err) => {
                warn!(start = %chunk.start, end = %chunk.end, error = %err, "chunk failed, skipping");
                report.failed_chunks += 1;
            }
        }
    }

    if report.foreign_dropped > 0 {
        warn!(dropped = report.foreign_dropped, "dropped events for tickers outside the query");
    }
    info!(events = events.len(), failed_chunks = report.failed_chunks, "fetch complete");
    (events, report)
}
