use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::variants::VariantMap;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One provider record, as fetched. Field names match the default provider
/// columns; empty provider values load as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub ticker: String,
    pub event_type: String,
    #[serde(default)]
    pub event_date_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub webcast_link: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub fiscal_year: Option<String>,
    #[serde(default)]
    pub fiscal_period: Option<String>,
    #[serde(default)]
    pub market_time_code: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
}

/// Institution metadata for one canonical ticker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Canonical ticker -> institution metadata. Read-only for the whole run.
pub type InstitutionTable = BTreeMap<String, Institution>;

/// Everything one pipeline run consumes.
pub struct ReconInput {
    pub raw: Vec<RawEvent>,
    pub institutions: InstitutionTable,
    /// Query expansion used by the fetch. `None` falls back to the suffix rewrite.
    pub variants: Option<VariantMap>,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Destination columns, in order. Nothing else is written downstream.
pub const OUTPUT_COLUMNS: [&str; 15] = [
    "ticker",
    "institution_name",
    "institution_id",
    "institution_type",
    "event_type",
    "event_headline",
    "event_date_time_utc",
    "event_date_time_local",
    "event_date",
    "event_time_local",
    "webcast_link",
    "contact_info",
    "fiscal_year",
    "fiscal_period",
    "data_fetched_timestamp",
];

/// A reconciled, fully denormalized calendar event.
///
/// Field order is the serialization order and must track [`OUTPUT_COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub ticker: String,
    pub institution_name: String,
    pub institution_id: String,
    pub institution_type: String,
    pub event_type: String,
    pub event_headline: String,
    pub event_date_time_utc: String,
    pub event_date_time_local: String,
    pub event_date: String,
    pub event_time_local: String,
    pub webcast_link: String,
    pub contact_info: String,
    pub fiscal_year: Option<String>,
    pub fiscal_period: Option<String>,
    pub data_fetched_timestamp: String,
}

/// Grouping component shared by the merge resolver and the consolidator:
/// fiscal year + period when both are present, else the local date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodKey {
    Fiscal { year: String, period: String },
    Date(String),
}

impl CanonicalEvent {
    /// `(fiscal_year, fiscal_period)` when both are set.
    pub fn fiscal_key(&self) -> Option<(&str, &str)> {
        match (self.fiscal_year.as_deref(), self.fiscal_period.as_deref()) {
            (Some(year), Some(period)) => Some((year, period)),
            _ => None,
        }
    }

    pub fn period_key(&self) -> PeriodKey {
        match self.fiscal_key() {
            Some((year, period)) => PeriodKey::Fiscal {
                year: year.to_string(),
                period: period.to_string(),
            },
            None => PeriodKey::Date(self.event_date.clone()),
        }
    }

    /// `YYYY-MM` prefix of the local date, if there is one.
    pub fn month(&self) -> Option<&str> {
        if self.event_date.len() >= 7 {
            self.event_date.get(..7)
        } else {
            None
        }
    }

    /// 0-2: one point for a webcast link, one for any contact detail.
    pub fn completeness(&self) -> u8 {
        u8::from(!self.webcast_link.is_empty()) + u8::from(!self.contact_info.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Resolution metadata
// ---------------------------------------------------------------------------

/// Provider last-modified stamp. Orders by the parsed instant first (absent
/// sorts lowest), then by the raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LastModified {
    pub parsed: Option<DateTime<Utc>>,
    pub raw: String,
}

/// Ephemeral per-record metadata used while resolving duplicates. Never
/// serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    /// Position of the record in the raw input.
    pub record: usize,
    pub event_id: String,
    /// Ticker as the provider returned it, before normalization.
    pub source_ticker: String,
    pub last_modified: LastModified,
    pub time_unconfirmed: bool,
}

/// A canonical event paired with its resolution metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEvent {
    pub event: CanonicalEvent,
    pub provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Stage reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub kept: usize,
    /// Deny-listed categories, dropped on purpose.
    pub excluded: BTreeMap<String, usize>,
    /// Categories on neither list.
    pub unknown: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub groups_merged: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SameInstantReport {
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FiscalReport {
    pub dropped: usize,
    pub peer_resolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidateReport {
    pub dropped: usize,
    pub renamed: usize,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    pub raw_events: usize,
    pub output_events: usize,
    pub temporal_issues: usize,
    pub merge: MergeReport,
    pub filter: FilterReport,
    pub same_instant: SameInstantReport,
    pub fiscal: FiscalReport,
    pub consolidate: ConsolidateReport,
    pub event_types: BTreeMap<String, usize>,
    pub institution_types: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub local_zone: String,
    pub fetched_at: String,
    pub variant_merge: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    #[serde(skip)]
    pub events: Vec<CanonicalEvent>,
}
