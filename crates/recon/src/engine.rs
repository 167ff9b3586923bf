use chrono::SecondsFormat;
use tracing::{debug, info};

use crate::config::{FieldMapping, RuleSet};
use crate::consolidate::consolidate;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::filter::filter_categories;
use crate::fiscal::resolve_fiscal_periods;
use crate::merge::merge_variants;
use crate::model::{MergeReport, RawEvent, ReconInput, ReconMeta, ReconResult};
use crate::same_instant::resolve_same_instant;
use crate::temporal::TemporalNormalizer;
use crate::transform::Transformer;
use crate::validate::validate_temporal;
use crate::variants::TickerNormalizer;

/// Run the reconciliation pipeline. Pure: the same rules and input always
/// produce the same result.
///
/// Transform -> variant merge (only with a variant map) -> category filter ->
/// same-instant -> fiscal period -> consolidation -> sort by UTC instant.
pub fn run(rules: &RuleSet, input: &ReconInput) -> Result<ReconResult, ReconError> {
    rules.validate()?;
    let temporal = TemporalNormalizer::new(&rules.time)?;
    let tickers = match &input.variants {
        Some(map) => TickerNormalizer::Variants(map),
        None => TickerNormalizer::SuffixRewrite(&rules.variants),
    };
    let fetched_at = input.fetched_at.to_rfc3339_opts(SecondsFormat::AutoSi, false);

    let transformer = Transformer {
        institutions: &input.institutions,
        tickers,
        temporal: &temporal,
        unconfirmed_code: &rules.time.unconfirmed_code,
        fetched_at: fetched_at.clone(),
    };
    let events = transformer.transform_all(&input.raw);
    info!(
        raw = input.raw.len(),
        institutions = input.institutions.len(),
        "transformed raw events"
    );

    let temporal_issues = validate_temporal(&events, &rules.time.abbreviations).len();

    let (events, merge) = match &input.variants {
        Some(map) => merge_variants(events, map),
        None => (events, MergeReport::default()),
    };

    let (events, filter) = filter_categories(events, &rules.categories);
    info!(events = events.len(), "after category filter");

    let (events, same_instant) =
        resolve_same_instant(events, &rules.categories.same_instant_priority);
    let (events, fiscal) = resolve_fiscal_periods(events, &rules.categories.earnings);
    let (mut events, consolidation) = consolidate(events, &rules.categories);

    // Stable: equal instants keep pipeline order; empty instants sort first.
    events.sort_by(|a, b| a.event.event_date_time_utc.cmp(&b.event.event_date_time_utc));
    let events: Vec<_> = events.into_iter().map(|staged| staged.event).collect();
    info!(events = events.len(), "reconciliation complete");

    let mut summary = compute_summary(&events);
    summary.raw_events = input.raw.len();
    summary.temporal_issues = temporal_issues;
    summary.merge = merge;
    summary.filter = filter;
    summary.same_instant = same_instant;
    summary.fiscal = fiscal;
    summary.consolidate = consolidation;
    debug!(event_types = ?summary.event_types, "output categories");

    Ok(ReconResult {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            local_zone: rules.time.zone.clone(),
            fetched_at,
            variant_merge: input.variants.is_some(),
        },
        summary,
        events,
    })
}

/// Load provider CSV rows through the column mapping.
///
/// `ticker`, `event_type` and `event_date_time` columns are required; any
/// other mapped column may be absent. Empty cells load as `None`.
pub fn load_raw_events(csv_data: &str, fields: &FieldMapping) -> Result<Vec<RawEvent>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| -> Result<usize, ReconError> {
        position(name).ok_or_else(|| ReconError::MissingColumn {
            column: name.into(),
        })
    };

    let ticker_idx = required(fields.ticker.as_str())?;
    let event_type_idx = required(fields.event_type.as_str())?;
    let date_time_idx = required(fields.event_date_time.as_str())?;
    let event_id_idx = position(fields.event_id.as_str());
    let description_idx = position(fields.description.as_str());
    let webcast_idx = position(fields.webcast_link.as_str());
    let contact_name_idx = position(fields.contact_name.as_str());
    let contact_phone_idx = position(fields.contact_phone.as_str());
    let contact_email_idx = position(fields.contact_email.as_str());
    let fiscal_year_idx = position(fields.fiscal_year.as_str());
    let fiscal_period_idx = position(fields.fiscal_period.as_str());
    let market_time_idx = position(fields.market_time_code.as_str());
    let modified_idx = position(fields.last_modified_date.as_str());

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::Csv(e.to_string()))?;
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        events.push(RawEvent {
            event_id: cell(event_id_idx),
            ticker: cell(Some(ticker_idx)).unwrap_or_default(),
            event_type: cell(Some(event_type_idx)).unwrap_or_default(),
            event_date_time: cell(Some(date_time_idx)),
            description: cell(description_idx),
            webcast_link: cell(webcast_idx),
            contact_name: cell(contact_name_idx),
            contact_phone: cell(contact_phone_idx),
            contact_email: cell(contact_email_idx),
            fiscal_year: cell(fiscal_year_idx),
            fiscal_period: cell(fiscal_period_idx),
            market_time_code: cell(market_time_idx),
            last_modified_date: cell(modified_idx),
        });
    }

    Ok(events)
}
