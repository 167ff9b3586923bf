use std::collections::BTreeMap;

use crate::model::{CanonicalEvent, ReconSummary};

/// Category counts, institution-type counts and local date range of the output.
/// Stage counters are filled in by the engine.
pub fn compute_summary(events: &[CanonicalEvent]) -> ReconSummary {
    let mut event_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut institution_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut first_date: Option<&str> = None;
    let mut last_date: Option<&str> = None;

    for e in events {
        *event_types.entry(e.event_type.clone()).or_insert(0) += 1;
        *institution_types.entry(e.institution_type.clone()).or_insert(0) += 1;

        if !e.event_date.is_empty() {
            let date = e.event_date.as_str();
            first_date = Some(first_date.map_or(date, |d| d.min(date)));
            last_date = Some(last_date.map_or(date, |d| d.max(date)));
        }
    }

    ReconSummary {
        output_events: events.len(),
        event_types,
        institution_types,
        first_date: first_date.map(str::to_string),
        last_date: last_date.map(str::to_string),
        ..ReconSummary::default()
    }
}
