//! Variant merge: one event per (canonical ticker, category, period) when the
//! same event arrived under more than one listing.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::model::{MergeReport, PeriodKey, StagedEvent};
use crate::variants::VariantMap;

type MergeKey = (String, String, PeriodKey);

/// Ranking tuple; the greatest wins. Tickers are already normalized, so the
/// first component only separates known canonical tickers from unmapped ones.
fn score(staged: &StagedEvent, map: &VariantMap) -> (bool, u8, String) {
    (
        map.is_canonical(&staged.event.ticker),
        staged.event.completeness(),
        staged.event.event_date_time_utc.clone(),
    )
}

/// Collapse every group of more than one member to its best-scoring record,
/// whichever listing the members were fetched under. Survivors keep their
/// input order.
pub fn merge_variants(
    events: Vec<StagedEvent>,
    map: &VariantMap,
) -> (Vec<StagedEvent>, MergeReport) {
    let mut groups: BTreeMap<MergeKey, Vec<usize>> = BTreeMap::new();
    for (idx, staged) in events.iter().enumerate() {
        let key = (
            staged.event.ticker.clone(),
            staged.event.event_type.clone(),
            staged.event.period_key(),
        );
        groups.entry(key).or_default().push(idx);
    }

    let mut report = MergeReport::default();
    let mut dropped: HashSet<usize> = HashSet::new();

    for ((ticker, category, period), members) in &groups {
        if members.len() < 2 {
            continue;
        }

        let mut winner = members[0];
        let mut best = score(&events[winner], map);
        for &idx in &members[1..] {
            let candidate = score(&events[idx], map);
            if candidate > best {
                winner = idx;
                best = candidate;
            }
        }

        debug!(
            ticker = %ticker,
            category = %category,
            period = ?period,
            kept_source = %events[winner].provenance.source_ticker,
            dropped = members.len() - 1,
            "merged variant group"
        );
        report.groups_merged += 1;
        report.dropped += members.len() - 1;
        dropped.extend(members.iter().copied().filter(|&i| i != winner));
    }

    let merged: Vec<StagedEvent> = events
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, staged)| staged)
        .collect();

    if report.dropped > 0 {
        info!(
            groups = report.groups_merged,
            dropped = report.dropped,
            "merged ticker-variant duplicates"
        );
    }
    (merged, report)
}
