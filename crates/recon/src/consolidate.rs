use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::config::CategoryRules;
use crate::model::{ConsolidateReport, PeriodKey, StagedEvent};

/// Apply the dedup and rename tables.
///
/// Dedup-covered records group by (target, ticker, period) and the member with
/// the lowest source index survives, relabeled to the target. Rename-covered
/// records are relabeled in place.
pub fn consolidate(
    mut events: Vec<StagedEvent>,
    rules: &CategoryRules,
) -> (Vec<StagedEvent>, ConsolidateReport) {
    let lookup = rules.dedup_lookup();
    let mut report = ConsolidateReport::default();

    let mut groups: BTreeMap<(String, String, PeriodKey), Vec<(usize, usize)>> = BTreeMap::new();
    for (idx, staged) in events.iter().enumerate() {
        if let Some(&(target, priority)) = lookup.get(staged.event.event_type.as_str()) {
            let key = (
                target.to_string(),
                staged.event.ticker.clone(),
                staged.event.period_key(),
            );
            groups.entry(key).or_default().push((priority, idx));
        }
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    let mut relabel: Vec<(usize, String)> = Vec::new();
    for ((target, ticker, _), members) in &groups {
        let Some(&(_, winner)) = members.iter().min_by_key(|(priority, _)| *priority) else {
            continue;
        };
        if members.len() > 1 {
            debug!(
                ticker = %ticker,
                target = %target,
                kept = %events[winner].event.event_type,
                dropped = members.len() - 1,
                "consolidated duplicate group"
            );
        }
        dropped.extend(members.iter().map(|&(_, i)| i).filter(|&i| i != winner));
        relabel.push((winner, target.clone()));
    }

    for staged in &mut events {
        if lookup.contains_key(staged.event.event_type.as_str()) {
            continue;
        }
        if let Some(target) = rules.rename.get(&staged.event.event_type) {
            staged.event.event_type = target.clone();
            report.renamed += 1;
        }
    }

    for (idx, target) in relabel {
        events[idx].event.event_type = target;
    }
    report.dropped = dropped.len();

    let kept: Vec<StagedEvent> = events
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, staged)| staged)
        .collect();

    if report.dropped > 0 || report.renamed > 0 {
        info!(
            dropped = report.dropped,
            renamed = report.renamed,
            "applied consolidation rules"
        );
    }
    (kept, report)
}
