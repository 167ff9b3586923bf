use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use crate::model::{SameInstantReport, StagedEvent};

/// Collapse events of prioritized categories that share a ticker and exact UTC
/// instant, keeping the highest-priority (lowest index) category. Categories
/// not in `priority` pass through untouched.
pub fn resolve_same_instant(
    events: Vec<StagedEvent>,
    priority: &[String],
) -> (Vec<StagedEvent>, SameInstantReport) {
    let mut report = SameInstantReport::default();
    if priority.is_empty() {
        return (events, report);
    }

    let rank: HashMap<&str, usize> = priority
        .iter()
        .enumerate()
        .map(|(i, category)| (category.as_str(), i))
        .collect();

    let mut groups: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
    for (idx, staged) in events.iter().enumerate() {
        if rank.contains_key(staged.event.event_type.as_str()) {
            let key = (
                staged.event.ticker.as_str(),
                staged.event.event_date_time_utc.as_str(),
            );
            groups.entry(key).or_default().push(idx);
        }
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for ((ticker, instant), members) in &groups {
        if members.len() < 2 {
            continue;
        }
        // min_by_key keeps the first of equal ranks
        let Some(&winner) = members
            .iter()
            .min_by_key(|&&i| rank[events[i].event.event_type.as_str()])
        else {
            continue;
        };
        debug!(
            ticker = %ticker,
            instant = %instant,
            kept = %events[winner].event.event_type,
            dropped = members.len() - 1,
            "same-instant group resolved"
        );
        dropped.extend(members.iter().copied().filter(|&i| i != winner));
    }
    report.dropped = dropped.len();

    let kept: Vec<StagedEvent> = events
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, staged)| staged)
        .collect();

    if report.dropped > 0 {
        info!(dropped = report.dropped, "merged events with identical ticker and instant");
    }
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CanonicalEvent;

    fn staged(ticker: &str, category: &str, utc: &str) -> StagedEvent {
        StagedEvent {
            event: CanonicalEvent {
                ticker: ticker.into(),
                event_type: category.into(),
                event_date_time_utc: utc.into(),
                ..CanonicalEvent::default()
            },
            provenance: Default::default(),
        }
    }

    fn priority() -> Vec<String> {
        ["Earnings", "ConfirmedEarningsRelease", "ProjectedEarningsRelease"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn highest_priority_survives() {
        let at = "2024-02-27T11:00:00+00:00";
        let events = vec![
            staged("BMO-CA", "ProjectedEarningsRelease", at),
            staged("BMO-CA", "Earnings", at),
            staged("BMO-CA", "ConfirmedEarningsRelease", at),
        ];
        let (kept, report) = resolve_same_instant(events, &priority());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].event.event_type, "Earnings");
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn unlisted_categories_and_other_instants_pass_through() {
        let at = "2024-02-27T11:00:00+00:00";
        let events = vec![
            staged("BMO-CA", "Earnings", at),
            staged("BMO-CA", "Dividend", at),
            staged("BMO-CA", "ConfirmedEarningsRelease", "2024-02-27T12:00:00+00:00"),
            staged("TD-CA", "ConfirmedEarningsRelease", at),
        ];
        let (kept, report) = resolve_same_instant(events.clone(), &priority());
        assert_eq!(kept, events);
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn empty_priority_is_noop() {
        let at = "2024-02-27T11:00:00+00:00";
        let events = vec![staged("BMO-CA", "Earnings", at), staged("BMO-CA", "Earnings", at)];
        let (kept, _) = resolve_same_instant(events.clone(), &[]);
        assert_eq!(kept, events);
    }
}
