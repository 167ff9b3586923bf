use tracing::{info, warn};

use crate::config::CategoryRules;
use crate::model::{FilterReport, StagedEvent};

/// Keep allow-listed categories. Deny-listed and unknown categories are
/// dropped and counted separately.
pub fn filter_categories(
    events: Vec<StagedEvent>,
    rules: &CategoryRules,
) -> (Vec<StagedEvent>, FilterReport) {
    let allowed = rules.allowed();
    let mut report = FilterReport::default();
    let mut kept = Vec::with_capacity(events.len());

    for staged in events {
        let category = staged.event.event_type.as_str();
        if rules.excluded.iter().any(|e| e == category) {
            *report.excluded.entry(category.to_string()).or_default() += 1;
        } else if allowed.contains(category) {
            kept.push(staged);
        } else {
            *report.unknown.entry(category.to_string()).or_default() += 1;
        }
    }
    report.kept = kept.len();

    if !report.excluded.is_empty() {
        info!(counts = ?report.excluded, "filtered out excluded categories");
    }
    if !report.unknown.is_empty() {
        warn!(counts = ?report.unknown, "filtered out unknown categories");
    }

    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CanonicalEvent;

    fn staged(category: &str) -> StagedEvent {
        StagedEvent {
            event: CanonicalEvent {
                ticker: "RY-CA".into(),
                event_type: category.into(),
                ..CanonicalEvent::default()
            },
            provenance: Default::default(),
        }
    }

    #[test]
    fn splits_excluded_from_unknown() {
        let events = vec![
            staged("Earnings"),
            staged("ProjectedEarningsRelease"),
            staged("ProjectedEarningsRelease"),
            staged("Webinar"),
            staged("SalesRevenueCall"),
            staged("Dividend"),
        ];
        let (kept, report) = filter_categories(events, &CategoryRules::default());
        let kept: Vec<&str> = kept.iter().map(|s| s.event.event_type.as_str()).collect();
        assert_eq!(kept, vec!["Earnings", "SalesRevenueCall", "Dividend"]);
        assert_eq!(report.kept, 3);
        assert_eq!(report.excluded["ProjectedEarningsRelease"], 2);
        assert_eq!(report.unknown["Webinar"], 1);
    }

    #[test]
    fn dedup_sources_are_allowed() {
        let mut rules = CategoryRules::default();
        rules.dedup.insert("Call".into(), vec!["EarningsCall".into()]);
        let (kept, report) = filter_categories(vec![staged("EarningsCall")], &rules);
        assert_eq!(kept.len(), 1);
        assert!(report.unknown.is_empty());
    }

    #[test]
    fn deny_list_beats_dedup_listing() {
        let mut rules = CategoryRules::default();
        rules
            .dedup
            .insert("Earnings".into(), vec!["ConfirmedEarningsRelease".into()]);
        let (kept, report) = filter_categories(vec![staged("ConfirmedEarningsRelease")], &rules);
        assert!(kept.is_empty());
        assert_eq!(report.excluded["ConfirmedEarningsRelease"], 1);
    }
}
