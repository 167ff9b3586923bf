//! Fiscal-period resolver for earnings events.
//!
//! A bank reports each fiscal quarter once. When the provider returns several
//! earnings events for one (ticker, fiscal year, fiscal period), one is kept:
//!
//! 1. all dates in one calendar month: the most recently modified record wins;
//! 2. dates in different months: the month most other banks report that
//!    period in (peer consensus) decides;
//! 3. no peer data, or no member in the consensus month: back to (1).

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::model::{FiscalReport, StagedEvent};

/// `(fiscal year, fiscal period)` -> `YYYY-MM` -> number of peer events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerIndex {
    months: BTreeMap<(String, String), BTreeMap<String, usize>>,
}

impl PeerIndex {
    /// Count earnings events per month and fiscal period, skipping `exclude_ticker`.
    pub fn build<'a>(
        earnings: impl IntoIterator<Item = &'a StagedEvent>,
        exclude_ticker: &str,
    ) -> Self {
        let mut index = Self::default();
        for staged in earnings {
            let event = &staged.event;
            if event.ticker == exclude_ticker {
                continue;
            }
            let (Some((year, period)), Some(month)) = (event.fiscal_key(), event.month()) else {
                continue;
            };
            *index
                .months
                .entry((year.to_string(), period.to_string()))
                .or_default()
                .entry(month.to_string())
                .or_default() += 1;
        }
        index
    }

    /// Month with the most peers for the period. Equal counts go to the earliest month.
    pub fn consensus(&self, year: &str, period: &str) -> Option<(&str, usize)> {
        let months = self.months.get(&(year.to_string(), period.to_string()))?;
        let mut best: Option<(&str, usize)> = None;
        for (month, &count) in months {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((month.as_str(), count));
            }
        }
        best
    }
}

/// Index of the most recently modified member. Equal stamps keep the earlier member.
fn most_recent(events: &[StagedEvent], members: &[usize]) -> usize {
    let mut winner = members[0];
    for &idx in &members[1..] {
        if events[idx].provenance.last_modified > events[winner].provenance.last_modified {
            winner = idx;
        }
    }
    winner
}

pub fn resolve_fiscal_periods(
    events: Vec<StagedEvent>,
    earnings_category: &str,
) -> (Vec<StagedEvent>, FiscalReport) {
    let mut report = FiscalReport::default();

    let mut groups: BTreeMap<(&str, &str, &str), Vec<usize>> = BTreeMap::new();
    for (idx, staged) in events.iter().enumerate() {
        if staged.event.event_type != earnings_category {
            continue;
        }
        if let Some((year, period)) = staged.event.fiscal_key() {
            groups
                .entry((staged.event.ticker.as_str(), year, period))
                .or_default()
                .push(idx);
        }
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for ((ticker, year, period), members) in &groups {
        if members.len() < 2 {
            continue;
        }

        let months: HashSet<&str> = members.iter().filter_map(|&i| events[i].event.month()).collect();

        let mut method = "last_modified";
        let winner = if months.len() <= 1 {
            most_recent(&events, members)
        } else {
            let earnings = events.iter().filter(|s| s.event.event_type == earnings_category);
            let peers = PeerIndex::build(earnings, ticker);
            let by_peers = peers.consensus(year, period).and_then(|(month, count)| {
                members
                    .iter()
                    .copied()
                    .find(|&i| events[i].event.month() == Some(month))
                    .map(|i| (i, month, count))
            });
            match by_peers {
                Some((idx, month, count)) => {
                    debug!(ticker = %ticker, month = %month, peers = count, "peer consensus");
                    method = "peer_consensus";
                    report.peer_resolved += 1;
                    idx
                }
                None => {
                    method = "last_modified (peers inconclusive)";
                    most_recent(&events, members)
                }
            }
        };

        debug!(
            ticker = %ticker,
            fiscal_year = %year,
            fiscal_period = %period,
            kept = %events[winner].event.event_date,
            method,
            dropped = members.len() - 1,
            "earnings period resolved"
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
        info!(
            dropped = report.dropped,
            peer_resolved = report.peer_resolved,
            "deduplicated earnings by fiscal period"
        );
    }
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalEvent, LastModified, Provenance};
    use crate::temporal::parse_instant;

    fn earnings(ticker: &str, date: &str, modified: &str) -> StagedEvent {
        StagedEvent {
            event: CanonicalEvent {
                ticker: ticker.into(),
                event_type: "Earnings".into(),
                event_date: date.into(),
                event_date_time_utc: format!("{date}T12:00:00+00:00"),
                fiscal_year: Some("2024".into()),
                fiscal_period: Some("1".into()),
                ..CanonicalEvent::default()
            },
            provenance: Provenance {
                last_modified: LastModified {
                    parsed: parse_instant(modified),
                    raw: modified.into(),
                },
                ..Provenance::default()
            },
        }
    }

    #[test]
    fn same_month_keeps_most_recent() {
        let events = vec![
            earnings("RY-CA", "2024-02-27", "2024-01-05T00:00:00Z"),
            earnings("RY-CA", "2024-02-28", "2024-01-20T00:00:00Z"),
            earnings("RY-CA", "2024-02-26", "2024-01-10T00:00:00Z"),
        ];
        let (kept, report) = resolve_fiscal_periods(events, "Earnings");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].event.event_date, "2024-02-28");
        assert_eq!(report.dropped, 2);
        assert_eq!(report.peer_resolved, 0);
    }

    #[test]
    fn parsed_stamps_beat_text_order() {
        // Lexically the second stamp is later; as instants the first is.
        let events = vec![
            earnings("RY-CA", "2024-02-27", "2024-01-10 05:00:00"),
            earnings("RY-CA", "2024-02-28", "2024-01-10T09:00:00+08:00"),
        ];
        let (kept, _) = resolve_fiscal_periods(events, "Earnings");
        assert_eq!(kept[0].event.event_date, "2024-02-27");
    }

    #[test]
    fn cross_month_uses_peer_consensus() {
        let mut events = vec![
            earnings("TD-CA", "2024-02-29", "2024-01-01T00:00:00Z"),
            earnings("TD-CA", "2024-03-05", "2024-02-01T00:00:00Z"),
        ];
        for peer in ["RY-CA", "BMO-CA", "BNS-CA"] {
            events.push(earnings(peer, "2024-02-27", "2024-01-01T00:00:00Z"));
        }
        events.push(earnings("CM-CA", "2024-03-01", "2024-01-01T00:00:00Z"));

        let (kept, report) = resolve_fiscal_periods(events, "Earnings");
        let td: Vec<_> = kept.iter().filter(|s| s.event.ticker == "TD-CA").collect();
        assert_eq!(td.len(), 1);
        assert_eq!(td[0].event.event_date, "2024-02-29");
        assert_eq!(report.peer_resolved, 1);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn no_peers_falls_back_to_recency() {
        let events = vec![
            earnings("TD-CA", "2024-02-29", "2024-01-01T00:00:00Z"),
            earnings("TD-CA", "2024-03-05", "2024-02-01T00:00:00Z"),
        ];
        let (kept, report) = resolve_fiscal_periods(events, "Earnings");
        assert_eq!(kept[0].event.event_date, "2024-03-05");
        assert_eq!(report.peer_resolved, 0);
    }

    #[test]
    fn consensus_month_without_member_falls_back() {
        let mut events = vec![
            earnings("TD-CA", "2024-02-29", "2024-02-01T00:00:00Z"),
            earnings("TD-CA", "2024-03-05", "2024-01-01T00:00:00Z"),
        ];
        events.push(earnings("RY-CA", "2024-04-02", "2024-01-01T00:00:00Z"));
        let (kept, report) = resolve_fiscal_periods(events, "Earnings");
        let td: Vec<_> = kept.iter().filter(|s| s.event.ticker == "TD-CA").collect();
        assert_eq!(td[0].event.event_date, "2024-02-29");
        assert_eq!(report.peer_resolved, 0);
    }

    #[test]
    fn single_record_is_never_compared_with_peers() {
        let mut events = vec![earnings("NA-CA", "2024-04-10", "2024-01-01T00:00:00Z")];
        for peer in ["RY-CA", "TD-CA", "BMO-CA", "BNS-CA", "CM-CA"] {
            events.push(earnings(peer, "2024-05-28", "2024-01-01T00:00:00Z"));
        }
        let (kept, report) = resolve_fiscal_periods(events.clone(), "Earnings");
        assert_eq!(kept, events);
        assert_eq!(report, FiscalReport::default());
    }

    #[test]
    fn other_categories_and_missing_fiscal_pass_through() {
        let mut dividend = earnings("RY-CA", "2024-02-27", "");
        dividend.event.event_type = "Dividend".into();
        let mut no_fiscal = earnings("RY-CA", "2024-02-27", "");
        no_fiscal.event.fiscal_period = None;
        let events = vec![dividend.clone(), dividend, no_fiscal.clone(), no_fiscal];
        let (kept, _) = resolve_fiscal_periods(events.clone(), "Earnings");
        assert_eq!(kept, events);
    }

    #[test]
    fn peer_ties_go_to_earliest_month() {
        let events = vec![
            earnings("RY-CA", "2024-03-01", ""),
            earnings("BMO-CA", "2024-02-27", ""),
        ];
        let index = PeerIndex::build(&events, "TD-CA");
        assert_eq!(index.consensus("2024", "1"), Some(("2024-02", 1)));
        assert_eq!(PeerIndex::build(&events, "BMO-CA").consensus("2024", "1"), Some(("2024-03", 1)));
        assert_eq!(index.consensus("2024", "2"), None);
    }
}
