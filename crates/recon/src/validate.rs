use std::fmt;

use chrono::DateTime;
use tracing::warn;

use crate::model::StagedEvent;

/// Issues shown in the log; the rest are only counted.
const LOGGED_ISSUES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    MissingLocalFields,
    Unparseable,
    InstantMismatch,
    DateMismatch { date: String, expected: String },
    UnexpectedZone(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalIssue {
    pub event_id: String,
    pub kind: IssueKind,
}

impl fmt::Display for TemporalIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id: &str = if self.event_id.is_empty() { "unknown" } else { &self.event_id };
        match &self.kind {
            IssueKind::MissingLocalFields => write!(f, "{id}: missing local datetime fields"),
            IssueKind::Unparseable => write!(f, "{id}: datetime fields do not parse"),
            IssueKind::InstantMismatch => write!(f, "{id}: UTC/local mismatch"),
            IssueKind::DateMismatch { date, expected } => {
                write!(f, "{id}: date mismatch {date} vs {expected}")
            }
            IssueKind::UnexpectedZone(label) => write!(f, "{id}: unexpected zone in '{label}'"),
        }
    }
}

/// Check the temporal columns of every event that has a UTC instant. Never
/// fails; issues are logged and returned.
pub fn validate_temporal(events: &[StagedEvent], abbreviations: &[String]) -> Vec<TemporalIssue> {
    let mut issues = Vec::new();

    for staged in events {
        let event = &staged.event;
        if event.event_date_time_utc.is_empty() {
            continue;
        }
        let issue = |kind| TemporalIssue {
            event_id: staged.provenance.event_id.clone(),
            kind,
        };

        if event.event_date_time_local.is_empty()
            || event.event_date.is_empty()
            || event.event_time_local.is_empty()
        {
            issues.push(issue(IssueKind::MissingLocalFields));
            continue;
        }

        let (Ok(utc), Ok(local)) = (
            DateTime::parse_from_rfc3339(&event.event_date_time_utc),
            DateTime::parse_from_rfc3339(&event.event_date_time_local),
        ) else {
            issues.push(issue(IssueKind::Unparseable));
            continue;
        };

        // Unconfirmed times carry a fabricated local midnight.
        if !staged.provenance.time_unconfirmed && utc.timestamp() != local.timestamp() {
            issues.push(issue(IssueKind::InstantMismatch));
        }

        let expected = local.format("%Y-%m-%d").to_string();
        if event.event_date != expected {
            issues.push(issue(IssueKind::DateMismatch {
                date: event.event_date.clone(),
                expected,
            }));
        }

        if !abbreviations.iter().any(|abbr| event.event_time_local.contains(abbr.as_str())) {
            issues.push(issue(IssueKind::UnexpectedZone(event.event_time_local.clone())));
        }
    }

    if !issues.is_empty() {
        warn!(count = issues.len(), "temporal validation found issues");
        for issue in issues.iter().take(LOGGED_ISSUES) {
            warn!("  {issue}");
        }
        if issues.len() > LOGGED_ISSUES {
            warn!("  ... and {} more", issues.len() - LOGGED_ISSUES);
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalEvent, Provenance};

    fn staged(utc: &str, local: &str, date: &str, label: &str) -> StagedEvent {
        StagedEvent {
            event: CanonicalEvent {
                event_date_time_utc: utc.into(),
                event_date_time_local: local.into(),
                event_date: date.into(),
                event_time_local: label.into(),
                ..CanonicalEvent::default()
            },
            provenance: Provenance {
                event_id: "E9".into(),
                ..Provenance::default()
            },
        }
    }

    fn zones() -> Vec<String> {
        vec!["EST".into(), "EDT".into()]
    }

    #[test]
    fn consistent_event_has_no_issues() {
        let events = vec![
            staged(
                "2024-03-15T14:30:00+00:00",
                "2024-03-15T10:30:00-04:00",
                "2024-03-15",
                "10:30 EDT",
            ),
            staged("", "", "", ""),
        ];
        assert!(validate_temporal(&events, &zones()).is_empty());
    }

    #[test]
    fn reports_each_kind() {
        let events = vec![
            staged("2024-03-15T14:30:00+00:00", "", "2024-03-15", "10:30 EDT"),
            staged(
                "2024-03-15T14:30:00+00:00",
                "2024-03-15T11:30:00-04:00",
                "2024-03-16",
                "11:30 GMT",
            ),
        ];
        let kinds: Vec<IssueKind> = validate_temporal(&events, &zones())
            .into_iter()
            .map(|i| i.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::MissingLocalFields,
                IssueKind::InstantMismatch,
                IssueKind::DateMismatch {
                    date: "2024-03-16".into(),
                    expected: "2024-03-15".into()
                },
                IssueKind::UnexpectedZone("11:30 GMT".into()),
            ]
        );
    }

    #[test]
    fn unconfirmed_midnight_is_not_a_mismatch() {
        let mut event = staged(
            "2024-03-15T00:00:00+00:00",
            "2024-03-15T00:00:00-04:00",
            "2024-03-15",
            "00:00 EDT",
        );
        event.provenance.time_unconfirmed = true;
        assert!(validate_temporal(&[event], &zones()).is_empty());
    }

    #[test]
    fn display_names_the_event() {
        let issue = TemporalIssue {
            event_id: String::new(),
            kind: IssueKind::InstantMismatch,
        };
        assert_eq!(issue.to_string(), "unknown: UTC/local mismatch");
    }
}
