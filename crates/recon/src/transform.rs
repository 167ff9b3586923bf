use crate::model::{CanonicalEvent, InstitutionTable, LastModified, Provenance, RawEvent, StagedEvent};
use crate::temporal::{parse_instant, TemporalNormalizer};
use crate::variants::TickerNormalizer;

const UNKNOWN: &str = "Unknown";
const TIME_TBD: &str = " (Time TBD)";

/// Turns provider records into staged canonical events.
pub struct Transformer<'a> {
    pub institutions: &'a InstitutionTable,
    pub tickers: TickerNormalizer<'a>,
    pub temporal: &'a TemporalNormalizer,
    /// Market-time code that marks a record as having no confirmed time of day.
    pub unconfirmed_code: &'a str,
    /// Run timestamp, stamped on every output row.
    pub fetched_at: String,
}

impl Transformer<'_> {
    pub fn transform_all(&self, raw: &[RawEvent]) -> Vec<StagedEvent> {
        raw.iter()
            .enumerate()
            .map(|(record, event)| self.transform(record, event))
            .collect()
    }

    pub fn transform(&self, record: usize, raw: &RawEvent) -> StagedEvent {
        let source_ticker = raw.ticker.trim().to_string();
        let ticker = self.tickers.normalize(&source_ticker);

        let mut description = text(&raw.description);
        if ticker != source_ticker && !source_ticker.is_empty() {
            description = description.replace(&source_ticker, &ticker);
        }

        let time_unconfirmed = raw
            .market_time_code
            .as_deref()
            .is_some_and(|code| code.trim() == self.unconfirmed_code);
        let times = self
            .temporal
            .normalize(raw.event_date_time.as_deref(), time_unconfirmed);

        let headline = if time_unconfirmed {
            format!("{description}{TIME_TBD}")
        } else {
            description
        };

        let institution = self.institutions.get(&ticker);
        let event = CanonicalEvent {
            institution_name: institution
                .map_or_else(|| UNKNOWN.to_string(), |i| i.name.clone()),
            institution_id: institution.map(|i| i.id.clone()).unwrap_or_default(),
            institution_type: institution
                .map_or_else(|| UNKNOWN.to_string(), |i| i.kind.clone()),
            ticker,
            event_type: raw.event_type.trim().to_string(),
            event_headline: headline,
            event_date_time_utc: times.utc,
            event_date_time_local: times.local,
            event_date: times.date,
            event_time_local: times.label,
            webcast_link: text(&raw.webcast_link),
            contact_info: contact_info(raw),
            fiscal_year: fiscal_year(raw.fiscal_year.as_deref()),
            fiscal_period: present(raw.fiscal_period.as_deref()),
            data_fetched_timestamp: self.fetched_at.clone(),
        };

        let last_modified = text(&raw.last_modified_date);
        StagedEvent {
            event,
            provenance: Provenance {
                record,
                event_id: text(&raw.event_id),
                source_ticker,
                last_modified: LastModified {
                    parsed: parse_instant(&last_modified),
                    raw: last_modified,
                },
                time_unconfirmed,
            },
        }
    }
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `0` / `0.0` mean "no fiscal year" at the provider.
fn fiscal_year(value: Option<&str>) -> Option<String> {
    present(value).filter(|v| v != "0" && v != "0.0")
}

/// `Contact: <name> | Phone: <phone> | Email: <email>`, present parts only.
pub fn contact_info(raw: &RawEvent) -> String {
    let parts = [
        ("Contact: ", &raw.contact_name),
        ("Phone: ", &raw.contact_phone),
        ("Email: ", &raw.contact_email),
    ];
    parts
        .iter()
        .filter_map(|(label, value)| present(value.as_deref()).map(|v| format!("{label}{v}")))
        .collect::<Vec<_>>()
        .join(" | ")
}
