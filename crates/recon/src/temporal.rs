//! Provider timestamps -> UTC instant, local instant, local date, local label.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::TimeRules;
use crate::error::ReconError;

/// The four temporal output columns. All empty when the input is missing or
/// unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTimes {
    pub utc: String,
    pub local: String,
    pub date: String,
    pub label: String,
}

impl LocalTimes {
    pub fn is_empty(&self) -> bool {
        self.utc.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TemporalNormalizer {
    zone: Tz,
    abbreviations: Vec<String>,
}

impl TemporalNormalizer {
    pub fn new(rules: &TimeRules) -> Result<Self, ReconError> {
        Ok(Self {
            zone: rules.tz()?,
            abbreviations: rules.abbreviations.clone(),
        })
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn expects_abbreviation(&self, abbr: &str) -> bool {
        self.abbreviations.iter().any(|a| a == abbr)
    }

    /// Normalize one provider timestamp.
    ///
    /// With `unconfirmed` set the provider had no time of day and stored
    /// midnight UTC. Converting that through the zone offset would move a
    /// west-of-UTC event to the previous day, so the local date is anchored to
    /// the UTC calendar date and the local instant is local midnight.
    pub fn normalize(&self, value: Option<&str>, unconfirmed: bool) -> LocalTimes {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return LocalTimes::default();
        };
        let Some(utc) = parse_instant(raw) else {
            warn!(value = %raw, "failed to parse event datetime");
            return LocalTimes::default();
        };

        if unconfirmed {
            let date = utc.date_naive();
            let midnight = date.and_time(NaiveTime::MIN);
            let local = self
                .zone
                .from_local_datetime(&midnight)
                .earliest()
                .unwrap_or_else(|| self.zone.from_utc_datetime(&midnight));
            let abbr = local.format("%Z").to_string();
            self.check_abbreviation(&abbr);
            return LocalTimes {
                utc: utc.to_rfc3339_opts(SecondsFormat::AutoSi, false),
                local: local.to_rfc3339_opts(SecondsFormat::AutoSi, false),
                date: date.format("%Y-%m-%d").to_string(),
                label: format!("00:00 {abbr}"),
            };
        }

        let local = utc.with_timezone(&self.zone);
        let abbr = local.format("%Z").to_string();
        self.check_abbreviation(&abbr);
        LocalTimes {
            utc: utc.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            local: local.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            date: local.format("%Y-%m-%d").to_string(),
            label: format!("{} {abbr}", local.format("%H:%M")),
        }
    }

    fn check_abbreviation(&self, abbr: &str) {
        if !self.expects_abbreviation(abbr) {
            warn!(zone = %self.zone, abbreviation = %abbr, "unexpected timezone abbreviation");
        }
    }
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a provider timestamp. Values without an offset are taken as UTC;
/// a bare date is midnight UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive_part = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix('z'))
        .unwrap_or(value);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive_part, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toronto() -> TemporalNormalizer {
        TemporalNormalizer::new(&TimeRules::default()).unwrap()
    }

    #[test]
    fn converts_confirmed_time_to_local() {
        let t = toronto().normalize(Some("2024-03-15T14:30:00Z"), false);
        assert_eq!(t.utc, "2024-03-15T14:30:00+00:00");
        assert_eq!(t.local, "2024-03-15T10:30:00-04:00");
        assert_eq!(t.date, "2024-03-15");
        assert_eq!(t.label, "10:30 EDT");
    }

    #[test]
    fn naive_timestamp_is_utc() {
        let t = toronto().normalize(Some("2024-01-15 00:00:00"), false);
        assert_eq!(t.utc, "2024-01-15T00:00:00+00:00");
        assert_eq!(t.local, "2024-01-14T19:00:00-05:00");
        assert_eq!(t.date, "2024-01-14");
        assert_eq!(t.label, "19:00 EST");
    }

    #[test]
    fn offset_timestamp_is_converted_to_utc() {
        let t = toronto().normalize(Some("2024-03-15T10:30:00+02:00"), false);
        assert_eq!(t.utc, "2024-03-15T08:30:00+00:00");
        assert_eq!(t.label, "04:30 EDT");
    }

    #[test]
    fn python_style_offset_is_accepted() {
        let t = toronto().normalize(Some("2024-11-20 13:00:00+00:00"), false);
        assert_eq!(t.utc, "2024-11-20T13:00:00+00:00");
        assert_eq!(t.label, "08:00 EST");
    }

    #[test]
    fn unconfirmed_midnight_keeps_utc_date_west_of_utc() {
        let t = toronto().normalize(Some("2024-03-15T00:00:00Z"), true);
        assert_eq!(t.utc, "2024-03-15T00:00:00+00:00");
        assert_eq!(t.local, "2024-03-15T00:00:00-04:00");
        assert_eq!(t.date, "2024-03-15");
        assert_eq!(t.label, "00:00 EDT");
    }

    #[test]
    fn unconfirmed_midnight_keeps_utc_date_east_of_utc() {
        let rules = TimeRules {
            zone: "Asia/Tokyo".into(),
            abbreviations: vec!["JST".into()],
            ..TimeRules::default()
        };
        let t = TemporalNormalizer::new(&rules)
            .unwrap()
            .normalize(Some("2024-03-15T00:00:00Z"), true);
        assert_eq!(t.date, "2024-03-15");
        assert_eq!(t.local, "2024-03-15T00:00:00+09:00");
        assert_eq!(t.label, "00:00 JST");
    }

    #[test]
    fn missing_or_garbage_input_yields_empty() {
        let n = toronto();
        assert_eq!(n.normalize(None, false), LocalTimes::default());
        assert_eq!(n.normalize(Some(""), true), LocalTimes::default());
        assert!(n.normalize(Some("next tuesday"), false).is_empty());
    }

    #[test]
    fn unexpected_abbreviation_still_returns_value() {
        let rules = TimeRules {
            zone: "Europe/London".into(),
            ..TimeRules::default()
        };
        let t = TemporalNormalizer::new(&rules)
            .unwrap()
            .normalize(Some("2024-01-10T09:00:00Z"), false);
        assert_eq!(t.label, "09:00 GMT");
        assert_eq!(t.date, "2024-01-10");
    }

    #[test]
    fn parse_instant_variants() {
        let expect = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-05-01T12:00:00Z"), Some(expect));
        assert_eq!(parse_instant("2024-05-01T12:00:00"), Some(expect));
        assert_eq!(parse_instant("2024-05-01 12:00"), Some(expect));
        assert_eq!(parse_instant("2024-05-01T12:00:00.000Z"), Some(expect));
        assert_eq!(parse_instant("2024-05-01T08:00:00-04:00"), Some(expect));
        assert_eq!(
            parse_instant("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_instant("05/01/2024"), None);
    }
}
