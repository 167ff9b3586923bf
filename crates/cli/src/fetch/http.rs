//! HTTP event source: one POST per chunk to a calendar-events endpoint.
//!
//! Request body:
//!
//! ```json
//! {"data": {"dateTime": {"start": "2024-02-01T00:00:00Z", "end": "2024-02-29T23:59:59Z"},
//!           "universe": {"symbols": ["RY-CA", "RY-US"], "type": "Tickers"}}}
//! ```
//!
//! The response's `data` array holds one object per event, keyed by the
//! provider column names of the rule set's field mapping.

use std::time::Duration;

use calsync_io::{EventSource, FetchError, QueryWindow};
use calsync_recon::config::FieldMapping;
use calsync_recon::RawEvent;
use serde_json::Value;
use tracing::debug;

const USER_AGENT: &str = concat!("calsync/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const USERNAME_ENV: &str = "CALSYNC_API_USERNAME";
pub const PASSWORD_ENV: &str = "CALSYNC_API_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Credentials come from the environment only. Both variables or neither.
pub fn credentials_from_env() -> Result<Option<Credentials>, FetchError> {
    let username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty());
    let password = std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty());
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
        (None, None) => Ok(None),
        _ => Err(FetchError::Fatal(format!(
            "set both {USERNAME_ENV} and {PASSWORD_ENV}, or neither"
        ))),
    }
}

pub struct HttpSource {
    http: reqwest::blocking::Client,
    url: String,
    credentials: Option<Credentials>,
    fields: FieldMapping,
}

impl HttpSource {
    pub fn new(
        url: &str,
        credentials: Option<Credentials>,
        fields: FieldMapping,
    ) -> Result<Self, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::Fatal(format!("unsupported source URL: {url}")));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Fatal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
            credentials,
            fields,
        })
    }

    fn request_body(tickers: &[String], window: &QueryWindow) -> Value {
        serde_json::json!({
            "data": {
                "dateTime": {
                    "start": format!("{}T00:00:00Z", window.start),
                    "end": format!("{}T23:59:59Z", window.end),
                },
                "universe": {
                    "symbols": tickers,
                    "type": "Tickers",
                },
            }
        })
    }

    fn to_raw(&self, object: &serde_json::Map<String, Value>) -> RawEvent {
        let field = |name: &str| object.get(name).and_then(cell);
        let f = &self.fields;
        RawEvent {
            event_id: field(&f.event_id),
            ticker: field(&f.ticker).unwrap_or_default(),
            event_type: field(&f.event_type).unwrap_or_default(),
            event_date_time: field(&f.event_date_time),
            description: field(&f.description),
            webcast_link: field(&f.webcast_link),
            contact_name: field(&f.contact_name),
            contact_phone: field(&f.contact_phone),
            contact_email: field(&f.contact_email),
            fiscal_year: field(&f.fiscal_year),
            fiscal_period: field(&f.fiscal_period),
            market_time_code: field(&f.market_time_code),
            last_modified_date: field(&f.last_modified_date),
        }
    }
}

/// Scalar JSON value as trimmed text. Null and empty strings are absent.
fn cell(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Retryable(err.to_string())
    } else {
        FetchError::classify(err.to_string())
    }
}

impl EventSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, tickers: &[String], window: &QueryWindow) -> Result<Vec<RawEvent>, FetchError> {
        let mut request = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(tickers, window));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        let text = response.text().map_err(transport_error)?;

        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            let message = format!("HTTP {}: {snippet}", status.as_u16());
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                FetchError::Retryable(message)
            } else {
                FetchError::classify(message)
            });
        }

        let body: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| FetchError::Fatal(format!("invalid JSON response: {e}")))?;
        let events: Vec<RawEvent> = match &body["data"] {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_object)
                .map(|object| self.to_raw(object))
                .collect(),
            Value::Null => Vec::new(),
            _ => return Err(FetchError::Fatal("response `data` is not an array".into())),
        };
        debug!(start = %window.start, end = %window.end, events = events.len(), "http chunk");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_io::{fetch_events, RetryPolicy};
    use chrono::NaiveDate;
    use httpmock::prelude::*;

    fn window() -> QueryWindow {
        QueryWindow {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        }
    }

    #[test]
    fn request_body_shape() {
        let body = HttpSource::request_body(&["RY-CA".into(), "RY-US".into()], &window());
        assert_eq!(body["data"]["dateTime"]["start"], "2024-02-01T00:00:00Z");
        assert_eq!(body["data"]["dateTime"]["end"], "2024-02-29T23:59:59Z");
        assert_eq!(body["data"]["universe"]["symbols"][1], "RY-US");
        assert_eq!(body["data"]["universe"]["type"], "Tickers");
    }

    #[test]
    fn maps_response_objects_through_field_mapping() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/calendar-events")
                .header("content-type", "application/json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "data": [{
                        "event_id": "E1",
                        "ticker": "RY-CA",
                        "event_type": "Earnings",
                        "event_date_time": "2024-02-28T11:30:00Z",
                        "fiscal_year": 2024,
                        "fiscal_period": 1,
                        "webcast_link": "",
                        "contact_name": null
                    }]
                }));
        });

        let source = HttpSource::new(
            &format!("{}/calendar-events", server.base_url()),
            None,
            FieldMapping::default(),
        )
        .unwrap();
        let events = source.fetch(&["RY-CA".into()], &window()).unwrap();

        mock.assert();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id.as_deref(), Some("E1"));
        assert_eq!(events[0].fiscal_year.as_deref(), Some("2024"));
        assert_eq!(events[0].fiscal_period.as_deref(), Some("1"));
        assert_eq!(events[0].webcast_link, None);
        assert_eq!(events[0].contact_name, None);
    }

    #[test]
    fn server_errors_are_retried_then_swallowed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/calendar-events");
            then.status(503).body("Service Unavailable");
        });

        let source = HttpSource::new(
            &format!("{}/calendar-events", server.base_url()),
            None,
            FieldMapping::default(),
        )
        .unwrap();
        let (events, report) =
            fetch_events(&source, &["RY-CA".into()], &window(), &RetryPolicy::immediate());

        assert!(events.is_empty());
        assert_eq!(report.failed_chunks, 1);
        mock.assert_calls(5);
    }

    #[test]
    fn auth_failure_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/calendar-events");
            then.status(401).body("Unauthorized");
        });

        let source = HttpSource::new(
            &format!("{}/calendar-events", server.base_url()),
            Some(Credentials {
                username: "user".into(),
                password: "secret".into(),
            }),
            FieldMapping::default(),
        )
        .unwrap();
        let err = source.fetch(&["RY-CA".into()], &window()).unwrap_err();

        assert!(!err.is_retryable());
        mock.assert_calls(1);
    }

    #[test]
    fn error_body_is_truncated_on_char_boundary() {
        let server = MockServer::start();
        let body = format!("{}é…", "a".repeat(199));
        let mock = server.mock(|when, then| {
            when.method(POST).path("/calendar-events");
            then.status(400).body(&body);
        });

        let source = HttpSource::new(
            &format!("{}/calendar-events", server.base_url()),
            None,
            FieldMapping::default(),
        )
        .unwrap();
        let err = source.fetch(&["RY-CA".into()], &window()).unwrap_err();
        let FetchError::Fatal(message) = &err else {
            panic!("expected a fatal error, got {err:?}");
        };
        assert!(message.starts_with("HTTP 400: aaa"));
        assert!(message.ends_with("aé"));

        // One bad chunk fails alone instead of aborting the fetch
        let (events, report) =
            fetch_events(&source, &["RY-CA".into()], &window(), &RetryPolicy::immediate());
        assert!(events.is_empty());
        assert_eq!(report.failed_chunks, 1);
        mock.assert_calls(2);
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpSource::new("ftp://example.com", None, FieldMapping::default()).is_err());
    }
}
