// Processed events: the fixed output schema consumed by the destination store

use std::path::Path;

use calsync_recon::{CanonicalEvent, OUTPUT_COLUMNS};
use tracing::{info, warn};

use crate::error::IoError;
use crate::raw::{create_writer, read_input};

/// Write events with exactly the output columns, in order.
pub fn write_processed(path: &Path, events: &[CanonicalEvent]) -> Result<usize, IoError> {
    if events.is_empty() {
        warn!(path = %path.display(), "no processed events to save");
    }
    let mut writer = create_writer(path)?;
    let csv_err = |e: csv::Error| IoError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    // Written explicitly so an empty file still carries the header.
    writer.write_record(OUTPUT_COLUMNS).map_err(csv_err)?;
    for event in events {
        writer
            .write_record([
                event.ticker.as_str(),
                &event.institution_name,
                &event.institution_id,
                &event.institution_type,
                &event.event_type,
                &event.event_headline,
                &event.event_date_time_utc,
                &event.event_date_time_local,
                &event.event_date,
                &event.event_time_local,
                &event.webcast_link,
                &event.contact_info,
                event.fiscal_year.as_deref().unwrap_or_default(),
                event.fiscal_period.as_deref().unwrap_or_default(),
                &event.data_fetched_timestamp,
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), events = events.len(), "saved processed events");
    Ok(events.len())
}

/// Read a processed file back. The header must match the output columns.
pub fn read_processed(path: &Path) -> Result<Vec<CanonicalEvent>, IoError> {
    let data = read_input(path)?;
    let csv_err = |message: String| IoError::Csv {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let headers = reader.headers().map_err(|e| csv_err(e.to_string()))?;
    let missing: Vec<&str> = OUTPUT_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(csv_err(format!("missing columns: {}", missing.join(", "))));
    }

    let mut events = Vec::new();
    for row in reader.deserialize::<CanonicalEvent>() {
        let mut event = row.map_err(|e| csv_err(e.to_string()))?;
        event.fiscal_year = event.fiscal_year.filter(|v| !v.is_empty());
        event.fiscal_period = event.fiscal_period.filter(|v| !v.is_empty());
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            ticker: "RY-CA".into(),
            institution_name: "Royal Bank of Canada".into(),
            institution_id: "1".into(),
            institution_type: "Canadian_Banks".into(),
            event_type: "Earnings".into(),
            event_headline: "RY-CA Q1 2024 Earnings Call".into(),
            event_date_time_utc: "2024-02-28T11:30:00+00:00".into(),
            event_date_time_local: "2024-02-28T06:30:00-05:00".into(),
            event_date: "2024-02-28".into(),
            event_time_local: "06:30 EST".into(),
            webcast_link: String::new(),
            contact_info: "Contact: IR | Email: ir@example.com".into(),
            fiscal_year: Some("2024".into()),
            fiscal_period: None,
            data_fetched_timestamp: "2024-02-01T09:30:00+00:00".into(),
        }
    }

    #[test]
    fn header_is_output_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.csv");
        write_processed(&path, &[event()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), OUTPUT_COLUMNS.join(","));
    }

    #[test]
    fn empty_output_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.csv");
        write_processed(&path, &[]).unwrap();
        assert!(read_processed(&path).unwrap().is_empty());
    }

    #[test]
    fn read_back_preserves_absent_fiscal_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.csv");
        write_processed(&path, &[event()]).unwrap();
        let back = read_processed(&path).unwrap();
        assert_eq!(back, vec![event()]);
    }

    #[test]
    fn read_rejects_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "ticker,amount\nRY-CA,1\n").unwrap();
        let err = read_processed(&path).unwrap_err();
        assert!(err.to_string().contains("institution_name"));
    }
}
