// Raw provider events as CSV, in the provider's own column names

use std::fs;
use std::path::Path;

use calsync_recon::config::FieldMapping;
use calsync_recon::{load_raw_events, RawEvent};
use tracing::{info, warn};

use crate::error::IoError;

pub fn read_raw(path: &Path, fields: &FieldMapping) -> Result<Vec<RawEvent>, IoError> {
    let data = read_input(path)?;
    let events = load_raw_events(&data, fields)?;
    info!(path = %path.display(), events = events.len(), "loaded raw events");
    Ok(events)
}

/// Write raw events with the mapped source column names. Returns the row count.
pub fn write_raw(path: &Path, events: &[RawEvent], fields: &FieldMapping) -> Result<usize, IoError> {
    if events.is_empty() {
        warn!(path = %path.display(), "no raw events to save");
    }
    let mut writer = create_writer(path)?;
    let csv_err = |e: csv::Error| IoError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let header = [
        &fields.event_id,
        &fields.ticker,
        &fields.event_type,
        &fields.event_date_time,
        &fields.description,
        &fields.webcast_link,
        &fields.contact_name,
        &fields.contact_phone,
        &fields.contact_email,
        &fields.fiscal_year,
        &fields.fiscal_period,
        &fields.market_time_code,
        &fields.last_modified_date,
    ];
    writer.write_record(header).map_err(csv_err)?;

    for e in events {
        let cell = |v: &Option<String>| v.clone().unwrap_or_default();
        writer
            .write_record([
                cell(&e.event_id),
                e.ticker.clone(),
                e.event_type.clone(),
                cell(&e.event_date_time),
                cell(&e.description),
                cell(&e.webcast_link),
                cell(&e.contact_name),
                cell(&e.contact_phone),
                cell(&e.contact_email),
                cell(&e.fiscal_year),
                cell(&e.fiscal_period),
                cell(&e.market_time_code),
                cell(&e.last_modified_date),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(events.len())
}

pub(crate) fn read_input(path: &Path) -> Result<String, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>, IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| IoError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = fs::File::create(path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Writer::from_writer(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_with_custom_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/raw.csv");
        let fields = FieldMapping {
            event_date_time: "event_datetime_utc".into(),
            ..FieldMapping::default()
        };
        let events = vec![RawEvent {
            ticker: "RY-US".into(),
            event_type: "Earnings".into(),
            event_date_time: Some("2024-02-28T11:30:00Z".into()),
            description: Some("RY-US, Q1 \"2024\"".into()),
            ..RawEvent::default()
        }];

        assert_eq!(write_raw(&path, &events, &fields).unwrap(), 1);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("event_id,ticker,event_type,event_datetime_utc,"));

        let back = read_raw(&path, &fields).unwrap();
        assert_eq!(back, events);
    }

    #[test]
    fn missing_input_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_raw(&dir.path().join("absent.csv"), &FieldMapping::default()).unwrap_err();
        assert!(matches!(err, IoError::NotFound(_)));
    }
}
