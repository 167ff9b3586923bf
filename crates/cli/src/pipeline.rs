//! `calsync run`: fetch, process and upload driven by one pipeline file.
//!
//! ```toml
//! [paths]
//! snapshot = "data/provider_dump.csv"      # or [source] url
//! raw = "output/raw_calendar_events.csv"
//! processed = "output/processed_calendar_events.csv"
//! institutions = "institutions.toml"
//!
//! [window]
//! past_months = 6
//! future_months = 6
//!
//! [store]
//! database = "output/calendar.db"
//! table = "calendar_events"
//!
//! [rules.time]
//! zone = "America/Toronto"
//! ```
//!
//! Relative paths resolve against the pipeline file's directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_io::fetch::FetchReport;
use calsync_io::{query_window, RetryPolicy, UploadReport};
use calsync_recon::{ReconResult, RuleSet};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::exit_codes::{EXIT_ERROR, EXIT_PROCESS_INVALID_RULES, EXIT_USAGE};
use crate::fetch::{fetch_stage, open_source, SourceSpec, DEFAULT_FUTURE_MONTHS, DEFAULT_PAST_MONTHS};
use crate::stages::{print_summary, print_upload, process_stage, upload_stage};
use crate::CliError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub rules: RuleSet,
    /// Skip the variant merge and rely on the suffix rewrite.
    #[serde(default)]
    pub no_variants: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
    pub raw: PathBuf,
    pub processed: PathBuf,
    pub institutions: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub past_months: u32,
    pub future_months: u32,
    /// Pin "today" for reproducible windows.
    pub today: Option<NaiveDate>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            past_months: DEFAULT_PAST_MONTHS,
            future_months: DEFAULT_FUTURE_MONTHS,
            today: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub database: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub create_table: bool,
}

fn default_table() -> String {
    calsync_io::store::DEFAULT_TABLE.to_string()
}

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, CliError> {
        let config: PipelineConfig = toml::from_str(input)
            .map_err(|e| CliError::args(format!("invalid pipeline file: {e}")))?;
        config
            .rules
            .validate()
            .map_err(|e| CliError::new(EXIT_PROCESS_INVALID_RULES, e.to_string()))?;
        Ok(config)
    }

    /// Rebase every relative path onto `base`.
    fn resolve_paths(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(snapshot) = self.paths.snapshot.as_mut() {
            rebase(snapshot);
        }
        rebase(&mut self.paths.raw);
        rebase(&mut self.paths.processed);
        rebase(&mut self.paths.institutions);
        if let Some(store) = self.store.as_mut() {
            rebase(&mut store.database);
        }
    }

    fn source_spec(&self) -> Result<SourceSpec, CliError> {
        match (&self.paths.snapshot, &self.source.url) {
            (Some(path), None) => Ok(SourceSpec::Snapshot(path.clone())),
            (None, Some(url)) => Ok(SourceSpec::Http(url.clone())),
            (Some(_), Some(_)) => Err(CliError::args(
                "pipeline sets both paths.snapshot and source.url",
            )),
            (None, None) => Err(CliError::args("pipeline has no event source")
                .with_hint("set paths.snapshot or source.url, or pass --skip-fetch")),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchReport>,
    pub process: Option<ReconResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadReport>,
}

pub fn run_pipeline(
    mut config: PipelineConfig,
    base: &Path,
    dry_run: bool,
    skip_fetch: bool,
    skip_upload: bool,
) -> Result<RunReport, CliError> {
    config.resolve_paths(base);
    let mut report = RunReport::default();

    // Check the destination before spending time on fetch
    let store = match (&config.store, skip_upload) {
        (_, true) => None,
        (Some(store), false) => Some(store),
        (None, false) => {
            return Err(CliError::new(EXIT_USAGE, "pipeline has no [store] section")
                .with_hint("add [store] database = \"...\" or pass --skip-upload"));
        }
    };

    if !skip_fetch {
        let spec = config.source_spec()?;
        let today = config.window.today.unwrap_or_else(|| Local::now().date_naive());
        let window = query_window(today, config.window.past_months, config.window.future_months)?;
        let policy = RetryPolicy {
            chunk_delay: Duration::from_millis(config.source.chunk_delay_ms),
            ..RetryPolicy::default()
        };
        let source = open_source(&spec, &config.rules)?;
        info!(stage = "fetch", "starting");
        report.fetch = Some(fetch_stage(
            source.as_ref(),
            &config.paths.institutions,
            &config.rules,
            &window,
            &policy,
            &config.paths.raw,
        )?);
    }

    info!(stage = "process", "starting");
    let result = process_stage(
        &config.paths.raw,
        &config.paths.institutions,
        &config.rules,
        !config.no_variants,
        Utc::now(),
        &config.paths.processed,
    )?;
    print_summary(&result);
    report.process = Some(result);

    if let Some(store) = store {
        info!(stage = "upload", "starting");
        let upload = upload_stage(
            &config.paths.processed,
            &store.database,
            &store.table,
            dry_run,
            store.create_table,
        )?;
        print_upload(&upload, &store.table);
        report.upload = Some(upload);
    }

    Ok(report)
}

pub fn cmd_run(
    config_path: PathBuf,
    dry_run: bool,
    skip_fetch: bool,
    skip_upload: bool,
    json: bool,
) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&config_path).map_err(|e| {
        CliError::args(format!("cannot read pipeline {}: {e}", config_path.display()))
    })?;
    let config = PipelineConfig::from_toml(&text)?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));

    let report = run_pipeline(config, base, dry_run, skip_fetch, skip_upload)?;

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[paths]
snapshot = "dump.csv"
raw = "out/raw.csv"
processed = "out/processed.csv"
institutions = "/etc/calsync/institutions.toml"
"#;

    #[test]
    fn defaults_fill_optional_sections() {
        let config = PipelineConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.window.past_months, 6);
        assert_eq!(config.window.future_months, 6);
        assert!(config.store.is_none());
        assert_eq!(config.rules.time.zone, "America/Toronto");
        assert!(!config.no_variants);
    }

    #[test]
    fn relative_paths_follow_the_pipeline_file() {
        let mut config = PipelineConfig::from_toml(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/srv/calsync"));
        assert_eq!(config.paths.raw, PathBuf::from("/srv/calsync/out/raw.csv"));
        assert_eq!(config.paths.snapshot, Some(PathBuf::from("/srv/calsync/dump.csv")));
        assert_eq!(
            config.paths.institutions,
            PathBuf::from("/etc/calsync/institutions.toml")
        );
    }

    #[test]
    fn store_table_defaults() {
        let text = format!("{MINIMAL}\n[store]\ndatabase = \"calendar.db\"\n");
        let config = PipelineConfig::from_toml(&text).unwrap();
        let store = config.store.unwrap();
        assert_eq!(store.table, "calendar_events");
        assert!(!store.create_table);
    }

    #[test]
    fn inline_rules_are_validated() {
        let text = format!(
            "{MINIMAL}\n[rules.categories]\nincluded = [\"Earnings\"]\nexcluded = [\"Earnings\"]\n"
        );
        let err = PipelineConfig::from_toml(&text).unwrap_err();
        assert_eq!(err.code, EXIT_PROCESS_INVALID_RULES);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = format!("{MINIMAL}\n[window]\npast = 3\n");
        assert_eq!(PipelineConfig::from_toml(&text).unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn source_must_be_unambiguous() {
        let text = format!("{MINIMAL}\n[source]\nurl = \"https://example.com/events\"\n");
        let config = PipelineConfig::from_toml(&text).unwrap();
        assert!(config.source_spec().is_err());
    }

    #[test]
    fn missing_store_fails_before_fetch() {
        let config = PipelineConfig::from_toml(MINIMAL).unwrap();
        let err = run_pipeline(config, Path::new("/nonexistent"), false, false, false).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }
}
