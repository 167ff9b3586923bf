// calsync CLI - fetch, reconcile and publish institution calendar events

mod exit_codes;
mod fetch;
mod pipeline;
mod stages;

use std::path::PathBuf;
use std::process::ExitCode;

use calsync_io::{FetchError, IoError, StoreError};
use calsync_recon::ReconError;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "calsync")]
#[command(about = "Fetch, reconcile and publish institution calendar events")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Raise log verbosity to debug (RUST_LOG overrides)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the expanded ticker query set and how it folds back
    #[command(after_help = "\
Examples:
  calsync variants institutions.toml
  calsync variants institutions.toml --rules rules.toml --json")]
    Variants {
        /// Institutions TOML file
        institutions: PathBuf,

        /// Rule set TOML (default: built-in rules)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Fetch raw events for every monitored ticker and its variants
    #[command(after_help = "\
Examples:
  calsync fetch --snapshot dump.csv --institutions institutions.toml
  calsync fetch --snapshot dump.csv --institutions institutions.toml --from 2024-01-01 --to 2024-06-30
  CALSYNC_API_USERNAME=u CALSYNC_API_PASSWORD=p calsync fetch --url https://api.example.com/events --institutions institutions.toml")]
    Fetch {
        #[command(flatten)]
        source: fetch::SourceArgs,

        /// Institutions TOML file
        #[arg(long)]
        institutions: PathBuf,

        /// Rule set TOML (default: built-in rules)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Raw events output CSV
        #[arg(long, default_value = "output/raw_calendar_events.csv")]
        out: PathBuf,

        #[command(flatten)]
        window: fetch::WindowArgs,
    },

    /// Reconcile raw events into one canonical event per key
    #[command(after_help = "\
Examples:
  calsync process output/raw_calendar_events.csv --institutions institutions.toml
  calsync process raw.csv --institutions institutions.toml --rules rules.toml --json
  calsync process raw.csv --institutions institutions.toml --no-variants")]
    Process {
        /// Raw events CSV
        raw: PathBuf,

        /// Institutions TOML file
        #[arg(long)]
        institutions: PathBuf,

        /// Rule set TOML (default: built-in rules)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Processed events output CSV
        #[arg(long, default_value = "output/processed_calendar_events.csv")]
        out: PathBuf,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Skip variant merge; fold alternates with the suffix rewrite only
        #[arg(long)]
        no_variants: bool,

        /// Fetch timestamp stamped on every event (RFC 3339, default: now)
        #[arg(long)]
        fetched_at: Option<String>,
    },

    /// Replace the destination table with processed events
    #[command(after_help = "\
Examples:
  calsync upload output/processed_calendar_events.csv --db calendar.db
  calsync upload processed.csv --db calendar.db --table events --create-table
  calsync upload processed.csv --db calendar.db --dry-run")]
    Upload {
        /// Processed events CSV
        processed: PathBuf,

        /// SQLite database file
        #[arg(long, env = "CALSYNC_DB")]
        db: PathBuf,

        /// Destination table
        #[arg(long, default_value = calsync_io::store::DEFAULT_TABLE)]
        table: String,

        /// Check connectivity and schema without writing
        #[arg(long)]
        dry_run: bool,

        /// Create the table if it does not exist
        #[arg(long)]
        create_table: bool,
    },

    /// Run fetch, process and upload from a pipeline file
    #[command(after_help = "\
Examples:
  calsync run pipeline.toml
  calsync run pipeline.toml --dry-run
  calsync run pipeline.toml --skip-fetch --skip-upload --json")]
    Run {
        /// Pipeline TOML file
        config: PathBuf,

        /// Validate the destination without writing to it
        #[arg(long)]
        dry_run: bool,

        /// Reprocess the existing raw file instead of fetching
        #[arg(long)]
        skip_fetch: bool,

        /// Stop after processing
        #[arg(long)]
        skip_upload: bool,

        /// Print the run report as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate a rule set without running
    #[command(after_help = "\
Examples:
  calsync validate rules.toml")]
    Validate {
        /// Rule set TOML file
        rules: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("CALSYNC_COMMIT"),
        ")",
        "\nengine:  calsync-recon ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("CALSYNC_TARGET"),
    )
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Variants { institutions, rules, json } => {
            stages::cmd_variants(institutions, rules, json)
        }
        Commands::Fetch { source, institutions, rules, out, window } => {
            fetch::cmd_fetch(source, institutions, rules, out, window)
        }
        Commands::Process {
            raw,
            institutions,
            rules,
            out,
            json,
            no_variants,
            fetched_at,
        } => stages::cmd_process(raw, institutions, rules, out, json, no_variants, fetched_at),
        Commands::Upload { processed, db, table, dry_run, create_table } => {
            stages::cmd_upload(processed, db, table, dry_run, create_table)
        }
        Commands::Run { config, dry_run, skip_fetch, skip_upload, json } => {
            pipeline::cmd_run(config, dry_run, skip_fetch, skip_upload, json)
        }
        Commands::Validate { rules } => stages::cmd_validate(rules),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        let code = exit_codes::io_exit_code(&err);
        let hint = match &err {
            IoError::NotFound(_) => Some("run the upstream stage first".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        Self::new(exit_codes::recon_exit_code(&err), err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let code = exit_codes::store_exit_code(&err);
        let hint = match &err {
            StoreError::MissingTable(_) => Some("pass --create-table to create it".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        Self::new(exit_codes::fetch_exit_code(&err), err.to_string())
    }
}
