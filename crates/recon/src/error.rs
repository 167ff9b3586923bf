use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Rule table validation error (overlapping lists, duplicate sources, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Configured local zone is not a known IANA name.
    #[error("unknown time zone: {0}")]
    UnknownZone(String),
    /// Required provider column absent from the raw CSV header.
    #[error("missing column '{column}' in raw events")]
    MissingColumn { column: String },
    #[error("raw CSV error: {0}")]
    Csv(String),
}
