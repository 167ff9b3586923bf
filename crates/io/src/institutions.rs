// Institution metadata file: canonical ticker -> name, id, type

use std::collections::BTreeMap;
use std::path::Path;

use calsync_recon::model::{Institution, InstitutionTable};
use serde::Deserialize;
use tracing::info;

use crate::error::IoError;
use crate::raw::read_input;

#[derive(Deserialize)]
struct InstitutionsFile {
    #[serde(default)]
    institutions: BTreeMap<String, InstitutionEntry>,
}

#[derive(Deserialize)]
struct InstitutionEntry {
    name: String,
    #[serde(default)]
    id: Option<InstitutionId>,
    #[serde(rename = "type")]
    kind: String,
}

/// Ids are written bare (`id = 7`) or quoted (`id = "RY01"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum InstitutionId {
    Number(i64),
    Text(String),
}

impl From<InstitutionId> for String {
    fn from(id: InstitutionId) -> Self {
        match id {
            InstitutionId::Number(n) => n.to_string(),
            InstitutionId::Text(s) => s,
        }
    }
}

/// Parse an institutions document.
///
/// ```toml
/// [institutions."RY-CA"]
/// name = "Royal Bank of Canada"
/// id = 1
/// type = "Canadian_Banks"
/// ```
pub fn parse_institutions(input: &str) -> Result<InstitutionTable, String> {
    let file: InstitutionsFile = toml::from_str(input).map_err(|e| e.to_string())?;
    Ok(file
        .institutions
        .into_iter()
        .map(|(ticker, entry)| {
            (
                ticker.trim().to_string(),
                Institution {
                    name: entry.name,
                    id: entry.id.map(String::from).unwrap_or_default(),
                    kind: entry.kind,
                },
            )
        })
        .collect())
}

pub fn load_institutions(path: &Path) -> Result<InstitutionTable, IoError> {
    let data = read_input(path)?;
    let table = parse_institutions(&data).map_err(|message| IoError::Toml {
        path: path.to_path_buf(),
        message,
    })?;
    info!(path = %path.display(), institutions = table.len(), "loaded institutions");
    Ok(table)
}

/// Canonical tickers in table order.
pub fn canonical_tickers(table: &InstitutionTable) -> Vec<String> {
    table.keys().cloned().collect()
}
