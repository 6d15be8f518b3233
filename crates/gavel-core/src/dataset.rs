// Raw player dataset loading (JSON or CSV) and normalization.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{Player, PlayerStatus};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read player dataset {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON player dataset {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to parse CSV player dataset {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("unsupported player dataset format: {path} (expected .json or .csv)")]
    UnsupportedFormat { path: PathBuf },

    #[error("player dataset {path} contains no players")]
    Empty { path: PathBuf },
}

/// One row of the raw dataset, before auction fields are attached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayer {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gender: String,
    pub category: String,
    #[serde(default, alias = "imageUrl", alias = "image_url")]
    pub image: String,
    #[serde(default, alias = "base_price")]
    pub base_price: u32,
}

/// Accept ids written as either JSON numbers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Attach the auction fields to raw rows. Rows repeating an earlier id are
/// dropped.
pub fn normalize_players(raw: Vec<RawPlayer>) -> Vec<Player> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|row| {
            let fresh = seen.insert(row.id.clone());
            if !fresh {
                warn!("Dropping duplicate player id '{}' ({})", row.id, row.name);
            }
            fresh
        })
        .map(|row| Player {
            id: row.id,
            name: row.name,
            gender: row.gender,
            category: row.category,
            image_url: row.image,
            base_price: row.base_price,
            status: PlayerStatus::Unsold,
        })
        .collect()
}

/// Parse a JSON array of raw players.
pub fn parse_json(text: &str) -> Result<Vec<RawPlayer>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Parse CSV rows with a header line naming the columns.
pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<RawPlayer>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    rdr.deserialize().collect()
}

/// Load and normalize the dataset at `path`, choosing the parser by file
/// extension.
pub fn load_players(path: &Path) -> Result<Vec<Player>, DatasetError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let raw = match extension.as_deref() {
        Some("json") => {
            let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_json(&text).map_err(|source| DatasetError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
        Some("csv") => {
            let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_csv(file).map_err(|source| DatasetError::Csv {
                path: path.to_path_buf(),
                source,
            })?
        }
        _ => {
            return Err(DatasetError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    let players = normalize_players(raw);
    if players.is_empty() {
        return Err(DatasetError::Empty {
            path: path.to_path_buf(),
        });
    }
    info!("Loaded {} players from {}", players.len(), path.display());
    Ok(players)
}
