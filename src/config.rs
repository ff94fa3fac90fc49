use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{BlobKey, IdRange, TableId};
use crate::error::EtlError;

pub const DEFAULT_CONFIG_FILE: &str = "species-etl.json";
pub const DEFAULT_API_BASE: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_BUCKET: &str = "pokemon-dataset";
pub const DEFAULT_RAW_KEY: &str = "pokemon_species_data.csv";
pub const DEFAULT_CLEANED_KEY: &str = "cleaned_pokemon_species_data.csv";
pub const DEFAULT_TABLE: &str = "pokemon.pokemon_species_data";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub id_range: Option<IdRangeEntry>,
    #[serde(default)]
    pub storage: StorageEntry,
    #[serde(default)]
    pub warehouse: WarehouseEntry,
    #[serde(default)]
    pub step_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IdRangeEntry {
    Shorthand(String),
    Detailed { start: u32, end: u32 },
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageEntry {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub raw_key: Option<String>,
    #[serde(default)]
    pub cleaned_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WarehouseEntry {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub create_if_missing: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: Utf8PathBuf,
    pub bucket: String,
    pub raw_key: BlobKey,
    pub cleaned_key: BlobKey,
}

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub database: Utf8PathBuf,
    pub table: TableId,
    pub create_if_missing: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub api_base: String,
    pub http_timeout: Duration,
    pub id_range: IdRange,
    pub storage: StorageSettings,
    pub warehouse: WarehouseSettings,
    pub step_retries: u32,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `species-etl.json` in the working directory when no path is
    /// given. A missing default file resolves to the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EtlError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if !config_path.as_std_path().exists() {
            if path.is_some() {
                return Err(EtlError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default(), &default_data_root());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| EtlError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| EtlError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, &default_data_root())
    }

    /// Validate a parsed config. Relative paths are left relative; defaults for
    /// storage and database are placed under `data_root`.
    pub fn resolve_config(
        config: Config,
        data_root: &Utf8Path,
    ) -> Result<ResolvedConfig, EtlError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let id_range = match config.id_range {
            None => IdRange::default(),
            Some(IdRangeEntry::Shorthand(value)) => value.parse()?,
            Some(IdRangeEntry::Detailed { start, end }) => IdRange::new(start, end)?,
        };

        let storage = StorageSettings {
            root: config
                .storage
                .root
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| data_root.join("buckets")),
            bucket: config
                .storage
                .bucket
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            raw_key: config
                .storage
                .raw_key
                .as_deref()
                .unwrap_or(DEFAULT_RAW_KEY)
                .parse()?,
            cleaned_key: config
                .storage
                .cleaned_key
                .as_deref()
                .unwrap_or(DEFAULT_CLEANED_KEY)
                .parse()?,
        };
        if storage.raw_key == storage.cleaned_key {
            return Err(EtlError::ConfigParse(
                "raw_key and cleaned_key must differ".to_string(),
            ));
        }
        validate_bucket(&storage.bucket)?;

        let warehouse = WarehouseSettings {
            database: config
                .warehouse
                .database
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| data_root.join("warehouse.sqlite")),
            table: config
                .warehouse
                .table
                .as_deref()
                .unwrap_or(DEFAULT_TABLE)
                .parse()?,
            create_if_missing: config.warehouse.create_if_missing.unwrap_or(true),
        };

        Ok(ResolvedConfig {
            schema_version,
            api_base: config
                .api_base
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http_timeout: Duration::from_secs(config.http_timeout_secs.unwrap_or(30)),
            id_range,
            storage,
            warehouse,
            step_retries: config.step_retries.unwrap_or(1),
        })
    }
}

fn validate_bucket(bucket: &str) -> Result<(), EtlError> {
    let is_valid = !bucket.is_empty()
        && bucket
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && bucket != "."
        && bucket != "..";
    if !is_valid {
        return Err(EtlError::ConfigParse(format!("invalid bucket name: {bucket}")));
    }
    Ok(())
}

/// Per-user data directory, or `.species-etl` under the working directory when the
/// platform has none.
pub fn default_data_root() -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("species-etl")).ok()
        })
        .unwrap_or_else(|| Utf8PathBuf::from(".species-etl"))
}
