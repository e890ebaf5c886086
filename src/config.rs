//! Runtime configuration read from the environment (`.env` honoured).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::spreadsheet::IngestConfig;
use crate::storage::DEFAULT_SESSION_TTL;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset means in-memory storage.
    pub database_url: Option<String>,
    pub port: u16,
    pub nats_url: Option<String>,
    /// `.csv` or a workbook (`.xlsx`, `.xls`, `.ods`).
    pub catalog_path: PathBuf,
    /// Worksheet read from a workbook; the first sheet when missing.
    pub catalog_sheet: String,
    pub images_dir: PathBuf,
    pub images_url_prefix: String,
    pub placeholder_image: String,
    pub catalog_cache_ttl: Duration,
    /// Idle time after which a visitor session is forgotten.
    pub session_ttl: Duration,
    pub whatsapp_phone: String,
    pub country_code: String,
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8083,
            nats_url: None,
            catalog_path: PathBuf::from("data/final.xlsx"),
            catalog_sheet: "HOJA-FINAL".into(),
            images_dir: PathBuf::from("static/img/productos"),
            images_url_prefix: "/static/img/productos/".into(),
            placeholder_image: "/static/img/placeholder.svg".into(),
            catalog_cache_ttl: Duration::from_secs(3600),
            session_ttl: DEFAULT_SESSION_TTL,
            whatsapp_phone: String::new(),
            country_code: "54".into(),
            admin_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Ok(Self {
            database_url: get("DATABASE_URL"),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            nats_url: get("NATS_URL"),
            catalog_path: get("CATALOG_PATH").map(PathBuf::from).unwrap_or(defaults.catalog_path),
            catalog_sheet: get("CATALOG_SHEET").unwrap_or(defaults.catalog_sheet),
            images_dir: get("IMAGES_DIR").map(PathBuf::from).unwrap_or(defaults.images_dir),
            images_url_prefix: get("IMAGES_URL_PREFIX").map(with_trailing_slash).unwrap_or(defaults.images_url_prefix),
            placeholder_image: get("PLACEHOLDER_IMAGE").unwrap_or(defaults.placeholder_image),
            catalog_cache_ttl: parse::<u64, _>(&get, "CATALOG_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.catalog_cache_ttl),
            session_ttl: parse::<u64, _>(&get, "SESSION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            whatsapp_phone: get("WHATSAPP_PHONE").unwrap_or_default(),
            country_code: get("COUNTRY_CODE").unwrap_or(defaults.country_code),
            admin_token: get("ADMIN_TOKEN"),
        })
    }

    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            catalog_path: self.catalog_path.clone(),
            sheet: self.catalog_sheet.clone(),
            images_dir: self.images_dir.clone(),
            ttl: self.catalog_cache_ttl,
        }
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| raw.parse::<T>().map_err(|_| StorefrontError::Config(format!("{key} is not a valid number: {raw}"))))
        .transpose()
}

fn with_trailing_slash(mut prefix: String) -> String {
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}
