//! Environment-sourced settings for the extract, upload, and lookup tools.
//!
//! Binaries call `dotenvy::dotenv()` first, so a `.env` file in the working
//! directory is honoured.

use crate::extract::DEFAULT_BATCH_SIZE;
use crate::{IngestError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SOURCE_FILE: &str = "food.parquet";
pub const DEFAULT_CSV_FILE: &str = "food_extracted.csv";
pub const DEFAULT_SERVICE_ACCOUNT_PATH: &str = "serviceAccountKey.json";
pub const DEFAULT_CHUNK_SIZE: usize = 5000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Parquet dump to extract from (`SOURCE_FILE`)
    pub source_path: PathBuf,
    /// Extractor output and uploader input (`CSV_FILE`)
    pub csv_path: PathBuf,
    /// Rows per source batch (`EXTRACT_BATCH_SIZE`)
    pub batch_size: usize,
    /// Service-account key file (`FIREBASE_SERVICE_ACCOUNT_PATH`)
    pub credentials_path: PathBuf,
    /// Store endpoint (`FIREBASE_DATABASE_URL`)
    pub database_url: Option<String>,
    /// Pre-minted token passed through as `access_token` (`FIREBASE_ACCESS_TOKEN`)
    pub access_token: Option<String>,
    /// Per-request HTTP timeout (`FIREBASE_TIMEOUT_SECS`)
    pub request_timeout: Duration,
    /// Rows per upload chunk (`UPLOAD_CHUNK_SIZE`)
    pub chunk_size: usize,
    /// Attempts per chunk (`MAX_RETRIES`)
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_FILE),
            csv_path: PathBuf::from(DEFAULT_CSV_FILE),
            batch_size: DEFAULT_BATCH_SIZE,
            credentials_path: PathBuf::from(DEFAULT_SERVICE_ACCOUNT_PATH),
            database_url: None,
            access_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = var("SOURCE_FILE") {
            config.source_path = PathBuf::from(path);
        }
        if let Some(path) = var("CSV_FILE") {
            config.csv_path = PathBuf::from(path);
        }
        if let Some(size) = var("EXTRACT_BATCH_SIZE") {
            config.batch_size = parse_positive("EXTRACT_BATCH_SIZE", &size)?;
        }
        if let Some(path) = var("FIREBASE_SERVICE_ACCOUNT_PATH") {
            config.credentials_path = PathBuf::from(path);
        }
        config.database_url = var("FIREBASE_DATABASE_URL");
        config.access_token = var("FIREBASE_ACCESS_TOKEN");
        if let Some(secs) = var("FIREBASE_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_positive("FIREBASE_TIMEOUT_SECS", &secs)? as u64);
        }
        if let Some(size) = var("UPLOAD_CHUNK_SIZE") {
            config.chunk_size = parse_positive("UPLOAD_CHUNK_SIZE", &size)?;
        }
        if let Some(retries) = var("MAX_RETRIES") {
            let n: u32 = retries.trim().parse().map_err(|_| {
                IngestError::Config(format!("MAX_RETRIES must be an integer, got '{retries}'"))
            })?;
            config.max_retries = n.max(1);
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            IngestError::Config(
                "FIREBASE_DATABASE_URL is not set; add it to your environment or .env file".into(),
            )
        })
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(IngestError::Config(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Fail with `MissingFile` unless `path` exists.
pub fn require_file(path: &Path, what: &'static str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(IngestError::MissingFile {
            what,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.csv_path, PathBuf::from("food_extracted.csv"));
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.batch_size, 10_000);
        assert!(config.database_url.is_none());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_vars(vars(&[
            ("CSV_FILE", "out.csv.gz"),
            ("UPLOAD_CHUNK_SIZE", "250"),
            ("MAX_RETRIES", "5"),
            ("FIREBASE_DATABASE_URL", "https://food.example.com"),
            ("FIREBASE_ACCESS_TOKEN", "  "),
        ]))
        .unwrap();
        assert_eq!(config.csv_path, PathBuf::from("out.csv.gz"));
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.require_database_url().unwrap(), "https://food.example.com");
        assert!(config.access_token.is_none());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(Config::from_vars(vars(&[("UPLOAD_CHUNK_SIZE", "0")])).is_err());
        assert!(Config::from_vars(vars(&[("UPLOAD_CHUNK_SIZE", "lots")])).is_err());
        assert!(Config::from_vars(vars(&[("MAX_RETRIES", "-1")])).is_err());
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let config = Config::from_vars(vars(&[("MAX_RETRIES", "0")])).unwrap();
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn require_file_reports_missing_path() {
        let err = require_file(Path::new("/definitely/not/here.parquet"), "Source file")
            .unwrap_err();
        assert!(err.to_string().contains("Source file not found"));
    }
}
