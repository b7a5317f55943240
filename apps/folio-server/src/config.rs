//! Configuration management for Folio Server
//!
//! Everything is read from the environment (`.env` is honoured by `main`).
//! Unset variables fall back to the defaults below.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::extraction::ExtractionOptions;
use crate::ocr::{OcrProvider, OcrServiceConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionOptions,
    pub ocr: OcrServiceConfig,
    pub worker: WorkerConfig,
    pub search: SearchConfig,
    /// Time budget of one text pass over one unit
    pub text_pass_budget: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { root: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Claim owner tag
    pub worker_id: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Processing jobs without a heartbeat for this long are reaped
    pub stale_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    Fts,
    Http { url: String },
    None,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub backend: SearchBackend,
    /// Site scope attached to every indexed document
    pub site: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_secs(15),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Fts,
            site: "library".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./folio.db".to_string(),
            },
            storage: StorageConfig::Local {
                root: PathBuf::from("./data"),
            },
            extraction: ExtractionOptions::default(),
            ocr: OcrServiceConfig::default(),
            worker: WorkerConfig::default(),
            search: SearchConfig::default(),
            text_pass_budget: Duration::from_millis(2000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                root: var("STORAGE_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data")),
            },
            "s3" => StorageConfig::S3(S3Config {
                endpoint: required("S3_ENDPOINT")?,
                bucket: required("S3_BUCKET")?,
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
                region: var("S3_REGION"),
            }),
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let search_backend = match var("SEARCH_BACKEND").as_deref().unwrap_or("fts") {
            "fts" => SearchBackend::Fts,
            "http" => SearchBackend::Http {
                url: required("SEARCH_URL")?,
            },
            "none" => SearchBackend::None,
            other => {
                return Err(ConfigError::Invalid {
                    var: "SEARCH_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let ocr_language = var("OCR_LANGUAGE").unwrap_or(defaults.extraction.ocr_language);
        let providers = match var("OCR_PROVIDERS") {
            Some(list) => parse_providers(&list)?,
            None => defaults.ocr.providers,
        };

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parsed("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            storage,
            extraction: ExtractionOptions {
                max_words_per_part: parsed("MAX_WORDS_PER_PART", defaults.extraction.max_words_per_part)?,
                ocr_enabled: parsed("OCR_ENABLED", defaults.extraction.ocr_enabled)?,
                ocr_language: ocr_language.clone(),
                max_pages_for_ocr: parsed("MAX_PAGES_FOR_OCR", defaults.extraction.max_pages_for_ocr)?,
            },
            ocr: OcrServiceConfig {
                providers,
                ollama_url: var("OLLAMA_URL").unwrap_or(defaults.ocr.ollama_url),
                ollama_model: var("OLLAMA_MODEL").unwrap_or(defaults.ocr.ollama_model),
                default_language: ocr_language,
            },
            worker: WorkerConfig {
                worker_id: var("WORKER_ID").unwrap_or(defaults.worker.worker_id),
                poll_interval: Duration::from_millis(parsed("WORKER_POLL_INTERVAL_MS", 2000)?),
                heartbeat_interval: Duration::from_secs(parsed("WORKER_HEARTBEAT_SECS", 15)?),
                stale_after: Duration::from_secs(parsed("WORKER_STALE_AFTER_SECS", 600)?),
            },
            search: SearchConfig {
                backend: search_backend,
                site: var("SEARCH_SITE").unwrap_or(defaults.search.site),
            },
            text_pass_budget: Duration::from_millis(parsed("TEXT_PASS_BUDGET_MS", 2000)?),
        })
    }
}

/// Non-empty value of an environment variable
fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { var: name, value }),
        None => Ok(default),
    }
}

fn parse_providers(list: &str) -> Result<Vec<OcrProvider>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            OcrProvider::parse(p).ok_or_else(|| ConfigError::Invalid {
                var: "OCR_PROVIDERS",
                value: p.to_string(),
            })
        })
        .collect()
}
