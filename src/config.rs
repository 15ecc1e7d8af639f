//! Environment-driven configuration

use di::{inject, injectable};
use log::error;
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_VIEW_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_VIEW_CACHE_CAPACITY: usize = 1000;
const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set when SUPABASE_URL is set")]
    Missing(&'static str),
    #[error("either SUPABASE_URL or DATABASE_URL must be set")]
    NoStore,
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Where companion data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    /// Hosted PostgREST endpoint.
    Rest { url: String, api_key: String },
    /// Local SQLite database, migrated at startup.
    Sqlite { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub database_url: Option<String>,
    pub bind_address: String,
    pub view_cache_ttl: Duration,
    /// Most rendered pages kept at once.
    pub view_cache_capacity: usize,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            database_url: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            view_cache_ttl: Duration::from_secs(DEFAULT_VIEW_CACHE_TTL_SECS),
            view_cache_capacity: DEFAULT_VIEW_CACHE_CAPACITY,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

#[injectable]
impl Config {
    #[inject]
    pub fn create() -> Config {
        Config::from_env().unwrap_or_else(|e| {
            error!("invalid configuration, using defaults: {e}");
            Config::default()
        })
    }
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config {
            supabase_url: var("SUPABASE_URL"),
            supabase_anon_key: var("SUPABASE_ANON_KEY"),
            database_url: var("DATABASE_URL"),
            ..Config::default()
        };

        if let Some(bind_address) = var("BIND_ADDRESS") {
            config.bind_address = bind_address;
        }

        if let Some(ttl) = var("VIEW_CACHE_TTL_SECS") {
            let secs = ttl.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: "VIEW_CACHE_TTL_SECS",
                value: ttl.clone(),
            })?;
            config.view_cache_ttl = Duration::from_secs(secs);
        }

        if let Some(capacity) = var("VIEW_CACHE_CAPACITY") {
            let entries = capacity.parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
                name: "VIEW_CACHE_CAPACITY",
                value: capacity.clone(),
            })?;
            config.view_cache_capacity = entries;
        }

        if let Some(origins) = var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(config)
    }

    /// Picks the store backend. A hosted endpoint wins over a local database.
    pub fn store(&self) -> Result<StoreSettings, ConfigError> {
        match (&self.supabase_url, &self.database_url) {
            (Some(url), _) => {
                let api_key = self
                    .supabase_anon_key
                    .clone()
                    .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;
                Ok(StoreSettings::Rest {
                    url: url.trim_end_matches('/').to_owned(),
                    api_key,
                })
            }
            (None, Some(url)) => Ok(StoreSettings::Sqlite { url: url.clone() }),
            (None, None) => Err(ConfigError::NoStore),
        }
    }
}
