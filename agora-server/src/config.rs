use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Result};
use tracing::info;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    pub cache_ttl: Duration,
    pub recommendation_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            db_path: String::from("agora-db"),
            cache_ttl: Duration::from_secs(30),
            recommendation_limit: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("AGORA_PORT", "8000")?,
            db_path: try_load("AGORA_DB_PATH", "agora-db")?,
            cache_ttl: Duration::from_secs(try_load("AGORA_CACHE_TTL_SECS", "30")?),
            recommendation_limit: try_load("AGORA_RECOMMENDATION_LIMIT", "10")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}
