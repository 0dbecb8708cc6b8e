use std::{collections::HashSet, fmt::Display, str::FromStr, time::Duration};

use axum::http::HeaderValue;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no API keys configured, set API_KEY_1 and/or API_KEY_2")]
    NoApiKeys,

    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when PRINT_SERVER_HOST is set")]
    MissingPrintSetting(&'static str),
}

/// The shared secrets accepted in the `X-API-Key` header.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(HashSet<String>);

impl ApiKeys {
    /// Blank values are dropped so an unset variable never becomes a valid key.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            keys.into_iter()
                .map(Into::into)
                .filter(|k| !k.trim().is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PrintConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub printer: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_keys: ApiKeys,
    pub mongodb_uri: String,
    pub database_name: String,
    pub collection_name: String,
    pub port: u16,
    pub frontend_origin: HeaderValue,
    pub store_timeout: Duration,
    pub print: Option<PrintConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_keys = ApiKeys::new(["API_KEY_1", "API_KEY_2"].into_iter().filter_map(|k| env.get(k)));
        if api_keys.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }

        let origin = env.get_or("FRONTEND_ORIGIN", "http://localhost:3000");
        let frontend_origin = HeaderValue::from_str(&origin).map_err(|e| ConfigError::Invalid {
            key: "FRONTEND_ORIGIN",
            value: origin.clone(),
            reason: e.to_string(),
        })?;

        Ok(Config {
            api_keys,
            mongodb_uri: env.get_or("MONGODB_URI", "mongodb://localhost:27017"),
            database_name: env.get_or("DATABASE_NAME", "leaderboardDB"),
            collection_name: env.get_or("LEADERBOARD_COLLECTION", "leaderboard"),
            port: env.parse_or("PORT", 8676)?,
            frontend_origin,
            store_timeout: Duration::from_secs(env.parse_or("STORE_TIMEOUT_SECS", 10)?),
            print: print_config(&env)?,
        })
    }
}

fn print_config<F>(env: &Env<F>) -> Result<Option<PrintConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(host) = env.get("PRINT_SERVER_HOST") else {
        info!("PRINT_SERVER_HOST not set, printing disabled");
        return Ok(None);
    };

    let printer = env
        .get("PRINTER_NAME")
        .ok_or(ConfigError::MissingPrintSetting("PRINTER_NAME"))?;

    Ok(Some(PrintConfig {
        host,
        port: env.parse_or("PRINT_SERVER_PORT", 631)?,
        use_tls: env.parse_or("PRINT_USE_TLS", true)?,
        username: env.get("PRINT_USERNAME"),
        password: env.get("PRINT_PASSWORD"),
        printer,
        timeout: Duration::from_secs(env.parse_or("PRINT_TIMEOUT_SECS", 30)?),
    }))
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        match self.get(key) {
            None => {
                info!("{key} not set, using default: {default}");
                Ok(default)
            }
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
                warn!("Invalid {key} value: {e}");
                ConfigError::Invalid {
                    key,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            }),
        }
    }
}
