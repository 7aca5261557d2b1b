use std::env;
use thiserror::Error;

pub const DEFAULT_DATABASE: &str = "OpenSplit";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You need to add {0} to the env")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub auth_secret: String,
    /// Unset means any origin may call the API.
    pub allowed_origin: Option<String>,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let port = match lookup("OPENSPLIT_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "OPENSPLIT_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            mongodb_uri: required("MONGODB_URI")?,
            database: lookup("OPENSPLIT_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            host: lookup("OPENSPLIT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            auth_secret: required("OPENSPLIT_AUTH_SECRET")?,
            allowed_origin: lookup("OPENSPLIT_ALLOWED_ORIGIN").filter(|v| !v.is_empty()),
        })
    }
}
