use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub server: Server,
}

impl Settings {
    /// Load from the TOML file, then let TIMEBANK__* environment
    /// variables override individual keys.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("TIMEBANK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
