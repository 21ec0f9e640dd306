use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    #[serde(default = "default_song_data_prefix")]
    pub song_data_prefix: String,
    #[serde(default = "default_log_data_prefix")]
    pub log_data_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Root the record streams are read from. A plain path, a file://
    /// URL or an s3://bucket/prefix URL.
    pub source_root: String,
    /// Root the star-schema tables are written under.
    pub destination_root: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

fn default_song_data_prefix() -> String {
    "song_data".to_string()
}

fn default_log_data_prefix() -> String {
    "log_data".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            source_root = %settings.storage.source_root,
            destination_root = %settings.storage.destination_root,
            "Loaded pipeline configuration"
        );

        Ok(settings)
    }
}
