use serde::Deserialize;

use crate::validation::{ConfigReport, validate};
use crate::{GlobalConfig, HttpConfig, ServerConfig};

// =======================================================
// SERVIX CONFIG — main config
// =======================================================
#[derive(Debug, Deserialize, Default)]
pub struct ServixConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl ServixConfig {
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn http(&self) -> &HttpConfig {
        &self.http
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Ini).required(false))
            .build()?;

        built.try_deserialize()
    }
}
