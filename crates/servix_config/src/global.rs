use serde::Deserialize;

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub max_connections: u16,
    pub shutdown_grace_secs: u64,
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            shutdown_grace_secs: 10,
            log_level: "info".into(),
        }
    }
}

impl GlobalConfig {
    pub fn max_connections(&self) -> u16 {
        self.max_connections
    }

    pub fn shutdown_grace_secs(&self) -> u64 {
        self.shutdown_grace_secs
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}
