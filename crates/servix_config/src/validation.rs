use std::path::Path;

use crate::ServixConfig;

/// Validation output for a loaded Servix configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    /// Returns true when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true when at least one error was found.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the collected warning messages.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the collected error messages.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a Servix configuration and return a report of issues.
pub fn validate(cfg: &ServixConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_tls_paths(cfg, &mut report);
    validate_limits(cfg, &mut report);

    report
}

fn validate_server(cfg: &ServixConfig, report: &mut ConfigReport) {
    if cfg.server.listen_host.is_empty() {
        report.error("[server] listen_host must not be empty");
    }
    if cfg.server.listen_port == 0 {
        report.error("[server] listen_port must be between 1 and 65535");
    }

    let root = Path::new(&cfg.server.root);
    if cfg.server.root.is_empty() {
        report.error("[server] root must not be empty");
    } else if !root.exists() {
        report.error(format!(
            "[server] root '{}' does not exist",
            cfg.server.root
        ));
    } else if !root.is_dir() {
        report.error(format!(
            "[server] root '{}' is not a directory",
            cfg.server.root
        ));
    }

    if cfg.server.index.is_empty() {
        report.warn("[server] index is empty; directory requests will return 404");
    } else if cfg.server.index.contains('/') {
        report.error(format!(
            "[server] index '{}' must be a bare file name",
            cfg.server.index
        ));
    }
}

fn validate_tls_paths(cfg: &ServixConfig, report: &mut ConfigReport) {
    for (option, path) in [
        ("cert_path", &cfg.server.cert_path),
        ("key_path", &cfg.server.key_path),
    ] {
        if path.is_empty() {
            report.error(format!("[server] {option} must not be empty"));
        } else if !Path::new(path).is_file() {
            report.error(format!("[server] {option} '{path}' does not exist"));
        }
    }
}

fn validate_limits(cfg: &ServixConfig, report: &mut ConfigReport) {
    if cfg.global.max_connections == 0 {
        report.error("[global] max_connections must be greater than 0");
    }
    if cfg.global.shutdown_grace_secs == 0 {
        report.warn("[global] shutdown_grace_secs is 0; in-flight requests are cut off on shutdown");
    }
    if cfg.http.max_request_headers_bytes == 0 {
        report.error("[http] max_request_headers_bytes must be greater than 0");
    }
    if cfg.http.client_read_timeout_secs == 0 {
        report.warn("[http] client_read_timeout_secs is 0; slow clients can stall a worker");
    }
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::ServixConfig;

    fn cfg_with_existing_paths() -> ServixConfig {
        let mut cfg = ServixConfig::default();
        // Point the file checks at paths that always exist
        // (tests run with the package directory as cwd).
        cfg.server.root = std::env::temp_dir().display().to_string();
        cfg.server.cert_path = "Cargo.toml".into();
        cfg.server.key_path = "Cargo.toml".into();
        cfg
    }

    #[test]
    fn valid_config_produces_clean_report() {
        let cfg = cfg_with_existing_paths();
        let report = validate(&cfg);
        assert!(report.is_ok(), "unexpected errors: {}", report.format());
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = cfg_with_existing_paths();
        cfg.server.listen_port = 0;
        let report = validate(&cfg);
        assert!(report.has_errors());
        assert!(report.format().contains("listen_port"));
    }

    #[test]
    fn zero_max_connections_is_an_error() {
        let mut cfg = cfg_with_existing_paths();
        cfg.global.max_connections = 0;
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn missing_root_is_an_error() {
        let mut cfg = cfg_with_existing_paths();
        cfg.server.root = "/definitely/not/a/real/root".into();
        let report = validate(&cfg);
        assert!(report.has_errors());
        assert!(report.format().contains("root"));
    }

    #[test]
    fn zero_grace_period_is_a_warning_only() {
        let mut cfg = cfg_with_existing_paths();
        cfg.global.shutdown_grace_secs = 0;
        let report = validate(&cfg);
        assert!(report.is_ok());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn index_with_slash_is_an_error() {
        let mut cfg = cfg_with_existing_paths();
        cfg.server.index = "sub/index.html".into();
        assert!(validate(&cfg).has_errors());
    }
}
