//! Analyzer configuration
//!
//! Defaults reproduce the well-known names the analyzer has always matched
//! on. A TOML file can override any of them; the URL pattern given on the
//! command line wins over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for one analysis run
///
/// # Example
/// ```
/// use coldtrace::config::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.secondary_service_process, "DWASSVC");
/// assert!(config.url_pattern.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Request URL substring; empty means "use the default host/path filters"
    pub url_pattern: String,

    /// App pool id identifying the production front-end pipeline
    pub forwarder_app_pool: String,

    /// Host prefixes accepted when no URL pattern is given
    pub default_url_prefixes: Vec<String>,

    /// Path marker required when no URL pattern is given
    pub default_url_marker: String,

    /// Process name of the host (used for local placeholder-mode windows)
    pub host_process_name: String,

    /// Process name of the secondary service
    pub secondary_service_process: String,

    /// Process name of the worker launcher
    pub worker_launcher_process: String,

    /// Rundown command lines are cut to this many characters
    pub command_line_max_len: usize,

    /// Free-text telemetry columns are cut to this many characters
    pub telemetry_max_field_len: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            url_pattern: String::new(),
            forwarder_app_pool: "OnDemandConfigAndForwarder".to_string(),
            default_url_prefixes: vec![
                "http://sla-ws-func".to_string(),
                "http://functiondev".to_string(),
            ],
            default_url_marker: "/api/".to_string(),
            host_process_name: "Microsoft.Azure.WebJobs.Script.WebHost".to_string(),
            secondary_service_process: "DWASSVC".to_string(),
            worker_launcher_process: "FunctionsNetHost".to_string(),
            command_line_max_len: 100,
            telemetry_max_field_len: 2000,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file can't be read or isn't valid TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML analyzer config")
    }

    pub fn with_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.url_pattern = pattern.into();
        self
    }

    /// Human-readable description of the active URL filter
    pub fn describe_filter(&self) -> String {
        if self.url_pattern.is_empty() {
            format!(
                "{} with {}",
                self.default_url_prefixes.join("|"),
                self.default_url_marker
            )
        } else {
            self.url_pattern.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.forwarder_app_pool, "OnDemandConfigAndForwarder");
        assert_eq!(config.default_url_prefixes.len(), 2);
        assert_eq!(config.telemetry_max_field_len, 2000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalyzerConfig::from_toml_str(
            r#"
url_pattern = "/api/orders"
secondary_service_process = "SVCHOST2"
"#,
        )
        .unwrap();
        assert_eq!(config.url_pattern, "/api/orders");
        assert_eq!(config.secondary_service_process, "SVCHOST2");
        assert_eq!(config.worker_launcher_process, "FunctionsNetHost");
        assert_eq!(config.describe_filter(), "/api/orders");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(AnalyzerConfig::from_toml_str("url_pattern = [").is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AnalyzerConfig::from_toml("/nonexistent/coldtrace.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
