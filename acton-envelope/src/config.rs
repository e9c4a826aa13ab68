//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_ENVELOPE_, nested keys split on `__`)
//! 2. Current working directory: ./envelope.toml
//! 3. XDG config directory: ~/.config/acton-envelope/config.toml
//! 4. System directory: /etc/acton-envelope/config.toml
//! 5. Default values
//!
//! The configuration is read once at startup and shared read-only afterwards.

use axum::http::StatusCode;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::feedback::FeedbackMode;
use crate::pagination::PageBounds;

/// Process-wide envelope configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// Rewrite every output key (and the expected query parameter names) to camelCase
    #[serde(default)]
    pub camel_case: bool,

    /// Carry [`Feedback`](crate::feedback::Feedback) objects; plain strings when false
    #[serde(default = "default_true")]
    pub use_feedback: bool,

    /// Smallest accepted `per_page`
    #[serde(default = "default_per_page_min")]
    pub per_page_min: u64,

    /// Largest accepted `per_page`
    #[serde(default = "default_per_page_max")]
    pub per_page_max: u64,

    /// `per_page` used when the request does not provide one
    #[serde(default = "default_per_page_default")]
    pub per_page_default: u64,

    /// Name of a registered exception wrapper to use instead of the built-in one
    #[serde(default)]
    pub exception_wrapper: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// User-facing error descriptions
    #[serde(default)]
    pub messages: ErrorCatalog,
}

/// Catalog of user-facing error descriptions, one per status class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCatalog {
    #[serde(default = "default_generic")]
    pub generic: String,

    #[serde(default = "default_not_found")]
    pub not_found: String,

    #[serde(default = "default_authentication")]
    pub authentication: String,

    #[serde(default = "default_validation")]
    pub validation: String,
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        Self {
            generic: default_generic(),
            not_found: default_not_found(),
            authentication: default_authentication(),
            validation: default_validation(),
        }
    }
}

impl ErrorCatalog {
    /// Description line for a status: 401, 404 and 422 have their own line
    pub fn for_status(&self, status: StatusCode) -> &str {
        match status {
            StatusCode::UNAUTHORIZED => &self.authentication,
            StatusCode::NOT_FOUND => &self.not_found,
            StatusCode::UNPROCESSABLE_ENTITY => &self.validation,
            _ => &self.generic,
        }
    }

    fn validate(&self) -> Result<()> {
        let lines = [
            ("generic", &self.generic),
            ("not_found", &self.not_found),
            ("authentication", &self.authentication),
            ("validation", &self.validation),
        ];
        for (key, line) in lines {
            if line.trim().is_empty() {
                return Err(Error::invalid(format!("messages.{key} cannot be empty")));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_per_page_min() -> u64 {
    10
}

fn default_per_page_max() -> u64 {
    100
}

fn default_per_page_default() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_generic() -> String {
    "An error occurred. Please try again.".to_string()
}

fn default_not_found() -> String {
    "The page you are trying to access does not exist.".to_string()
}

fn default_authentication() -> String {
    "An error occurred. Please make sure you are logged in and try again.".to_string()
}

fn default_validation() -> String {
    "An error occurred. Please check your data and try again.".to_string()
}

impl EnvelopeConfig {
    /// Load configuration from all sources
    ///
    /// Config files are merged lowest priority first, so `./envelope.toml`
    /// overrides the XDG file, which overrides the system file.
    /// Environment variables (ACTON_ENVELOPE_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(EnvelopeConfig::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("ACTON_ENVELOPE_").split("__"));

        Self::extract(figment)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses the search path and loads directly from the given path.
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(EnvelopeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ACTON_ENVELOPE_").split("__"));

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: EnvelopeConfig = figment.extract()?;
        config.messages.validate()?;
        Ok(config)
    }

    /// Find all possible config file paths
    ///
    /// Returns paths in priority order (highest first).
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("envelope.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("acton-envelope");
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/acton-envelope/config.toml"));

        paths
    }

    /// Message mode derived from `use_feedback`
    pub fn feedback_mode(&self) -> FeedbackMode {
        FeedbackMode::from(self.use_feedback)
    }

    /// Pagination bounds, each floored at 1
    pub fn page_bounds(&self) -> PageBounds {
        PageBounds::new(self.per_page_min, self.per_page_max, self.per_page_default)
    }

    /// Name of the query parameter carrying `field`, following `camel_case`
    pub fn query_field(&self, field: &str) -> String {
        if self.camel_case {
            crate::case::camel_case(field)
        } else {
            field.to_string()
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            camel_case: false,
            use_feedback: default_true(),
            per_page_min: default_per_page_min(),
            per_page_max: default_per_page_max(),
            per_page_default: default_per_page_default(),
            exception_wrapper: None,
            log_level: default_log_level(),
            messages: ErrorCatalog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EnvelopeConfig::default();
        assert!(!config.camel_case);
        assert!(config.use_feedback);
        assert_eq!(config.per_page_min, 10);
        assert_eq!(config.per_page_max, 100);
        assert_eq!(config.per_page_default, 10);
        assert!(config.exception_wrapper.is_none());
        assert_eq!(config.feedback_mode(), FeedbackMode::Feedback);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
camel_case = true
use_feedback = false
per_page_max = 50

[messages]
not_found = "Nothing here."
"#
        )
        .unwrap();

        let config = EnvelopeConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert!(config.camel_case);
        assert_eq!(config.feedback_mode(), FeedbackMode::Plain);
        assert_eq!(config.per_page_max, 50);
        assert_eq!(config.per_page_min, 10);
        assert_eq!(config.messages.not_found, "Nothing here.");
        assert_eq!(config.messages.generic, default_generic());
    }

    #[test]
    fn test_load_from_rejects_empty_catalog_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[messages]\ngeneric = \"\"").unwrap();

        let result = EnvelopeConfig::load_from(file.path().to_str().unwrap());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_catalog_line_per_status() {
        let catalog = ErrorCatalog::default();
        assert_eq!(catalog.for_status(StatusCode::UNAUTHORIZED), catalog.authentication);
        assert_eq!(catalog.for_status(StatusCode::NOT_FOUND), catalog.not_found);
        assert_eq!(
            catalog.for_status(StatusCode::UNPROCESSABLE_ENTITY),
            catalog.validation
        );
        assert_eq!(catalog.for_status(StatusCode::CONFLICT), catalog.generic);
    }

    #[test]
    fn test_query_field_follows_camel_case() {
        let mut config = EnvelopeConfig::default();
        assert_eq!(config.query_field("per_page"), "per_page");

        config.camel_case = true;
        assert_eq!(config.query_field("per_page"), "perPage");
        assert_eq!(config.query_field("page"), "page");
    }
}
