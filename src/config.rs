//! Configuration file parser for `feedparse.toml`.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`, which matches the library defaults. Unknown keys are
//! accepted by serde and logged as a warning, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::api::{Capabilities, ParseOptions};
use crate::feed::fetcher::{RequestOptions, DEFAULT_USER_AGENT, MAX_FEED_SIZE};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Every section uses `#[serde(default)]` so any subset of keys can be
/// specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolve relative URIs in links and embedded markup.
    pub resolve_relative_uris: bool,

    /// Strip unsafe markup from HTML content.
    pub sanitize_html: bool,

    /// Resolve the encoding from a bounded prefix instead of the whole document.
    pub optimistic_encoding_detection: bool,

    /// Try the strict XML parser before the loose one.
    pub strict_parser: bool,

    /// Use statistical charset detection as an encoding fallback.
    pub charset_detection: bool,

    pub http: HttpConfig,
}

/// The `[http]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Largest response body accepted, after decompression.
    pub max_body_bytes: usize,

    /// Sent as `Referer` when non-empty.
    pub referrer: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolve_relative_uris: true,
            sanitize_html: true,
            optimistic_encoding_detection: true,
            strict_parser: true,
            charset_detection: true,
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            max_body_bytes: MAX_FEED_SIZE,
            referrer: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MiB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "resolve_relative_uris",
        "sanitize_html",
        "optimistic_encoding_detection",
        "strict_parser",
        "charset_detection",
        "http",
    ];

    const KNOWN_HTTP_KEYS: [&'static str; 4] = ["user_agent", "timeout_secs", "max_body_bytes", "referrer"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), strict = config.strict_parser, "Loaded configuration");
        Ok(config)
    }

    /// Parses configuration text; blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
            if let Some(http) = raw.get("http").and_then(toml::Value::as_table) {
                for key in http.keys() {
                    if !Self::KNOWN_HTTP_KEYS.contains(&key.as_str()) {
                        tracing::warn!(key = %format!("http.{key}"), "Unknown key in config file, ignoring");
                    }
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Parse behavior described by this configuration.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            resolve_relative_uris: self.resolve_relative_uris,
            sanitize_html: self.sanitize_html,
            optimistic_encoding_detection: self.optimistic_encoding_detection,
            request: RequestOptions {
                user_agent: self.http.user_agent.clone(),
                referrer: self.http.referrer.clone().filter(|r| !r.is_empty()),
                timeout: Duration::from_secs(self.http.timeout_secs),
                max_body_bytes: self.http.max_body_bytes,
                ..RequestOptions::default()
            },
            ..ParseOptions::default()
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            strict_parser: self.strict_parser,
            charset_detection: self.charset_detection,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("feedparse_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedparse.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.resolve_relative_uris);
        assert!(config.sanitize_html);
        assert!(config.optimistic_encoding_detection);
        assert!(config.strict_parser);
        assert!(config.charset_detection);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.http.user_agent.starts_with("feedparse/"));
        assert!(config.http.referrer.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedparse_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let path = write_config("empty", "");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "sanitize_html = false\n");
        let config = Config::load(&path).unwrap();
        assert!(!config.sanitize_html);
        assert!(config.resolve_relative_uris);
        assert_eq!(config.http, HttpConfig::default());
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
resolve_relative_uris = false
sanitize_html = false
optimistic_encoding_detection = false
strict_parser = false
charset_detection = false

[http]
user_agent = "TestAgent/1.0"
timeout_secs = 3
max_body_bytes = 2048
referrer = "https://example.com/"
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert!(!config.resolve_relative_uris);
        assert!(!config.strict_parser);
        assert_eq!(config.http.user_agent, "TestAgent/1.0");
        assert_eq!(config.http.timeout_secs, 3);
        assert_eq!(config.http.max_body_bytes, 2048);
        assert_eq!(config.http.referrer.as_deref(), Some("https://example.com/"));
        cleanup(&path);
    }

    #[test]
    fn test_partial_http_section() {
        let config = Config::from_toml("[http]\ntimeout_secs = 30\n").unwrap();
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("feedparse/"));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
sanitize_html = true
totally_fake_key = "should not fail"

[http]
retries = 3
"#;
        let config = Config::from_toml(content).unwrap();
        assert!(config.sanitize_html);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let result = Config::from_toml("strict_parser = \"yes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_file_at_size_limit_accepted() {
        let mut content = "sanitize_html = true\n".to_string();
        while content.len() < 1_048_576 - 20 {
            content.push_str("# padding comment\n");
        }
        content.truncate(1_048_576);
        let path = write_config("at_limit", &content);
        assert!(Config::load(&path).is_ok());
        cleanup(&path);
    }

    #[test]
    fn test_parse_options_and_capabilities() {
        let mut config = Config::default();
        config.sanitize_html = false;
        config.strict_parser = false;
        config.http.timeout_secs = 5;
        config.http.referrer = Some(String::new());

        let options = config.parse_options();
        assert!(!options.sanitize_html);
        assert!(options.resolve_relative_uris);
        assert_eq!(options.request.timeout, Duration::from_secs(5));
        assert_eq!(options.request.referrer, None);
        assert!(options.response_headers.is_empty());

        let capabilities = config.capabilities();
        assert!(!capabilities.strict_parser);
        assert!(capabilities.charset_detection);
    }
}
