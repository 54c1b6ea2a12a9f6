//! TOML configuration.
//!
//! ```toml
//! [org]
//! instance_url = "https://example.my.salesforce.com"
//! api_version = "v57.0"
//!
//! [auth]
//! client_id = "3MVG9..."
//! redirect_uri = "http://localhost:8080/oauth/callback"
//!
//! [upload]
//! root = "./documents"
//! naming = "auto"
//! batch_size = 25
//!
//! [distribution]
//! enabled = false
//!
//! [logging]
//! level = "info"
//! ```
//!
//! `SF_INSTANCE_URL`, `SF_CLIENT_ID` and `SF_REDIRECT_URI` override the
//! corresponding file values when set.

use anyhow::{bail, Context, Result};
use doc_uploader_core::NamingConvention;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Most sub-requests the composite endpoint accepts in one call.
pub const MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub org: OrgConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrgConfig {
    #[serde(default)]
    pub instance_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_bulk_lookup_path")]
    pub bulk_lookup_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            api_version: default_api_version(),
            bulk_lookup_path: default_bulk_lookup_path(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_version() -> String {
    "v57.0".to_string()
}
fn default_bulk_lookup_path() -> String {
    "/services/apexrest/admin/bulk-lookup".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            redirect_uri: default_redirect_uri(),
            login_timeout_secs: default_login_timeout_secs(),
        }
    }
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/oauth/callback".to_string()
}
fn default_login_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub naming: NamingConvention,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Descend into symlinked directories. Symlinked files are always read.
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            naming: NamingConvention::default(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_concurrency() -> usize {
    1
}

/// Public distribution links for uploaded content.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DistributionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Fail the run instead of falling back to the record deep link.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults plus environment overrides, for commands that can run
    /// without a config file.
    pub fn minimal() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SF_INSTANCE_URL") {
            self.org.instance_url = url;
        }
        if let Ok(client_id) = std::env::var("SF_CLIENT_ID") {
            self.auth.client_id = Some(client_id);
        }
        if let Ok(uri) = std::env::var("SF_REDIRECT_URI") {
            self.auth.redirect_uri = uri;
        }
    }

    /// Checks needed only by commands that talk to the org.
    pub fn validate_remote(&self) -> Result<()> {
        let url = self.org.instance_url.trim();
        if url.is_empty() {
            bail!("org.instance_url must be set (or SF_INSTANCE_URL)");
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            bail!("org.instance_url must be an http(s) URL, got '{}'", url);
        }
        Ok(())
    }

    /// Instance URL without a trailing slash.
    pub fn instance_url(&self) -> &str {
        self.org.instance_url.trim().trim_end_matches('/')
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides();

    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.upload.batch_size == 0 || config.upload.batch_size > MAX_BATCH_SIZE {
        bail!(
            "upload.batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE,
            config.upload.batch_size
        );
    }

    if config.upload.concurrency == 0 {
        bail!("upload.concurrency must be >= 1");
    }

    if !config.org.api_version.starts_with('v') {
        bail!(
            "org.api_version must look like 'v57.0', got '{}'",
            config.org.api_version
        );
    }

    if !config.org.bulk_lookup_path.starts_with('/') {
        bail!("org.bulk_lookup_path must start with '/'");
    }

    if config.org.timeout_secs == 0 {
        bail!("org.timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("[org]\ninstance_url = \"https://x.my.salesforce.com\"\n").unwrap();
        assert_eq!(config.upload.batch_size, 25);
        assert_eq!(config.upload.concurrency, 1);
        assert_eq!(config.upload.naming, NamingConvention::Auto);
        assert_eq!(config.org.api_version, "v57.0");
        assert!(!config.distribution.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_batch_size_ceiling() {
        let err = parse("[upload]\nbatch_size = 26\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
        assert!(parse("[upload]\nbatch_size = 0\n").is_err());
        assert!(parse("[upload]\nbatch_size = 10\n").is_ok());
    }

    #[test]
    fn test_naming_values() {
        let config = parse("[upload]\nnaming = \"flat\"\n").unwrap();
        assert_eq!(config.upload.naming, NamingConvention::Flat);
        assert!(parse("[upload]\nnaming = \"sideways\"\n").is_err());
    }

    #[test]
    fn test_validate_remote() {
        let mut config = Config::default();
        assert!(config.validate_remote().is_err());
        config.org.instance_url = "ftp://nope".into();
        assert!(config.validate_remote().is_err());
        config.org.instance_url = "https://x.my.salesforce.com/".into();
        assert!(config.validate_remote().is_ok());
        assert_eq!(config.instance_url(), "https://x.my.salesforce.com");
    }
}
