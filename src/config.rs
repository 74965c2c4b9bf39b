//! Configuration for the crawler.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scraper::fetcher::WaitPolicy;
use crate::scraper::{BASE_URL, BEGIN_URL};

/// Site entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_begin_url")]
    pub begin_url: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_begin_url() -> String {
    BEGIN_URL.to_string()
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            begin_url: default_begin_url(),
            base_url: default_base_url(),
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeConfig {
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Upper bound of every wait
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_executable() -> String {
    if cfg!(target_os = "macos") {
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
    } else if cfg!(target_os = "windows") {
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
    } else {
        "google-chrome"
    }
    .to_string()
}

fn default_headless() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            headless: default_headless(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl ChromeConfig {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Keep a copy of every fetched page
    #[serde(default = "default_archive")]
    pub archive: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/keiba.db")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data/html")
}

fn default_archive() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            archive_dir: default_archive_dir(),
            archive: default_archive(),
        }
    }
}

/// Crawler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: ChromeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl CrawlConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&CrawlConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (KEIBA_BROWSER__TIMEOUT_SECS, etc.)
            .add_source(
                config::Environment::with_prefix("KEIBA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
