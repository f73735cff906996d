//! Application configuration.
//!
//! Configuration is read from a YAML file. Every key is optional: a missing
//! file or a missing key falls back to the defaults below, and command-line
//! flags override whatever the file says.
//!
//! ```yaml
//! feed_url: http://www.ilribelle.com/la-voce-del-ribelle/rss.xml
//! data_dir: ./data
//! site: ilribelle
//! max_parallel_items: 3      # null for no bound
//! ttl_minutes: null          # null to follow the feed's <ttl>
//! ```

use crate::cli::Cli;
use crate::error::{NewsError, NewsResult};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_FEED_URL: &str = "http://www.ilribelle.com/la-voce-del-ribelle/rss.xml";
pub const DEFAULT_STORE_FILE: &str = "storednews.json";
/// Update interval used when the feed declares a ttl of zero.
pub const FALLBACK_TTL_MINUTES: u64 = 60;

/// Which item completer to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// Scrape www.ilribelle.com article pages.
    #[default]
    IlRibelle,
    /// Take items as the feed delivers them.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed_url: String,
    pub data_dir: PathBuf,
    pub store_file: String,
    pub downloads_dir: PathBuf,
    pub site: Site,
    pub max_parallel_items: Option<usize>,
    pub temporary_cache_size: usize,
    pub keep_news_for_days: u32,
    pub ttl_minutes: Option<u64>,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            data_dir: PathBuf::from("data"),
            store_file: DEFAULT_STORE_FILE.to_string(),
            downloads_dir: PathBuf::from("downloads"),
            site: Site::default(),
            max_parallel_items: Some(3),
            temporary_cache_size: crate::channel::DEFAULT_TEMPORARY_CACHE_SIZE,
            keep_news_for_days: 60,
            ttl_minutes: None,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Parse a YAML document, then check the result.
    pub fn from_yaml(text: &str) -> NewsResult<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Unreadable files, invalid YAML and invalid values. A missing file is
    /// not an error and yields the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> NewsResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config = Self::from_yaml(&text)?;
                info!("Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(url) = &cli.feed_url {
            self.feed_url = url.clone();
        }
        self
    }

    pub fn validate(&self) -> NewsResult<()> {
        if url::Url::parse(&self.feed_url).is_err() {
            return Err(NewsError::Config(format!("feed_url is not a URL: {}", self.feed_url)));
        }
        if self.max_parallel_items == Some(0) {
            return Err(NewsError::Config("max_parallel_items must be at least 1".into()));
        }
        if self.store_file.is_empty() {
            return Err(NewsError::Config("store_file must not be empty".into()));
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }

    /// Directory for the channel's minted files. Files in it that nothing
    /// owns are deleted, so nothing else may live there.
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    /// Time between two updates. A configured ttl wins; otherwise the feed's
    /// ttl is used, or [`FALLBACK_TTL_MINUTES`] when the feed says zero.
    pub fn update_interval(&self, channel_ttl_minutes: u64) -> Duration {
        let minutes = match self.ttl_minutes {
            Some(m) if m > 0 => m,
            _ if channel_ttl_minutes > 0 => channel_ttl_minutes,
            _ => FALLBACK_TTL_MINUTES,
        };
        Duration::from_secs(minutes * 60)
    }

    /// News published at or before the returned instant is expired.
    pub fn expiry_cutoff(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        now - ChronoDuration::days(i64::from(self.keep_news_for_days))
    }
}
