use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_MAX_CONCURRENT: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "ThemeImport/1.0";

/// Coordinates of one theme import: the page being imported and the theme
/// root it is imported into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub site_url: String,
    pub site_name: String,
    pub theme_root_dir: PathBuf,
    pub theme_root_url: String,
    pub asset_root_dir: PathBuf,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl ImportSettings {
    pub fn new(
        site_url: &str,
        site_name: &str,
        theme_root_dir: impl Into<PathBuf>,
        theme_root_url: &str,
    ) -> Self {
        let theme_root_dir = theme_root_dir.into();
        let asset_root_dir = theme_root_dir.join("assets");
        Self {
            site_url: site_url.to_string(),
            site_name: site_name.to_string(),
            theme_root_dir,
            theme_root_url: theme_root_url.to_string(),
            asset_root_dir,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn parsed_site_url(&self) -> Result<Url> {
        let url = Url::parse(&self.site_url)
            .with_context(|| format!("Failed to parse site URL: {}", self.site_url))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => bail!("Site URL must use http or https, got {}", other),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.parsed_site_url()?;
        if self.site_name.trim().is_empty() {
            bail!("Site name must not be empty");
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout must be at least 1 second");
        }
        Ok(())
    }
}
