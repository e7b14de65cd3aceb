use clap::builder::TypedValueParser as _;
use clap::Parser;
use std::path::PathBuf;

use crate::settings::{ImportSettings, DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(
    name = "theme-import",
    about = "Imports the theme of a web page into a local theme tree",
    version,
    long_about = "Downloads the stylesheets, scripts, fonts and images a page depends on into a theme directory, rewrites the page and its CSS to point at the imported copies, and stores images as assets below the asset-upload folder."
)]
pub struct ImportCommand {
    /// The URL of the page whose theme is imported
    #[arg(required = true)]
    pub url: String,

    /// Site name used for asset folders and generated stylesheet names
    #[arg(short = 'n', long, required = true)]
    pub site_name: String,

    /// Theme root directory imported files are written to
    #[arg(short = 't', long, default_value = "./theme")]
    pub theme_dir: PathBuf,

    /// URL prefix the theme root directory is served under
    #[arg(short = 'u', long, default_value = "/theme")]
    pub theme_url: String,

    /// Directory that mirrors the CMS asset folder for images and Flash movies
    #[arg(short = 'a', long, default_value = "./assets")]
    pub asset_dir: PathBuf,

    /// Maximum concurrent downloads
    #[arg(short = 'c', long, default_value_t = DEFAULT_MAX_CONCURRENT, value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub max_concurrent: usize,

    /// Timeout for requests in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Where to write the rewritten page (defaults to <theme-dir>/index.html)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a JSON report of downloads and log entries
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl ImportCommand {
    pub fn settings(&self) -> ImportSettings {
        ImportSettings {
            site_url: self.url.clone(),
            site_name: self.site_name.clone(),
            theme_root_dir: self.theme_dir.clone(),
            theme_root_url: self.theme_url.clone(),
            asset_root_dir: self.asset_dir.clone(),
            max_concurrent: self.max_concurrent,
            timeout_secs: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.theme_dir.join("index.html"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_args() {
        let args = ImportCommand::try_parse_from([
            "theme-import",
            "https://example.com",
            "-n", "mysite",
        ])
        .unwrap();

        assert_eq!(args.url, "https://example.com");
        assert_eq!(args.site_name, "mysite");
        assert_eq!(args.theme_dir, PathBuf::from("./theme"));
        assert_eq!(args.theme_url, "/theme");
        assert_eq!(args.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(args.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(!args.verbose);
        assert_eq!(args.output_path(), PathBuf::from("./theme/index.html"));
    }

    #[test]
    fn test_parse_all_args() {
        let args = ImportCommand::try_parse_from([
            "theme-import",
            "https://example.com/home.html",
            "--site-name", "acme",
            "-t", "/srv/theme",
            "-u", "/web_resources/themes/acme",
            "-a", "/srv/assets",
            "-c", "20",
            "--timeout", "5",
            "-o", "/srv/out.html",
            "--report", "/srv/report.json",
            "--verbose",
        ])
        .unwrap();

        let settings = args.settings();
        assert_eq!(settings.site_url, "https://example.com/home.html");
        assert_eq!(settings.theme_root_dir, PathBuf::from("/srv/theme"));
        assert_eq!(settings.theme_root_url, "/web_resources/themes/acme");
        assert_eq!(settings.asset_root_dir, PathBuf::from("/srv/assets"));
        assert_eq!(settings.max_concurrent, 20);
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(args.output_path(), PathBuf::from("/srv/out.html"));
        assert_eq!(args.report, Some(PathBuf::from("/srv/report.json")));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_missing_url() {
        let result = ImportCommand::try_parse_from(["theme-import", "-n", "mysite"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_missing_site_name() {
        let result = ImportCommand::try_parse_from(["theme-import", "https://example.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_concurrent() {
        let result = ImportCommand::try_parse_from([
            "theme-import",
            "https://example.com",
            "-n", "mysite",
            "-c", "0",
        ]);
        assert!(result.is_err());
    }
}
