use anyhow::{Context, Result};
use markup5ever_rcdom::Handle;
use serde::Serialize;

use crate::dom;
use crate::downloader::{DownloadResult, FileDownloader, ResourceMap};
use crate::html_importer::HtmlHeaderImporter;
use crate::import_log::{ImportLog, LogEntry};
use crate::settings::ImportSettings;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub site_url: String,
    pub stylesheets: Vec<DownloadResult>,
    pub theme_files: Vec<DownloadResult>,
    pub assets: Vec<DownloadResult>,
    pub log: Vec<LogEntry>,
}

impl ImportSummary {
    pub fn downloads(&self) -> impl Iterator<Item = &DownloadResult> {
        self.stylesheets
            .iter()
            .chain(self.theme_files.iter())
            .chain(self.assets.iter())
    }

    pub fn failures(&self) -> usize {
        self.downloads().filter(|r| !r.success).count()
    }
}

#[derive(Debug, Clone)]
pub struct ImportedPage {
    pub html: String,
    pub summary: ImportSummary,
}

/// Drives one page through the whole theme import.
pub struct ThemeImporter {
    settings: ImportSettings,
    downloader: FileDownloader,
}

impl ThemeImporter {
    pub fn new(settings: ImportSettings, downloader: FileDownloader) -> Self {
        Self {
            settings,
            downloader,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub async fn fetch_and_import(&self) -> Result<ImportedPage> {
        let html = self
            .downloader
            .fetch_text(&self.settings.site_url)
            .await
            .with_context(|| format!("Failed to fetch {}", self.settings.site_url))?;
        self.import_html(&html).await
    }

    pub async fn import_html(&self, html: &str) -> Result<ImportedPage> {
        let dom = dom::parse_html(html);
        let summary = self.import_document(&dom.document).await?;
        let html = dom::serialize_document(&dom.document)?;
        Ok(ImportedPage { html, summary })
    }

    /// Stylesheets are downloaded and rewritten first so the resources they
    /// reference join the same theme batch as scripts, icons and inline
    /// styles. Images and Flash movies follow as assets.
    pub async fn import_document(&self, document: &Handle) -> Result<ImportSummary> {
        let log = ImportLog::new();
        let mut importer = HtmlHeaderImporter::new(
            document.clone(),
            &self.settings,
            self.downloader.clone(),
            log.clone(),
        )?;

        let links = importer.link_paths();
        let stylesheets = self
            .downloader
            .download_files(&links.stylesheets, &log, false)
            .await;
        let downloaded: ResourceMap = stylesheets
            .iter()
            .filter(|r| r.success && !r.skipped)
            .map(|r| (r.url.clone(), r.destination.clone()))
            .collect();

        let mut theme_files = links.others;
        theme_files.extend(importer.process_css_files(&downloaded).await);
        theme_files.extend(importer.script_paths());
        theme_files.extend(importer.process_inline_styles().await);
        let theme_results = self
            .downloader
            .download_files(&theme_files, &log, false)
            .await;

        let mut assets = importer.process_header_and_body_images();
        assets.extend(importer.process_flash_files(&self.settings.site_name));
        let asset_results = self.downloader.download_files(&assets, &log, true).await;

        log.info(
            "import",
            format!(
                "Imported {} stylesheets, {} theme files and {} assets",
                stylesheets.len(),
                theme_results.len(),
                asset_results.len()
            ),
        );

        Ok(ImportSummary {
            site_url: self.settings.site_url.clone(),
            stylesheets,
            theme_files: theme_results,
            assets: asset_results,
            log: log.entries(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_support::MapFetcher;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn result(success: bool) -> DownloadResult {
        DownloadResult {
            url: "http://example.com/a".to_string(),
            destination: "/theme/a".to_string(),
            success,
            skipped: false,
            message: String::new(),
        }
    }

    #[test]
    fn counts_failures_across_batches() {
        let summary = ImportSummary {
            stylesheets: vec![result(true), result(false)],
            theme_files: vec![result(false)],
            assets: vec![result(true)],
            ..Default::default()
        };
        assert_eq!(summary.downloads().count(), 4);
        assert_eq!(summary.failures(), 2);
    }

    #[tokio::test]
    async fn stylesheet_in_flight_elsewhere_is_not_parsed_early() {
        let temp_dir = tempdir().unwrap();
        let fetcher = MapFetcher::new()
            .with("http://example.com/main.css", "body { color: red; }")
            .with_delay(Duration::from_millis(50));
        let settings = ImportSettings::new(
            "http://example.com/index.html",
            "mysite",
            temp_dir.path(),
            "/theme-url",
        );
        let downloader = FileDownloader::new(Arc::new(fetcher), temp_dir.path(), 4);
        let first = ThemeImporter::new(settings.clone(), downloader.clone());
        let second = ThemeImporter::new(settings, downloader);
        let html = r#"<html><head><link rel="stylesheet" href="main.css"></head><body></body></html>"#;

        let (first, second) = tokio::join!(first.import_html(html), second.import_html(html));
        let (first, second) = (first.unwrap().summary, second.unwrap().summary);

        assert!(first.stylesheets[0].success && !first.stylesheets[0].skipped);
        assert!(second.stylesheets[0].skipped);
        assert!(
            second.log.iter().all(|e| e.level != crate::import_log::LogLevel::Error),
            "{:?}",
            second.log
        );
        assert_eq!(first.failures() + second.failures(), 0);
    }
}
