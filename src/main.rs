use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use theme_import::cli::ImportCommand;
use theme_import::downloader::{FileDownloader, FsAssetRegistry, HttpFetcher};
use theme_import::file_manager::FileManager;
use theme_import::logging::init_logging;
use theme_import::theme_import::ThemeImporter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ImportCommand::parse();
    init_logging(args.verbose);

    let settings = args.settings();
    settings.validate()?;

    let fetcher = HttpFetcher::new(&settings)?;
    let downloader = FileDownloader::new(
        Arc::new(fetcher),
        &settings.theme_root_dir,
        settings.max_concurrent,
    )
    .with_asset_registry(Arc::new(FsAssetRegistry::new(&settings.asset_root_dir)));

    println!("🚀 Importing theme from: {}", settings.site_url.blue());
    println!("📁 Theme directory: {:?}", settings.theme_root_dir);
    println!("🔗 Theme URL: {}", settings.theme_root_url);

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    progress_bar.enable_steady_tick(Duration::from_millis(100));
    progress_bar.set_message(format!("Importing {}", settings.site_url));

    let importer = ThemeImporter::new(settings.clone(), downloader);
    let page = importer.fetch_and_import().await?;
    progress_bar.finish_and_clear();

    let output = args.output_path();
    let output_dir = output
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    FileManager::new(&output_dir).save_file(&output, page.html.as_bytes())?;
    println!("💾 Saved rewritten page to: {:?}", output);

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&page.summary)?;
        fs::write(report, json).with_context(|| format!("Failed to write report: {:?}", report))?;
        println!("📊 Report written to: {:?}", report);
    }

    let summary = &page.summary;
    println!(
        "📊 {} stylesheets, {} theme files, {} assets",
        summary.stylesheets.len(),
        summary.theme_files.len(),
        summary.assets.len()
    );

    let failures = summary.failures();
    if failures > 0 {
        for result in summary.downloads().filter(|r| !r.success) {
            eprintln!("❌ {}", result.message.red());
        }
        println!("⚠️  Theme imported with {} failed downloads", failures.to_string().yellow());
    } else {
        println!("✅ Theme imported successfully!");
    }

    Ok(())
}
