pub mod cli;
pub mod css_parser;
pub mod dom;
pub mod downloader;
pub mod error;
pub mod file_manager;
pub mod html_importer;
pub mod import_log;
pub mod logging;
pub mod settings;
pub mod theme_import;
pub mod url_converter;

// Re-export main types for convenience
pub use cli::ImportCommand;
pub use css_parser::{CssParser, CssRewrite};
pub use downloader::{
    AssetRegistry, DownloadResult, Fetch, FileDownloader, FsAssetRegistry, HttpFetcher, ResourceMap,
};
pub use error::FetchError;
pub use file_manager::FileManager;
pub use html_importer::{HtmlHeaderImporter, LinkPaths};
pub use import_log::{ImportLog, LogEntry, LogLevel};
pub use settings::ImportSettings;
pub use theme_import::{ImportSummary, ImportedPage, ThemeImporter};
pub use url_converter::UrlConverter;
