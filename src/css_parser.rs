use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use url::Url;

use crate::downloader::{FileDownloader, ResourceMap};
use crate::file_manager::FileManager;
use crate::import_log::ImportLog;
use crate::url_converter::{is_absolute_reference, UrlConverter};

const CSS_REFERENCE_PATTERN: &str = r#"(?i)@import\s+(?:url\(\s*['"]?(?P<import_url>[^'")\s]+)['"]?\s*\)|['"](?P<import_str>[^'"]+)['"])(?P<media>[^;]*);|url\(\s*['"]?(?P<url>[^'")]*?)['"]?\s*\)"#;

fn css_reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(CSS_REFERENCE_PATTERN).expect("CSS reference pattern is valid"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CssReferenceKind {
    Import { media: String },
    Url,
}

/// One `@import` statement or `url(...)` occurrence in a stylesheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CssReference {
    pub span: Range<usize>,
    pub target: String,
    pub kind: CssReferenceKind,
}

pub fn scan_references(css: &str) -> Vec<CssReference> {
    css_reference_regex()
        .captures_iter(css)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let (target, kind) = if let Some(url) = caps.name("url") {
                (url.as_str(), CssReferenceKind::Url)
            } else {
                let target = caps.name("import_url").or_else(|| caps.name("import_str"))?;
                let media = caps.name("media").map_or("", |m| m.as_str());
                (
                    target.as_str(),
                    CssReferenceKind::Import {
                        media: media.trim_end().to_string(),
                    },
                )
            };
            Some(CssReference {
                span: whole.range(),
                target: target.trim().to_string(),
                kind,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CssRewrite {
    pub resources: ResourceMap,
    pub text: String,
}

/// Rewrites stylesheet references into the theme tree.
///
/// One parser is one session: `@import`ed stylesheets are downloaded and
/// parsed at most once, which also stops import cycles.
pub struct CssParser {
    converter: Arc<UrlConverter>,
    downloader: FileDownloader,
    files: FileManager,
    log: ImportLog,
    processed: HashSet<String>,
    unavailable: HashSet<String>,
}

impl CssParser {
    pub fn new(converter: Arc<UrlConverter>, downloader: FileDownloader, log: ImportLog) -> Self {
        let files = downloader.files().clone();
        Self {
            converter,
            downloader,
            files,
            log,
            processed: HashSet::new(),
            unavailable: HashSet::new(),
        }
    }

    /// Rewrites already-downloaded stylesheets in place and returns the
    /// resources they reference.
    pub async fn parse(&mut self, css_files: &ResourceMap) -> ResourceMap {
        self.processed.extend(css_files.keys().cloned());

        let mut resources = ResourceMap::new();
        for (url, local_path) in css_files {
            let found = self.parse_file(url, Path::new(local_path)).await;
            resources.extend(found);
        }
        resources
    }

    /// Rewrites an inline stylesheet or `style` attribute resolved against
    /// `base_url`.
    pub async fn parse_inline(&mut self, base_url: &str, css: &str) -> CssRewrite {
        let base = match Url::parse(base_url) {
            Ok(base) => base,
            Err(e) => {
                self.log
                    .error("css", format!("Malformed base URL {:?}: {}", base_url, e));
                return CssRewrite {
                    resources: ResourceMap::new(),
                    text: css.to_string(),
                };
            }
        };
        self.rewrite(&base, css).await
    }

    fn parse_file<'a>(&'a mut self, url: &'a str, local_path: &'a Path) -> BoxFuture<'a, ResourceMap> {
        async move {
            if local_path
                .to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(".gz")
            {
                self.log
                    .warn("css", format!("Skipping compressed stylesheet {}", url));
                return ResourceMap::new();
            }

            let base = match Url::parse(url) {
                Ok(base) => base,
                Err(e) => {
                    self.log
                        .error("css", format!("Malformed stylesheet URL {:?}: {}", url, e));
                    return ResourceMap::new();
                }
            };

            let css = match self.files.load_text(local_path) {
                Ok(css) => css,
                Err(e) => {
                    self.log.error("css", format!("{:#}", e));
                    return ResourceMap::new();
                }
            };

            let rewritten = self.rewrite(&base, &css).await;
            if let Err(e) = self.files.save_file(local_path, rewritten.text.as_bytes()) {
                self.log.error("css", format!("{:#}", e));
            } else {
                tracing::debug!("Rewrote stylesheet {:?}", local_path);
            }
            rewritten.resources
        }
        .boxed()
    }

    fn rewrite<'a>(&'a mut self, base: &'a Url, css: &'a str) -> BoxFuture<'a, CssRewrite> {
        async move {
            let mut text = String::with_capacity(css.len());
            let mut resources = ResourceMap::new();
            let mut last = 0;

            for reference in scan_references(css) {
                text.push_str(&css[last..reference.span.start]);
                let replacement = match &reference.kind {
                    CssReferenceKind::Import { media } => {
                        self.rewrite_import(base, &reference.target, media, &mut resources)
                            .await
                    }
                    CssReferenceKind::Url => self.rewrite_url(base, &reference.target, &mut resources),
                };
                text.push_str(
                    replacement
                        .as_deref()
                        .unwrap_or(&css[reference.span.clone()]),
                );
                last = reference.span.end;
            }
            text.push_str(&css[last..]);

            CssRewrite { resources, text }
        }
        .boxed()
    }

    async fn rewrite_import(
        &mut self,
        base: &Url,
        target: &str,
        media: &str,
        resources: &mut ResourceMap,
    ) -> Option<String> {
        if self.converter.is_theme_link(target) {
            return None;
        }
        let full_url = self.converter.full_url_from(base, target)?;
        if self.unavailable.contains(&full_url) {
            return None;
        }
        let local_path = self.converter.file_system_path_for_css(&full_url)?;

        if self.processed.insert(full_url.clone()) {
            if !self.files.file_exists(&local_path) {
                let result = self
                    .downloader
                    .download_file(&full_url, &local_path, &self.log)
                    .await;
                if !result.success {
                    self.unavailable.insert(full_url);
                    return None;
                }
            }
            let nested = self.parse_file(&full_url, &local_path).await;
            resources.extend(nested);
        }

        if is_absolute_reference(target) {
            return None;
        }
        let link = self.converter.convert_to_theme_link_for_css(&full_url)?;
        Some(format!("@import \"{}\"{};", link, media))
    }

    fn rewrite_url(&self, base: &Url, target: &str, resources: &mut ResourceMap) -> Option<String> {
        if is_absolute_reference(target) || self.converter.is_theme_link(target) {
            return None;
        }
        let full_url = self.converter.full_url_from(base, target)?;
        let local_path = self.converter.file_system_path(&full_url)?;
        let link = self.converter.theme_link_for_path(&local_path)?;

        resources.insert(full_url, local_path.display().to_string());
        Some(format!("url({})", quote_if_needed(&link)))
    }
}

fn quote_if_needed(link: &str) -> String {
    if link
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"'))
    {
        format!("\"{}\"", link.replace('"', "\\\""))
    } else {
        link.to_string()
    }
}
