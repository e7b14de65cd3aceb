use anyhow::Result;
use markup5ever_rcdom::Handle;
use std::sync::Arc;

use crate::css_parser::CssParser;
use crate::dom::{find_elements, find_elements_with_attr, get_attr, set_attr, set_text_content, text_content};
use crate::downloader::{FileDownloader, ResourceMap};
use crate::import_log::ImportLog;
use crate::settings::ImportSettings;
use crate::url_converter::UrlConverter;

/// Downloads discovered through `<link>` elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkPaths {
    pub stylesheets: ResourceMap,
    /// Icons and other non-stylesheet links.
    pub others: ResourceMap,
}

struct ThemeTarget {
    url: String,
    path: String,
    link: String,
}

/// Rewrites the references of a parsed page to the imported theme.
///
/// Every pass mutates the document in place and returns the downloads it
/// discovered; serializing the document is left to the caller.
pub struct HtmlHeaderImporter {
    document: Handle,
    converter: Arc<UrlConverter>,
    css_parser: CssParser,
    log: ImportLog,
}

impl HtmlHeaderImporter {
    pub fn new(
        document: Handle,
        settings: &ImportSettings,
        downloader: FileDownloader,
        log: ImportLog,
    ) -> Result<Self> {
        let converter = Arc::new(UrlConverter::new(settings, log.clone())?);
        let css_parser = CssParser::new(converter.clone(), downloader, log.clone());

        Ok(Self {
            document,
            converter,
            css_parser,
            log,
        })
    }

    pub fn converter(&self) -> &UrlConverter {
        &self.converter
    }

    pub fn link_paths(&self) -> LinkPaths {
        let mut paths = LinkPaths::default();

        for link in find_elements(&self.document, "link") {
            let (Some(href), Some(rel)) = (get_attr(&link, "href"), get_attr(&link, "rel")) else {
                continue;
            };
            let rel = rel.to_ascii_lowercase();
            let tokens: Vec<&str> = rel.split_whitespace().collect();

            if tokens.contains(&"stylesheet") {
                self.rewrite_theme_attr(&link, "href", &href, true, &mut paths.stylesheets);
            } else if tokens.iter().any(|t| t.ends_with("icon")) {
                self.rewrite_theme_attr(&link, "href", &href, false, &mut paths.others);
            }
        }

        self.log.info(
            "html",
            format!(
                "Found {} stylesheets and {} other links",
                paths.stylesheets.len(),
                paths.others.len()
            ),
        );
        paths
    }

    pub fn script_paths(&self) -> ResourceMap {
        let mut scripts = ResourceMap::new();

        for script in find_elements(&self.document, "script") {
            if let Some(src) = get_attr(&script, "src") {
                self.rewrite_theme_attr(&script, "src", &src, false, &mut scripts);
            }
        }

        self.log
            .info("html", format!("Found {} scripts", scripts.len()));
        scripts
    }

    /// Runs `<style>` elements and `style` attributes of the body through
    /// the CSS parser, resolved against the site URL.
    pub async fn process_inline_styles(&mut self) -> ResourceMap {
        let base = self.converter.site_url().to_string();
        let mut resources = ResourceMap::new();

        for style in find_elements(&self.document, "style") {
            let css = text_content(&style);
            if css.trim().is_empty() {
                continue;
            }
            let rewrite = self.css_parser.parse_inline(&base, &css).await;
            set_text_content(&style, &rewrite.text);
            resources.extend(rewrite.resources);
        }

        for body in find_elements(&self.document, "body") {
            for node in find_elements_with_attr(&body, "style") {
                let Some(css) = get_attr(&node, "style") else {
                    continue;
                };
                let rewrite = self.css_parser.parse_inline(&base, &css).await;
                set_attr(&node, "style", &rewrite.text);
                resources.extend(rewrite.resources);
            }
        }

        resources
    }

    /// Rewrites downloaded external stylesheets; see [`CssParser::parse`].
    pub async fn process_css_files(&mut self, css_files: &ResourceMap) -> ResourceMap {
        self.css_parser.parse(css_files).await
    }

    /// Points `<img>` and `<input type="image">` at the CMS asset folder.
    pub fn process_header_and_body_images(&self) -> ResourceMap {
        let site_name = self.converter.site_name().to_string();
        let mut assets = ResourceMap::new();

        for img in find_elements(&self.document, "img") {
            self.rewrite_asset_attr(&img, "src", &site_name, &mut assets);
        }

        for input in find_elements(&self.document, "input") {
            let is_image = get_attr(&input, "type").is_some_and(|t| t.eq_ignore_ascii_case("image"));
            if is_image {
                self.rewrite_asset_attr(&input, "src", &site_name, &mut assets);
            }
        }

        self.log
            .info("html", format!("Found {} image assets", assets.len()));
        assets
    }

    /// Points Flash `<object>` elements (their `data`, movie param and
    /// nested `<embed>`) at the CMS asset folder.
    pub fn process_flash_files(&self, site_name: &str) -> ResourceMap {
        let mut assets = ResourceMap::new();

        for object in find_elements(&self.document, "object") {
            let data = get_attr(&object, "data");
            let movie_params: Vec<Handle> = find_elements(&object, "param")
                .into_iter()
                .filter(|p| get_attr(p, "name").is_some_and(|n| n.eq_ignore_ascii_case("movie")))
                .collect();

            if !data.as_deref().is_some_and(is_swf) && movie_params.is_empty() {
                continue;
            }

            if data.is_some() {
                self.rewrite_asset_attr(&object, "data", site_name, &mut assets);
            }
            for param in &movie_params {
                self.rewrite_asset_attr(param, "value", site_name, &mut assets);
            }
            for embed in find_elements(&object, "embed") {
                self.rewrite_asset_attr(&embed, "src", site_name, &mut assets);
            }
        }

        self.log
            .info("html", format!("Found {} Flash assets", assets.len()));
        assets
    }

    fn theme_target(&self, reference: &str, stylesheet: bool) -> Option<ThemeTarget> {
        let url = self.converter.full_url(reference)?;
        let path = if stylesheet {
            self.converter.file_system_path_for_css(&url)?
        } else {
            self.converter.file_system_path(&url)?
        };
        let link = self.converter.theme_link_for_path(&path)?;
        Some(ThemeTarget {
            url,
            path: path.display().to_string(),
            link,
        })
    }

    fn rewrite_theme_attr(
        &self,
        node: &Handle,
        attr: &str,
        reference: &str,
        stylesheet: bool,
        downloads: &mut ResourceMap,
    ) {
        if let Some(target) = self.theme_target(reference, stylesheet) {
            set_attr(node, attr, &target.link);
            downloads.insert(target.url, target.path);
        }
    }

    fn rewrite_asset_attr(
        &self,
        node: &Handle,
        attr: &str,
        site_name: &str,
        assets: &mut ResourceMap,
    ) {
        let Some(reference) = get_attr(node, attr) else {
            return;
        };
        let Some(url) = self.converter.full_url(&reference) else {
            return;
        };
        if let Some(folder_path) = self
            .converter
            .cms_folder_path_for_image_asset(&url, site_name)
        {
            set_attr(node, attr, &folder_path);
            assets.insert(url, folder_path);
        }
    }
}

fn is_swf(data: &str) -> bool {
    data.split(|c| c == '?' || c == '#')
        .next()
        .is_some_and(|path| path.to_ascii_lowercase().ends_with(".swf"))
}
