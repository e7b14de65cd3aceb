use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use url::Url;

use crate::import_log::ImportLog;
use crate::settings::ImportSettings;

/// Directory below the theme root (and the asset folder) holding imported files.
pub const IMPORT_DIR: &str = "import";
/// CMS folder that imported images and Flash movies are uploaded to.
pub const ASSET_UPLOAD_ROOT: &str = "/Assets/uploads";

const COLON_TOKEN: &str = "_colon_";
const INDEX_NAME: &str = "index";

/// Characters that cannot appear literally in one segment of a link path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Location of a remote resource relative to an import directory.
#[derive(Debug, Clone, PartialEq)]
struct ImportPath {
    dirs: Vec<String>,
    file: String,
    query: Option<String>,
}

impl ImportPath {
    /// File name with the query string folded in, so `a.php?x=1` and
    /// `a.php?x=2` land in different files.
    fn file_with_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}_{}", self.file, URL_SAFE_NO_PAD.encode(query)),
            None => self.file.clone(),
        }
    }
}

#[derive(Debug)]
struct GeneratedCssNames {
    next: u32,
    assigned: HashMap<String, String>,
}

/// Maps remote URLs to theme files, theme links and CMS asset folders.
#[derive(Debug)]
pub struct UrlConverter {
    site_url: Url,
    site_name: String,
    theme_root_dir: PathBuf,
    theme_root_url: String,
    css_names: Mutex<GeneratedCssNames>,
    log: ImportLog,
}

impl UrlConverter {
    pub fn new(settings: &ImportSettings, log: ImportLog) -> Result<Self> {
        let site_url = settings.parsed_site_url()?;

        let pattern = Regex::new(&format!(
            r"^{}_(\d+)\.css(?:\.gz)?$",
            regex::escape(&sanitize_segment(&settings.site_name))
        ))?;
        let highest = highest_generated_index(&settings.theme_root_dir.join(IMPORT_DIR), &pattern);

        Ok(Self {
            site_url,
            site_name: settings.site_name.clone(),
            theme_root_dir: settings.theme_root_dir.clone(),
            theme_root_url: settings.theme_root_url.trim_end_matches('/').to_string(),
            css_names: Mutex::new(GeneratedCssNames {
                next: highest.saturating_add(1),
                assigned: HashMap::new(),
            }),
            log,
        })
    }

    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn theme_root_dir(&self) -> &Path {
        &self.theme_root_dir
    }

    /// Resolves `reference` against the site URL.
    pub fn full_url(&self, reference: &str) -> Option<String> {
        self.full_url_from(&self.site_url, reference)
    }

    /// Resolves `reference` against `base`. Returns `None` for anything that
    /// must not be rewritten: malformed input (logged), fragments, and
    /// non-HTTP schemes such as `data:` or `mailto:`.
    pub fn full_url_from(&self, base: &Url, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with('#') {
            return None;
        }

        match base.join(reference) {
            Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
                url.set_fragment(None);
                Some(url.to_string())
            }
            Ok(url) => {
                tracing::debug!("Leaving {} reference untouched", url.scheme());
                None
            }
            Err(e) => {
                self.log.error(
                    "url",
                    format!("Malformed reference {:?} relative to {}: {}", reference, base, e),
                );
                None
            }
        }
    }

    /// `{themeRoot}/import/{host}/{sanitized-path}`
    pub fn file_system_path(&self, url: &str) -> Option<PathBuf> {
        let parsed = self.parse_absolute(url)?;
        let path = self.import_path(&parsed)?;
        Some(self.theme_path(&path.dirs, &path.file_with_query()))
    }

    /// Like [`Self::file_system_path`], but the file name always ends in
    /// `.css` or `.css.gz`. URLs with a query string get a generated
    /// `{siteName}_{n}.css` name instead.
    pub fn file_system_path_for_css(&self, url: &str) -> Option<PathBuf> {
        let parsed = self.parse_absolute(url)?;
        let path = self.import_path(&parsed)?;
        let file = match path.query {
            Some(_) => self.generated_css_name(parsed.as_str()),
            None => ensure_css_suffix(&path.file),
        };
        Some(self.theme_path(&path.dirs, &file))
    }

    pub fn convert_to_theme_link(&self, url: &str) -> Option<String> {
        let path = self.file_system_path(url)?;
        self.theme_link_for_path(&path)
    }

    pub fn convert_to_theme_link_for_css(&self, url: &str) -> Option<String> {
        let path = self.file_system_path_for_css(url)?;
        self.theme_link_for_path(&path)
    }

    /// Expresses a file below the theme root as a link below the theme URL.
    /// `None` when the path is not inside the theme root.
    pub fn theme_link_for_path(&self, path: &Path) -> Option<String> {
        let relative = pathdiff::diff_paths(path, &self.theme_root_dir)?;
        let parts = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(encode_segment(&part.to_string_lossy())),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.theme_root_url, parts.join("/")))
    }

    /// True when `reference` already points below the theme root URL, as
    /// in a stylesheet rewritten by an earlier import.
    pub fn is_theme_link(&self, reference: &str) -> bool {
        !self.theme_root_url.is_empty()
            && reference
                .trim()
                .strip_prefix(self.theme_root_url.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// `/Assets/uploads/{siteName}/import/{host}/{sanitized-path}`, with each
    /// segment percent-encoded so it can be used as a link.
    pub fn cms_folder_path_for_image_asset(&self, url: &str, site_name: &str) -> Option<String> {
        let parsed = self.parse_absolute(url)?;
        let path = self.import_path(&parsed)?;

        let mut parts = vec![
            ASSET_UPLOAD_ROOT.to_string(),
            encode_segment(&sanitize_segment(site_name)),
            IMPORT_DIR.to_string(),
        ];
        parts.extend(path.dirs.iter().map(|dir| encode_segment(dir)));
        parts.push(encode_segment(&path.file_with_query()));
        Some(parts.join("/"))
    }

    fn parse_absolute(&self, url: &str) -> Option<Url> {
        match Url::parse(url) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.log
                    .error("url", format!("Malformed URL {:?}: {}", url, e));
                None
            }
        }
    }

    fn import_path(&self, url: &Url) -> Option<ImportPath> {
        let Some(host) = url.host_str() else {
            self.log.error("url", format!("URL has no host: {}", url));
            return None;
        };
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let raw: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let (last, parents) = match raw.split_last() {
            Some((last, parents)) => (*last, parents),
            None => ("", &[][..]),
        };

        let mut dirs = vec![sanitize_segment(&authority)];
        dirs.extend(
            parents
                .iter()
                .map(|s| sanitize_segment(s))
                .filter(|s| is_plain_segment(s)),
        );

        let mut file = sanitize_segment(last);
        if !is_plain_segment(&file) {
            file = INDEX_NAME.to_string();
        }

        Some(ImportPath {
            dirs,
            file,
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    fn theme_path(&self, dirs: &[String], file: &str) -> PathBuf {
        let mut path = self.theme_root_dir.join(IMPORT_DIR);
        for dir in dirs {
            path.push(dir);
        }
        path.push(file);
        path
    }

    fn generated_css_name(&self, url: &str) -> String {
        let mut names = self
            .css_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(name) = names.assigned.get(url) {
            return name.clone();
        }
        let name = format!("{}_{}.css", sanitize_segment(&self.site_name), names.next);
        names.next = names.next.saturating_add(1);
        names.assigned.insert(url.to_string(), name.clone());
        name
    }
}

/// True for `http://`, `https://` and protocol-relative references.
pub fn is_absolute_reference(reference: &str) -> bool {
    let reference = reference.trim().to_ascii_lowercase();
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("//")
}

fn sanitize_segment(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8_lossy()
        .replace(':', COLON_TOKEN)
        .replace(' ', "-")
        .replace(|c: char| c == '/' || c == '\\', "-")
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn is_plain_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

fn ensure_css_suffix(file: &str) -> String {
    let lower = file.to_ascii_lowercase();
    if lower.ends_with(".css") || lower.ends_with(".css.gz") {
        file.to_string()
    } else {
        format!("{}.css", file)
    }
}

fn highest_generated_index(dir: &Path, pattern: &Regex) -> u32 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            // Symlinked directories are not followed.
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                highest_generated_index(&entry.path(), pattern)
            } else {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| pattern.captures(name))
                    .and_then(|caps| caps[1].parse().ok())
                    .unwrap_or(0)
            }
        })
        .max()
        .unwrap_or(0)
}
