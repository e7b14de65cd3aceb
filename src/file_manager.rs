use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Filesystem access confined to one root directory.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Directories are created lazily on the first save.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Lexical check: `path` starts with the base directory and never walks
    /// back up through `..`.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.base_dir)
            && !path.components().any(|c| matches!(c, Component::ParentDir))
    }

    pub fn save_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if !self.contains(path) {
            bail!(
                "Refusing to write {:?} outside of {:?}",
                path,
                self.base_dir
            );
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let mut file = fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to file: {:?}", path))?;

        Ok(())
    }

    pub fn load_text(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
        String::from_utf8(bytes).with_context(|| format!("File is not valid UTF-8: {:?}", path))
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}
